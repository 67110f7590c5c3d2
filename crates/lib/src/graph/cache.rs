//! Work-item cache.
//!
//! Records, for every work item that succeeded, a fingerprint of what it does and
//! the write times of the files it read. A later build may skip an item whose
//! fingerprint matches, whose outputs still exist and whose inputs are not newer
//! than recorded. The cache is advisory: any problem reading it yields an empty
//! cache and therefore a full rebuild.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::consts::TASK_CACHE_VERSION;
use crate::util::fs::{modified_nanos, write_atomic};
use crate::util::hash::{Fingerprint, Fingerprintable};

use super::types::{Task, TaskAction, TaskState};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskCacheEntry {
  pub fingerprint: Fingerprint,
  /// Prerequisite files with their write times when the item last succeeded.
  pub prerequisites: Vec<(PathBuf, u64)>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TaskCacheFile {
  version: u32,
  tool_version: String,
  entries: Vec<TaskCacheEntry>,
}

#[derive(Serialize)]
struct TaskKey<'a> {
  action: &'a str,
  command: Option<&'a super::types::CommandSpec>,
  working_directory: &'a Path,
  prerequisites: &'a [PathBuf],
  produced: &'a [PathBuf],
}

/// Fingerprint of what a work item does, independent of file timestamps.
pub fn task_fingerprint(task: &Task) -> Option<Fingerprint> {
  let (action, command) = match &task.action {
    TaskAction::Command(cmd) => ("command", Some(cmd)),
    TaskAction::Callback { key, .. } => (key.as_str(), None),
  };
  TaskKey {
    action,
    command,
    working_directory: &task.working_directory,
    prerequisites: &task.prerequisite_files,
    produced: &task.produced_files,
  }
  .fingerprint()
  .ok()
}

/// Persisted work-item cache of one target build.
#[derive(Debug)]
pub struct TaskCache {
  path: PathBuf,
  tool_version: String,
  entries: HashMap<Fingerprint, TaskCacheEntry>,
}

impl TaskCache {
  pub fn empty(path: impl Into<PathBuf>, tool_version: impl Into<String>) -> Self {
    Self {
      path: path.into(),
      tool_version: tool_version.into(),
      entries: HashMap::new(),
    }
  }

  /// Load the cache at `path`.
  ///
  /// A missing, unreadable, corrupt or outdated file yields an empty cache.
  pub fn load(path: impl Into<PathBuf>, tool_version: impl Into<String>) -> Self {
    let mut cache = Self::empty(path, tool_version);

    let content = match fs::read_to_string(&cache.path) {
      Ok(content) => content,
      Err(err) if err.kind() == io::ErrorKind::NotFound => {
        debug!(path = %cache.path.display(), "no work-item cache");
        return cache;
      }
      Err(err) => {
        warn!(path = %cache.path.display(), error = %err, "failed to read work-item cache, rebuilding");
        return cache;
      }
    };

    let file: TaskCacheFile = match serde_json::from_str(&content) {
      Ok(file) => file,
      Err(err) => {
        warn!(path = %cache.path.display(), error = %err, "corrupt work-item cache, rebuilding");
        return cache;
      }
    };

    if file.version != TASK_CACHE_VERSION || file.tool_version != cache.tool_version {
      debug!(
        path = %cache.path.display(),
        version = file.version,
        tool_version = %file.tool_version,
        "work-item cache from another tool version, rebuilding"
      );
      return cache;
    }

    cache.entries = file.entries.into_iter().map(|e| (e.fingerprint.clone(), e)).collect();
    debug!(path = %cache.path.display(), entries = cache.entries.len(), "loaded work-item cache");
    cache
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Whether the item's recorded state proves its outputs are current.
  ///
  /// Predecessors are not considered here; see
  /// [`TaskGraph::load_cache`](super::TaskGraph::load_cache).
  pub fn is_up_to_date(&self, task: &Task) -> bool {
    let Some(fingerprint) = task_fingerprint(task) else {
      return false;
    };
    let Some(entry) = self.entries.get(&fingerprint) else {
      return false;
    };
    if task.produced_files.iter().any(|f| !f.exists()) {
      return false;
    }
    if entry.prerequisites.len() != task.prerequisite_files.len() {
      return false;
    }
    entry.prerequisites.iter().all(|(path, recorded)| match modified_nanos(path) {
      Some(current) => current <= *recorded,
      None => false,
    })
  }

  /// Record a successful run of `task`.
  pub fn record(&mut self, task: &Task) {
    let Some(fingerprint) = task_fingerprint(task) else {
      return;
    };
    let mut prerequisites = Vec::with_capacity(task.prerequisite_files.len());
    for path in &task.prerequisite_files {
      match modified_nanos(path) {
        Some(time) => prerequisites.push((path.clone(), time)),
        None => {
          // An input vanished; make sure the item runs next time.
          self.entries.remove(&fingerprint);
          return;
        }
      }
    }
    self.entries.insert(
      fingerprint.clone(),
      TaskCacheEntry {
        fingerprint,
        prerequisites,
      },
    );
  }

  pub fn remove(&mut self, task: &Task) {
    if let Some(fingerprint) = task_fingerprint(task) {
      self.entries.remove(&fingerprint);
    }
  }

  /// Fold the outcome of an executed graph into the cache.
  ///
  /// Succeeded items are recorded, up-to-date items keep their entry, everything
  /// else is dropped, as are entries of items no longer in the graph.
  pub fn update(&mut self, tasks: &[Task]) {
    let mut live = HashSet::new();
    for task in tasks {
      match task.state {
        TaskState::Succeeded => self.record(task),
        TaskState::UpToDate => {}
        TaskState::Pending | TaskState::Running | TaskState::Failed => self.remove(task),
      }
      if let Some(fingerprint) = task_fingerprint(task) {
        live.insert(fingerprint);
      }
    }
    self.entries.retain(|fingerprint, _| live.contains(fingerprint));
  }

  pub fn save(&self) -> io::Result<()> {
    let mut entries: Vec<TaskCacheEntry> = self.entries.values().cloned().collect();
    entries.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));
    let file = TaskCacheFile {
      version: TASK_CACHE_VERSION,
      tool_version: self.tool_version.clone(),
      entries,
    };
    let json = serde_json::to_string(&file).map_err(io::Error::other)?;
    write_atomic(&self.path, json.as_bytes())?;
    debug!(path = %self.path.display(), entries = file.entries.len(), "saved work-item cache");
    Ok(())
  }
}
