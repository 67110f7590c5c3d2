//! Types for work items and graph execution.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Index of a work item inside its [`TaskGraph`](super::TaskGraph).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub usize);

impl fmt::Display for TaskId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "#{}", self.0)
  }
}

/// Errors raised while planning or running work items.
#[derive(Debug, Error)]
pub enum TaskError {
  /// Command exited unsuccessfully.
  #[error("command failed with exit code {code:?}: {cmd}")]
  CmdFailed { cmd: String, code: Option<i32> },

  /// Command could not be started.
  #[error("failed to spawn {cmd}: {source}")]
  Spawn {
    cmd: String,
    #[source]
    source: std::io::Error,
  },

  /// I/O error while preparing outputs.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  /// In-process action reported a failure.
  #[error("{0}")]
  Action(String),

  /// Two unrelated work items declare the same output file.
  #[error("{path} is produced by both {first} and {second}")]
  DuplicateOutput {
    path: PathBuf,
    first: String,
    second: String,
  },

  /// The predecessor relation contains a cycle.
  #[error("dependency cycle detected involving {0}")]
  CycleDetected(String),

  /// A predecessor failed, so the item never ran.
  #[error("dependency failed: {0}")]
  DependencyFailed(String),
}

/// An external program invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
  pub program: String,
  pub args: Vec<String>,
  #[serde(default)]
  pub env: Vec<(String, String)>,
}

impl CommandSpec {
  pub fn new(program: impl Into<String>) -> Self {
    Self {
      program: program.into(),
      args: Vec::new(),
      env: Vec::new(),
    }
  }

  pub fn arg(mut self, arg: impl Into<String>) -> Self {
    self.args.push(arg.into());
    self
  }

  pub fn args<I, S>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.args.extend(args.into_iter().map(Into::into));
    self
  }

  /// The command line as a single display string.
  pub fn display(&self) -> String {
    std::iter::once(self.program.as_str())
      .chain(self.args.iter().map(String::as_str))
      .collect::<Vec<_>>()
      .join(" ")
  }
}

/// In-process work, used for steps that need no external tool.
pub type CallbackFn = dyn Fn(&Task) -> Result<(), TaskError> + Send + Sync;

/// What a work item does when it runs.
#[derive(Clone)]
pub enum TaskAction {
  Command(CommandSpec),
  Callback {
    /// Stable description of the work, used for cache fingerprints.
    key: String,
    run: Arc<CallbackFn>,
  },
}

impl TaskAction {
  pub fn callback(key: impl Into<String>, run: impl Fn(&Task) -> Result<(), TaskError> + Send + Sync + 'static) -> Self {
    Self::Callback {
      key: key.into(),
      run: Arc::new(run),
    }
  }

  /// Human readable form used in logs and failure reports.
  pub fn describe(&self) -> String {
    match self {
      Self::Command(cmd) => cmd.display(),
      Self::Callback { key, .. } => key.clone(),
    }
  }
}

impl fmt::Debug for TaskAction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Command(cmd) => f.debug_tuple("Command").field(cmd).finish(),
      Self::Callback { key, .. } => f.debug_struct("Callback").field("key", key).finish(),
    }
  }
}

/// Lifecycle of a work item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
  #[default]
  Pending,
  Running,
  Succeeded,
  Failed,
  /// Outputs were current; the item was skipped without running.
  UpToDate,
}

impl TaskState {
  pub fn is_terminal(&self) -> bool {
    matches!(self, Self::Succeeded | Self::Failed | Self::UpToDate)
  }

  /// Whether dependents may run after this state.
  pub fn is_satisfied(&self) -> bool {
    matches!(self, Self::Succeeded | Self::UpToDate)
  }
}

/// One schedulable unit of work: compile a file, link a binary or generate code.
#[derive(Debug, Clone)]
pub struct Task {
  pub id: TaskId,
  /// Short message logged when the item starts, e.g. the source file name.
  pub info_message: String,
  pub working_directory: PathBuf,
  pub action: TaskAction,
  /// Files the work reads, used for change detection and edge discovery.
  pub prerequisite_files: Vec<PathBuf>,
  /// Files the work writes.
  pub produced_files: Vec<PathBuf>,
  /// Scheduling hint; higher cost items are dispatched first among equals.
  pub cost: u32,
  /// Direct predecessors.
  pub dependencies: Vec<TaskId>,
  pub state: TaskState,
  pub started_at: Option<SystemTime>,
  pub finished_at: Option<SystemTime>,
  pub exit_code: Option<i32>,
  pub error: Option<String>,
}

impl Task {
  pub fn new(info_message: impl Into<String>, working_directory: impl Into<PathBuf>, action: TaskAction) -> Self {
    Self {
      id: TaskId(0),
      info_message: info_message.into(),
      working_directory: working_directory.into(),
      action,
      prerequisite_files: Vec::new(),
      produced_files: Vec::new(),
      cost: 1,
      dependencies: Vec::new(),
      state: TaskState::Pending,
      started_at: None,
      finished_at: None,
      exit_code: None,
      error: None,
    }
  }

  pub fn with_prerequisites(mut self, files: impl IntoIterator<Item = PathBuf>) -> Self {
    self.prerequisite_files.extend(files);
    self
  }

  pub fn with_outputs(mut self, files: impl IntoIterator<Item = PathBuf>) -> Self {
    self.produced_files.extend(files);
    self
  }

  pub fn with_cost(mut self, cost: u32) -> Self {
    self.cost = cost;
    self
  }
}

/// A work item that ended in failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedTask {
  pub id: TaskId,
  pub info_message: String,
  pub command: String,
  pub exit_code: Option<i32>,
  pub reason: String,
  /// Whether the item actually ran, as opposed to failing through a predecessor.
  pub executed: bool,
}

/// Aggregate outcome of executing a graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphResult {
  /// Items that actually ran.
  pub executed: usize,
  /// Items skipped because their outputs were current.
  pub up_to_date: usize,
  /// Every failed item, in completion order.
  pub failed: Vec<FailedTask>,
  /// Worker threads spawned.
  pub workers: usize,
}

impl GraphResult {
  pub fn is_success(&self) -> bool {
    self.failed.is_empty()
  }

  pub fn failed_count(&self) -> usize {
    self.failed.len()
  }

  /// Failures of items that ran, excluding items failed through a predecessor.
  pub fn failed_commands(&self) -> impl Iterator<Item = &FailedTask> {
    self.failed.iter().filter(|f| f.executed)
  }

  /// Fold another graph's result into this one.
  pub fn merge(&mut self, other: GraphResult) {
    self.executed += other.executed;
    self.up_to_date += other.up_to_date;
    self.failed.extend(other.failed);
    self.workers = self.workers.max(other.workers);
  }
}
