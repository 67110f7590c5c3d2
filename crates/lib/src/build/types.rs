//! Types for target builds.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::graph::{FailedTask, GraphResult, TaskError};
use crate::platform::BuildTuple;
use crate::resolve::ResolveError;
use crate::toolchain::ToolchainError;

use super::info::BuildTargetInfo;

/// Errors that stop a target build before or while planning its work items.
///
/// Work-item failures are not errors; they are reported through [`GraphResult`].
#[derive(Debug, Error)]
pub enum BuildError {
  #[error("target {0} not found")]
  TargetNotFound(String),

  #[error("target {target} does not support {tuple}")]
  UnsupportedTuple { target: String, tuple: BuildTuple },

  #[error(transparent)]
  Resolve(#[from] ResolveError),

  #[error("target {target}: referenced target {referenced} failed to build")]
  ReferencedTargetFailed { target: String, referenced: String },

  #[error("target {target}: referenced target {referenced} outputs an executable, not a library")]
  ReferencedExecutable { target: String, referenced: String },

  #[error("target {target} references itself through {referenced}")]
  CircularReference { target: String, referenced: String },

  #[error("target {target}: {source}")]
  Toolchain {
    target: String,
    #[source]
    source: ToolchainError,
  },

  #[error("target {target}: invalid task graph: {source}")]
  Graph {
    target: String,
    #[source]
    source: TaskError,
  },

  #[error("failed to prepare {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// Progress of one target build for one tuple.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildStage {
  #[default]
  NotStarted,
  PreBuild,
  ResolvingModules,
  Generating,
  Compiling,
  Linking,
  PostBuild,
  Done,
  Failed,
}

impl fmt::Display for BuildStage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Self::NotStarted => "not started",
      Self::PreBuild => "pre-build",
      Self::ResolvingModules => "resolving modules",
      Self::Generating => "generating",
      Self::Compiling => "compiling",
      Self::Linking => "linking",
      Self::PostBuild => "post-build",
      Self::Done => "done",
      Self::Failed => "failed",
    };
    f.write_str(name)
  }
}

/// Outcome of building one target for one tuple.
///
/// Shared with targets that reference it, so a target is built at most once per
/// tuple within one [`Builder`](super::Builder).
#[derive(Debug, Clone)]
pub struct TargetBuild {
  pub target: String,
  pub tuple: BuildTuple,
  pub success: bool,
  /// Binary modules and their native paths; `None` when nothing was linked.
  pub info: Option<BuildTargetInfo>,
  /// Files a referencing target links against.
  pub link_artifacts: Vec<PathBuf>,
}

impl TargetBuild {
  pub(crate) fn failed(target: &str, tuple: BuildTuple) -> Self {
    Self {
      target: target.to_string(),
      tuple,
      success: false,
      info: None,
      link_artifacts: Vec::new(),
    }
  }

  /// Names of the binary modules the build produced.
  pub fn binary_module_names(&self) -> Vec<String> {
    self
      .info
      .iter()
      .flat_map(|info| info.binary_modules.iter().map(|b| b.name.clone()))
      .collect()
  }
}

/// Report of one target build, as shown to the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetReport {
  pub target: String,
  /// `None` when the target could not even be looked up.
  pub tuple: Option<BuildTuple>,
  /// `Done` or `Failed`.
  pub stage: BuildStage,
  /// Stage a failed build stopped in.
  pub failed_at: Option<BuildStage>,
  /// Zero declared modules; only the hooks ran.
  pub skipped: bool,
  pub result: GraphResult,
  /// Configuration error that stopped the build.
  pub error: Option<String>,
  pub elapsed: Duration,
}

impl TargetReport {
  pub fn is_success(&self) -> bool {
    self.error.is_none() && self.result.is_success()
  }
}

/// Aggregate outcome of a build invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildSummary {
  pub reports: Vec<TargetReport>,
  pub elapsed: Duration,
}

impl BuildSummary {
  pub fn is_success(&self) -> bool {
    self.reports.iter().all(TargetReport::is_success)
  }

  /// Work items that actually ran.
  pub fn executed(&self) -> usize {
    self.reports.iter().map(|r| r.result.executed).sum()
  }

  /// Work items skipped through the work-item cache.
  pub fn up_to_date(&self) -> usize {
    self.reports.iter().map(|r| r.result.up_to_date).sum()
  }

  /// Failed work items, including those failed through a predecessor.
  pub fn failed_count(&self) -> usize {
    self.reports.iter().map(|r| r.result.failed_count()).sum()
  }

  /// Failed commands, in completion order.
  pub fn failed_commands(&self) -> impl Iterator<Item = &FailedTask> {
    self.reports.iter().flat_map(|r| r.result.failed_commands())
  }

  /// Configuration errors, by target.
  pub fn errors(&self) -> impl Iterator<Item = (&str, &str)> {
    self
      .reports
      .iter()
      .filter_map(|r| r.error.as_deref().map(|e| (r.target.as_str(), e)))
  }
}
