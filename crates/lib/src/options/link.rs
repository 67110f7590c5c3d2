//! Linker settings for a module or target.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Kind of artifact produced by a link step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkerOutput {
  #[default]
  Executable,
  SharedLibrary,
  StaticLibrary,
  /// Import library companion of a shared library or executable.
  ImportLibrary,
}

/// Everything the toolchain needs to produce one link artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkEnv {
  pub output: LinkerOutput,
  pub debug_information: bool,
  pub link_time_code_generation: bool,
  pub use_incremental_linking: bool,
  /// Object files and libraries consumed by the link, in insertion order.
  pub input_files: Vec<PathBuf>,
  /// System or third-party libraries linked by name or path.
  pub input_libraries: Vec<String>,
  /// Extra library search directories.
  pub library_paths: Vec<PathBuf>,
}
