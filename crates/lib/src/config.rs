//! Build configuration.
//!
//! [`BuildConfig`] carries everything a build invocation needs besides the rules:
//! folder layout, concurrency limit and the requested build tuples. Defaults can be
//! overridden from the `[build]` table of a rules manifest ([`BuildSettings`]) and
//! then from the command line.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_BINARIES_FOLDER, DEFAULT_INTERMEDIATE_FOLDER, DEFAULT_MARKUP_TOKENS};
use crate::platform::{BuildTuple, TargetArchitecture, TargetConfiguration, TargetPlatform};

/// Configuration of one build invocation.
#[derive(Debug, Clone)]
pub struct BuildConfig {
  /// Workspace root all relative folders are resolved against.
  pub root: PathBuf,
  /// Intermediate folder, relative to `root` unless absolute.
  pub intermediate_folder: PathBuf,
  /// Binaries folder, relative to `root` unless absolute.
  pub binaries_folder: PathBuf,
  /// Upper bound on concurrently running work items.
  pub max_concurrency: usize,
  /// Targets to build; empty means every registered target.
  pub targets: Vec<String>,
  /// Requested platforms; empty means the host platform.
  pub platforms: Vec<TargetPlatform>,
  /// Requested architectures; empty means the host architecture.
  pub architectures: Vec<TargetArchitecture>,
  /// Requested configurations; empty means `Development`.
  pub configurations: Vec<TargetConfiguration>,
  /// Clean intermediate and output folders before building.
  pub rebuild: bool,
  /// Macros marking a header as needing generated reflection code.
  pub markup_tokens: Vec<String>,
  /// Code generator invocation; `None` disables the generation stage.
  ///
  /// Arguments may use `{module}`, `{output}`, `{intermediate}` and `{headers}`
  /// (which expands into one argument per header).
  pub codegen_command: Option<Vec<String>>,
  /// Version stamp of the build tool, part of every persisted cache.
  pub tool_version: String,
}

impl BuildConfig {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self {
      root: root.into(),
      intermediate_folder: PathBuf::from(DEFAULT_INTERMEDIATE_FOLDER),
      binaries_folder: PathBuf::from(DEFAULT_BINARIES_FOLDER),
      max_concurrency: std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4),
      targets: Vec::new(),
      platforms: Vec::new(),
      architectures: Vec::new(),
      configurations: Vec::new(),
      rebuild: false,
      markup_tokens: DEFAULT_MARKUP_TOKENS.iter().map(|t| t.to_string()).collect(),
      codegen_command: None,
      tool_version: env!("CARGO_PKG_VERSION").to_string(),
    }
  }

  pub fn intermediate_root(&self) -> PathBuf {
    self.root.join(&self.intermediate_folder)
  }

  pub fn binaries_root(&self) -> PathBuf {
    self.root.join(&self.binaries_folder)
  }

  /// Intermediate folder of one target under one tuple.
  pub fn target_intermediate_folder(&self, target: &str, tuple: &BuildTuple) -> PathBuf {
    tuple_folder(&self.intermediate_root(), target, tuple)
  }

  /// Output folder of one target under one tuple.
  pub fn target_output_folder(&self, target: &str, tuple: &BuildTuple) -> PathBuf {
    tuple_folder(&self.binaries_root(), target, tuple)
  }

  /// Apply overrides from a manifest's `[build]` table.
  pub fn apply_settings(&mut self, settings: &BuildSettings) {
    if let Some(folder) = &settings.intermediate_folder {
      self.intermediate_folder = folder.clone();
    }
    if let Some(folder) = &settings.binaries_folder {
      self.binaries_folder = folder.clone();
    }
    if let Some(max) = settings.max_concurrency {
      self.max_concurrency = max.max(1);
    }
    if !settings.platforms.is_empty() {
      self.platforms = settings.platforms.clone();
    }
    if !settings.architectures.is_empty() {
      self.architectures = settings.architectures.clone();
    }
    if !settings.configurations.is_empty() {
      self.configurations = settings.configurations.clone();
    }
    if let Some(tokens) = &settings.markup_tokens {
      self.markup_tokens = tokens.clone();
    }
    if let Some(command) = &settings.codegen_command {
      self.codegen_command = Some(command.clone());
    }
  }

  /// Every requested (platform, architecture, configuration) combination.
  pub fn requested_tuples(&self) -> Vec<BuildTuple> {
    let platforms = if self.platforms.is_empty() {
      vec![TargetPlatform::host().unwrap_or(TargetPlatform::Linux)]
    } else {
      self.platforms.clone()
    };
    let architectures = if self.architectures.is_empty() {
      vec![TargetArchitecture::host().unwrap_or(TargetArchitecture::X64)]
    } else {
      self.architectures.clone()
    };
    let configurations = if self.configurations.is_empty() {
      vec![TargetConfiguration::Development]
    } else {
      self.configurations.clone()
    };

    let mut tuples = Vec::new();
    for &platform in &platforms {
      for &architecture in &architectures {
        for &configuration in &configurations {
          tuples.push(BuildTuple::new(platform, architecture, configuration));
        }
      }
    }
    tuples
  }
}

fn tuple_folder(base: &Path, target: &str, tuple: &BuildTuple) -> PathBuf {
  base
    .join(target)
    .join(tuple.platform.as_str())
    .join(tuple.architecture.as_str())
    .join(tuple.configuration.as_str())
}

/// The `[build]` table of a rules manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildSettings {
  pub intermediate_folder: Option<PathBuf>,
  pub binaries_folder: Option<PathBuf>,
  pub max_concurrency: Option<usize>,
  pub platforms: Vec<TargetPlatform>,
  pub architectures: Vec<TargetArchitecture>,
  pub configurations: Vec<TargetConfiguration>,
  pub markup_tokens: Option<Vec<String>>,
  pub codegen_command: Option<Vec<String>>,
}
