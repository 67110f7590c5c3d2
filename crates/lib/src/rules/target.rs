//! Target descriptors.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::consts::PROJECT_SOURCE_FOLDER;
use crate::options::{BuildOptions, LinkerOutput, append_unique};
use crate::platform::{BuildTuple, TargetArchitecture, TargetConfiguration, TargetPlatform};

/// How a target's modules are turned into binaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetLinkType {
  /// Every module is linked into one binary.
  Monolithic,
  /// Every binary-module group becomes its own shared library.
  #[default]
  Modular,
}

/// Final product kind of a target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetOutputType {
  #[default]
  Executable,
  Library,
}

impl TargetOutputType {
  pub fn linker_output(&self) -> LinkerOutput {
    match self {
      Self::Executable => LinkerOutput::Executable,
      Self::Library => LinkerOutput::SharedLibrary,
    }
  }
}

/// A project on disk: a root folder whose `Source` folder holds modules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectInfo {
  pub name: String,
  pub folder: PathBuf,
  /// Projects whose sources this project may include.
  #[serde(default)]
  pub references: Vec<ProjectInfo>,
}

impl ProjectInfo {
  pub fn new(name: impl Into<String>, folder: impl Into<PathBuf>) -> Self {
    Self {
      name: name.into(),
      folder: folder.into(),
      references: Vec::new(),
    }
  }

  pub fn source_folder(&self) -> PathBuf {
    self.folder.join(PROJECT_SOURCE_FOLDER)
  }

  /// Source folders of this project followed by every (transitively) referenced one.
  pub fn all_source_folders(&self) -> Vec<PathBuf> {
    let mut folders = vec![self.source_folder()];
    for reference in &self.references {
      append_unique(&mut folders, reference.all_source_folders());
    }
    folders
  }
}

/// Kind-specific data of a target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TargetKind {
  /// A plain target not tied to a project layout.
  #[default]
  Standalone,
  /// The engine itself.
  Engine { project: ProjectInfo },
  /// A game built on top of an engine target.
  Game {
    project: ProjectInfo,
    /// Name of the engine target the game links against.
    engine_target: Option<String>,
  },
}

impl TargetKind {
  pub fn project(&self) -> Option<&ProjectInfo> {
    match self {
      Self::Standalone => None,
      Self::Engine { project } | Self::Game { project, .. } => Some(project),
    }
  }

  pub fn referenced_target(&self) -> Option<&str> {
    match self {
      Self::Game { engine_target, .. } => engine_target.as_deref(),
      _ => None,
    }
  }

  /// Output type a target of this kind gets unless told otherwise.
  ///
  /// Engines are linked against by games, so they produce libraries.
  pub fn default_output_type(&self) -> TargetOutputType {
    match self {
      Self::Engine { .. } => TargetOutputType::Library,
      Self::Standalone | Self::Game { .. } => TargetOutputType::Executable,
    }
  }
}

/// Hooks a rules author can attach to a target.
pub trait TargetHooks: Send + Sync {
  fn init(&self, _target: &Target) {}
  fn pre_build(&self, _target: &Target, _tuple: &BuildTuple) {}
  fn post_build(&self, _target: &Target, _tuple: &BuildTuple) {}
  fn setup_target_environment(&self, _target: &Target, _options: &mut BuildOptions) {}
}

/// A buildable product composed of modules.
#[derive(Clone)]
pub struct Target {
  pub name: String,
  /// Base name of the final binary.
  pub output_name: String,
  /// Folder the target's intermediate and output folders are placed under.
  pub folder: PathBuf,
  pub kind: TargetKind,
  pub link_type: TargetLinkType,
  pub output_type: TargetOutputType,
  /// Root modules, in declaration order.
  pub modules: Vec<String>,
  pub platforms: Vec<TargetPlatform>,
  pub architectures: Vec<TargetArchitecture>,
  pub configurations: Vec<TargetConfiguration>,
  /// Definitions applied to every module of the target.
  pub global_definitions: Vec<String>,
  hooks: Option<Arc<dyn TargetHooks>>,
}

impl Target {
  pub fn new(name: impl Into<String>, folder: impl Into<PathBuf>) -> Self {
    let name = name.into();
    Self {
      output_name: name.clone(),
      name,
      folder: folder.into(),
      kind: TargetKind::Standalone,
      link_type: TargetLinkType::default(),
      output_type: TargetOutputType::default(),
      modules: Vec::new(),
      platforms: TargetPlatform::ALL.to_vec(),
      architectures: vec![TargetArchitecture::X64, TargetArchitecture::Arm64],
      configurations: TargetConfiguration::ALL.to_vec(),
      global_definitions: Vec::new(),
      hooks: None,
    }
  }

  /// Set the kind, resetting the output type to the kind's default.
  pub fn with_kind(mut self, kind: TargetKind) -> Self {
    self.output_type = kind.default_output_type();
    self.kind = kind;
    self
  }

  pub fn with_link_type(mut self, link_type: TargetLinkType) -> Self {
    self.link_type = link_type;
    self
  }

  pub fn with_output_type(mut self, output_type: TargetOutputType) -> Self {
    self.output_type = output_type;
    self
  }

  pub fn with_module(mut self, name: impl Into<String>) -> Self {
    self.modules.push(name.into());
    self
  }

  pub fn with_hooks(mut self, hooks: impl TargetHooks + 'static) -> Self {
    self.hooks = Some(Arc::new(hooks));
    self
  }

  /// Whether the target declares support for every element of the tuple.
  pub fn supports(&self, tuple: &BuildTuple) -> bool {
    self.platforms.contains(&tuple.platform)
      && self.architectures.contains(&tuple.architecture)
      && self.configurations.contains(&tuple.configuration)
  }

  pub fn init(&self) {
    if let Some(hooks) = &self.hooks {
      hooks.init(self);
    }
  }

  pub fn pre_build(&self, tuple: &BuildTuple) {
    if let Some(hooks) = &self.hooks {
      hooks.pre_build(self, tuple);
    }
  }

  pub fn post_build(&self, tuple: &BuildTuple) {
    if let Some(hooks) = &self.hooks {
      hooks.post_build(self, tuple);
    }
  }

  /// Populate the target-wide environment every module environment derives from.
  pub fn setup_target_environment(&self, options: &mut BuildOptions) {
    let configuration = options.configuration();
    options.link_env.output = self.output_type.linker_output();
    options.compile_env.apply_configuration(configuration);
    append_unique(
      &mut options.compile_env.preprocessor_definitions,
      self.global_definitions.iter().cloned(),
    );
    let debug_define = match configuration {
      TargetConfiguration::Debug => "_DEBUG",
      TargetConfiguration::Development | TargetConfiguration::Release => "NDEBUG",
    };
    append_unique(&mut options.compile_env.preprocessor_definitions, [debug_define.to_string()]);
    options.link_env.debug_information = options.compile_env.debug_information;
    options.link_env.link_time_code_generation = options.compile_env.whole_program_optimization;
    options.link_env.use_incremental_linking = configuration == TargetConfiguration::Debug;

    if let Some(project) = self.kind.project() {
      append_unique(
        &mut options.compile_env.include_paths,
        project
          .all_source_folders()
          .into_iter()
          .map(|p| p.to_string_lossy().into_owned()),
      );
    }

    if let Some(hooks) = &self.hooks {
      hooks.setup_target_environment(self, options);
    }
  }

  /// Full path of the target's final binary.
  pub fn output_file_path(&self, options: &BuildOptions) -> PathBuf {
    let file_name = options
      .tuple
      .platform
      .link_output_file_name(&self.output_name, self.output_type.linker_output());
    options.output_folder.join(file_name)
  }

  /// Folder the target's sources are expected under, used to filter presentation groups.
  pub fn workspace_root(&self) -> &Path {
    match self.kind.project() {
      Some(project) => &project.folder,
      None => &self.folder,
    }
  }
}

impl fmt::Debug for Target {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Target")
      .field("name", &self.name)
      .field("kind", &self.kind)
      .field("link_type", &self.link_type)
      .field("output_type", &self.output_type)
      .field("modules", &self.modules)
      .field("has_hooks", &self.hooks.is_some())
      .finish()
  }
}
