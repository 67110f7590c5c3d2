//! Declarative rules loaded from a TOML manifest.
//!
//! ```toml
//! [build]
//! max_concurrency = 8
//!
//! [[project]]
//! name = "Engine"
//! folder = "."
//!
//! [[target]]
//! name = "Editor"
//! kind = "engine"
//! project = "Engine"
//! link_type = "modular"
//! output_type = "executable"
//! modules = ["Editor"]
//!
//! [[module]]
//! name = "Core"
//! binary = "Core"
//! folder = "Source/Core"
//! public_include_paths = ["."]
//! ```
//!
//! Module and project folders are relative to the manifest's directory; module
//! include and source paths are relative to the module folder.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::BuildSettings;
use crate::platform::{TargetArchitecture, TargetConfiguration, TargetPlatform};
use crate::toolchain::gnu::GnuToolchainConfig;
use crate::util::fs::normalize_path;

use super::{
  Module, ProjectInfo, RulesError, RulesRegistry, Target, TargetKind, TargetLinkType, TargetOutputType,
};

/// Parsed contents of a rules manifest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RulesManifest {
  pub build: BuildSettings,
  pub toolchain: GnuToolchainConfig,
  #[serde(rename = "project")]
  pub projects: Vec<ProjectDecl>,
  #[serde(rename = "target")]
  pub targets: Vec<TargetDecl>,
  #[serde(rename = "module")]
  pub modules: Vec<ModuleDecl>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectDecl {
  pub name: String,
  #[serde(default = "current_folder")]
  pub folder: PathBuf,
  #[serde(default)]
  pub references: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKindDecl {
  #[default]
  Standalone,
  Engine,
  Game,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetDecl {
  pub name: String,
  #[serde(default)]
  pub output_name: Option<String>,
  #[serde(default)]
  pub kind: TargetKindDecl,
  #[serde(default)]
  pub project: Option<String>,
  #[serde(default)]
  pub engine_target: Option<String>,
  #[serde(default)]
  pub link_type: TargetLinkType,
  /// Defaults to a library for engines and an executable otherwise.
  #[serde(default)]
  pub output_type: Option<TargetOutputType>,
  #[serde(default)]
  pub modules: Vec<String>,
  #[serde(default)]
  pub platforms: Vec<TargetPlatform>,
  #[serde(default)]
  pub architectures: Vec<TargetArchitecture>,
  #[serde(default)]
  pub configurations: Vec<TargetConfiguration>,
  #[serde(default)]
  pub definitions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleDecl {
  pub name: String,
  #[serde(default)]
  pub binary: String,
  pub folder: PathBuf,
  #[serde(default)]
  pub public_dependencies: Vec<String>,
  #[serde(default)]
  pub private_dependencies: Vec<String>,
  #[serde(default)]
  pub public_definitions: Vec<String>,
  #[serde(default)]
  pub private_definitions: Vec<String>,
  #[serde(default)]
  pub public_include_paths: Vec<PathBuf>,
  #[serde(default)]
  pub private_include_paths: Vec<PathBuf>,
  #[serde(default)]
  pub source_paths: Vec<PathBuf>,
  #[serde(default)]
  pub libraries: Vec<String>,
}

fn current_folder() -> PathBuf {
  PathBuf::from(".")
}

impl RulesManifest {
  /// Read and parse a manifest file.
  pub fn load(path: &Path) -> Result<Self, RulesError> {
    let text = std::fs::read_to_string(path).map_err(|source| RulesError::Read {
      path: path.display().to_string(),
      source,
    })?;
    Self::parse(&text, path)
  }

  /// Parse manifest text; `path` is only used in error messages.
  pub fn parse(text: &str, path: &Path) -> Result<Self, RulesError> {
    toml::from_str(text).map_err(|source| RulesError::Parse {
      path: path.display().to_string(),
      source,
    })
  }

  /// Build a registry from the declarations, resolving paths against `root`.
  pub fn to_registry(&self, root: &Path) -> Result<RulesRegistry, RulesError> {
    let mut registry = RulesRegistry::new();

    for decl in &self.modules {
      let folder = normalize_path(&root.join(&decl.folder));
      let mut module = Module::new(&decl.name, &folder).with_binary_module(&decl.binary);
      module.public_dependencies = decl.public_dependencies.clone();
      module.private_dependencies = decl.private_dependencies.clone();
      module.public_definitions = decl.public_definitions.clone();
      module.private_definitions = decl.private_definitions.clone();
      module.public_include_paths = relative_to(&folder, &decl.public_include_paths);
      module.private_include_paths = relative_to(&folder, &decl.private_include_paths);
      module.source_paths = relative_to(&folder, &decl.source_paths);
      module.libraries = decl.libraries.clone();
      registry.register_module(module);
    }

    let projects: HashMap<&str, &ProjectDecl> = self.projects.iter().map(|p| (p.name.as_str(), p)).collect();

    for decl in &self.targets {
      let project = match &decl.project {
        Some(name) if !projects.contains_key(name.as_str()) => {
          return Err(RulesError::UnknownProject {
            target: decl.name.clone(),
            project: name.clone(),
          });
        }
        Some(name) => Some(resolve_project(name, &projects, root, &mut HashSet::new())?),
        None => None,
      };

      let kind = match (decl.kind, project) {
        (TargetKindDecl::Standalone, _) => TargetKind::Standalone,
        (TargetKindDecl::Engine, Some(project)) => TargetKind::Engine { project },
        (TargetKindDecl::Game, Some(project)) => TargetKind::Game {
          project,
          engine_target: decl.engine_target.clone(),
        },
        (kind, None) => {
          return Err(RulesError::InvalidKind {
            target: decl.name.clone(),
            kind: format!("{:?} without a project", kind).to_lowercase(),
          });
        }
      };

      let folder = kind.project().map(|p| p.folder.clone()).unwrap_or_else(|| root.to_path_buf());
      let mut target = Target::new(&decl.name, folder)
        .with_kind(kind)
        .with_link_type(decl.link_type);
      if let Some(output_type) = decl.output_type {
        target.output_type = output_type;
      }
      if let Some(output_name) = &decl.output_name {
        target.output_name = output_name.clone();
      }
      target.modules = decl.modules.clone();
      if !decl.platforms.is_empty() {
        target.platforms = decl.platforms.clone();
      }
      if !decl.architectures.is_empty() {
        target.architectures = decl.architectures.clone();
      }
      if !decl.configurations.is_empty() {
        target.configurations = decl.configurations.clone();
      }
      target.global_definitions = decl.definitions.clone();
      registry.register_target(target);
    }

    Ok(registry)
  }
}

fn relative_to(base: &Path, paths: &[PathBuf]) -> Vec<PathBuf> {
  paths.iter().map(|p| normalize_path(&base.join(p))).collect()
}

fn resolve_project(
  name: &str,
  projects: &HashMap<&str, &ProjectDecl>,
  root: &Path,
  visiting: &mut HashSet<String>,
) -> Result<ProjectInfo, RulesError> {
  let decl = projects.get(name).ok_or_else(|| RulesError::UnknownReference {
    project: name.to_string(),
    reference: name.to_string(),
  })?;
  let mut project = ProjectInfo::new(&decl.name, normalize_path(&root.join(&decl.folder)));
  if !visiting.insert(decl.name.clone()) {
    // Reference loops stop here; the folder is already on the include path.
    return Ok(project);
  }
  for reference in &decl.references {
    if !projects.contains_key(reference.as_str()) {
      return Err(RulesError::UnknownReference {
        project: decl.name.clone(),
        reference: reference.clone(),
      });
    }
    project.references.push(resolve_project(reference, projects, root, visiting)?);
  }
  visiting.remove(&decl.name);
  Ok(project)
}
