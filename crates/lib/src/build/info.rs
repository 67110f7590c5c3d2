//! Target build info and rules overviews.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::binary::{group_binary_modules, workspace_groups};
use crate::config::BuildConfig;
use crate::options::BuildOptions;
use crate::platform::{BuildTuple, TargetArchitecture, TargetConfiguration, TargetPlatform};
use crate::resolve::{ResolveError, resolve_modules};
use crate::rules::{RulesRegistry, Target, TargetKind};
use crate::util::fs::write_if_changed;

/// One binary module of a built target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BinaryModuleInfo {
  pub name: String,
  pub native_path: PathBuf,
}

/// Contents of `<output folder>/<target>.Build.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BuildTargetInfo {
  pub name: String,
  pub platform: String,
  pub architecture: String,
  pub configuration: String,
  pub binary_modules: Vec<BinaryModuleInfo>,
}

impl BuildTargetInfo {
  pub fn new(target: &str, tuple: &BuildTuple) -> Self {
    Self {
      name: target.to_string(),
      platform: tuple.platform.to_string(),
      architecture: tuple.architecture.to_string(),
      configuration: tuple.configuration.to_string(),
      binary_modules: Vec::new(),
    }
  }

  pub fn file_path(output_folder: &Path, target: &str) -> PathBuf {
    output_folder.join(format!("{target}.Build.json"))
  }

  /// Write the info file unless it already has this content.
  pub fn write(&self, output_folder: &Path) -> io::Result<bool> {
    let json = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
    let path = Self::file_path(output_folder, &self.name);
    let written = write_if_changed(&path, json.as_bytes())?;
    debug!(path = %path.display(), written, "target build info");
    Ok(written)
  }
}

/// A binary-module group as presented to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupOverview {
  pub name: String,
  pub modules: Vec<String>,
}

/// Summary of a target's rules, resolved for one tuple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetOverview {
  pub name: String,
  pub kind: String,
  pub link_type: String,
  pub output_type: String,
  /// Resolved modules, dependencies first.
  pub modules: Vec<String>,
  /// Binary modules whose sources live in the target's workspace.
  pub binary_modules: Vec<GroupOverview>,
  pub tuples: Vec<String>,
}

/// Resolve `target` for the first requested tuple and describe it.
pub fn describe_target(
  registry: &RulesRegistry,
  target: &Target,
  config: &BuildConfig,
) -> Result<TargetOverview, ResolveError> {
  let tuple = config.requested_tuples().into_iter().next().unwrap_or_else(|| {
    BuildTuple::new(
      TargetPlatform::Linux,
      TargetArchitecture::X64,
      TargetConfiguration::Development,
    )
  });
  let mut options = BuildOptions::new(
    tuple,
    &config.root,
    config.target_intermediate_folder(&target.name, &tuple),
    config.target_output_folder(&target.name, &tuple),
  );
  target.setup_target_environment(&mut options);
  let resolved = resolve_modules(registry, target, &options)?;
  let groups = group_binary_modules(resolved.order());

  let kind = match &target.kind {
    TargetKind::Standalone => "standalone",
    TargetKind::Engine { .. } => "engine",
    TargetKind::Game { .. } => "game",
  };
  let mut tuples = Vec::new();
  for &platform in &target.platforms {
    for &architecture in &target.architectures {
      if platform.supports(architecture) {
        tuples.push(format!("{platform} {architecture}"));
      }
    }
  }

  Ok(TargetOverview {
    name: target.name.clone(),
    kind: kind.to_string(),
    link_type: format!("{:?}", target.link_type),
    output_type: format!("{:?}", target.output_type),
    modules: resolved.order().iter().map(|m| m.name.clone()).collect(),
    binary_modules: workspace_groups(&groups, target.workspace_root())
      .into_iter()
      .map(|group| GroupOverview {
        name: group.name,
        modules: group.modules.iter().map(|m| m.name.clone()).collect(),
      })
      .collect(),
    tuples,
  })
}
