mod build;
mod clean;
mod info;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use kiln_lib::config::BuildConfig;
use kiln_lib::rules::RulesRegistry;
use kiln_lib::rules::manifest::RulesManifest;
use tracing::debug;

pub use build::{BuildRequest, cmd_build};
pub use clean::cmd_clean;
pub use info::cmd_info;

/// A loaded rules manifest with the registry and configuration derived from it.
pub struct Workspace {
  pub manifest: RulesManifest,
  pub registry: RulesRegistry,
  pub config: BuildConfig,
}

/// Load the manifest at `path`; its directory becomes the workspace root.
pub fn load_workspace(path: &Path) -> Result<Workspace> {
  let path = dunce::canonicalize(path).with_context(|| format!("Rules manifest not found: {}", path.display()))?;
  let root = path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));

  let manifest = RulesManifest::load(&path)?;
  let registry = manifest
    .to_registry(&root)
    .with_context(|| format!("Invalid rules in {}", path.display()))?;

  debug!(
    manifest = %path.display(),
    targets = registry.targets().len(),
    modules = registry.modules().len(),
    "loaded rules"
  );

  let mut config = BuildConfig::new(&root);
  config.apply_settings(&manifest.build);

  Ok(Workspace {
    manifest,
    registry,
    config,
  })
}
