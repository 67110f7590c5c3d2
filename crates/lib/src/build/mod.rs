//! Build driver.
//!
//! A [`Builder`] owns all state of one build invocation: the per-process cache of
//! finished target builds, include-closure scanners and the reports shown to the
//! user. Every requested target is built independently for every requested tuple;
//! a failing target never stops its siblings.
//!
//! # Submodules
//!
//! - `target` - Per-target stage flow
//! - [`info`] - `<target>.Build.json` and rules overviews
//! - `generate` - Code-generation stage

mod generate;
pub mod info;
mod target;
mod types;

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info};

use crate::cache::IncludeScanner;
use crate::config::BuildConfig;
use crate::platform::BuildTuple;
use crate::rules::{RulesRegistry, Target};
use crate::toolchain::Toolchain;
use crate::util::fs::remove_dir_if_exists;

pub use info::{BinaryModuleInfo, BuildTargetInfo, GroupOverview, TargetOverview, describe_target};
pub use types::*;

/// Drives target builds for one invocation.
pub struct Builder<'a> {
  registry: &'a RulesRegistry,
  toolchain: &'a dyn Toolchain,
  config: BuildConfig,
  built: HashMap<(String, BuildTuple), Arc<TargetBuild>>,
  in_progress: HashSet<(String, BuildTuple)>,
  includes: HashMap<String, IncludeScanner>,
  reports: Vec<TargetReport>,
}

impl<'a> Builder<'a> {
  pub fn new(registry: &'a RulesRegistry, toolchain: &'a dyn Toolchain, config: BuildConfig) -> Self {
    Self {
      registry,
      toolchain,
      config,
      built: HashMap::new(),
      in_progress: HashSet::new(),
      includes: HashMap::new(),
      reports: Vec::new(),
    }
  }

  pub fn config(&self) -> &BuildConfig {
    &self.config
  }

  /// Targets named in the configuration, or every registered target.
  ///
  /// # Errors
  ///
  /// Returns `TargetNotFound` for the first unknown name.
  pub fn selected_targets(&self) -> Result<Vec<Arc<Target>>, BuildError> {
    if self.config.targets.is_empty() {
      return Ok(self.registry.targets().to_vec());
    }
    self
      .config
      .targets
      .iter()
      .map(|name| {
        self
          .registry
          .target(name)
          .cloned()
          .ok_or_else(|| BuildError::TargetNotFound(name.clone()))
      })
      .collect()
  }

  /// Build every selected target for every requested tuple.
  pub fn build(&mut self) -> BuildSummary {
    let started = Instant::now();
    let tuples = self.config.requested_tuples();
    let names: Vec<String> = if self.config.targets.is_empty() {
      self.registry.targets().iter().map(|t| t.name.clone()).collect()
    } else {
      self.config.targets.clone()
    };
    info!(targets = names.len(), tuples = tuples.len(), "starting build");

    for name in names {
      let Some(target) = self.registry.target(&name).cloned() else {
        let err = BuildError::TargetNotFound(name.clone());
        error!(target = %name, "target not found");
        self.reports.push(TargetReport {
          target: name,
          tuple: None,
          stage: BuildStage::Failed,
          failed_at: Some(BuildStage::NotStarted),
          skipped: false,
          result: Default::default(),
          error: Some(err.to_string()),
          elapsed: Default::default(),
        });
        continue;
      };
      for &tuple in &tuples {
        // Failures are recorded in the reports.
        let _ = self.build_target(&target, tuple);
      }
    }

    BuildSummary {
      reports: std::mem::take(&mut self.reports),
      elapsed: started.elapsed(),
    }
  }

  /// Remove the intermediate and output folders of every selected target.
  ///
  /// Returns the folders that were removed.
  pub fn clean(&self) -> Result<Vec<PathBuf>, BuildError> {
    let mut removed = Vec::new();
    for target in self.selected_targets()? {
      for folder in [
        self.config.intermediate_root().join(&target.name),
        self.config.binaries_root().join(&target.name),
      ] {
        if folder.exists() {
          remove_dir_if_exists(&folder).map_err(|source| BuildError::Io {
            path: folder.clone(),
            source,
          })?;
          info!(target = %target.name, folder = %folder.display(), "removed");
          removed.push(folder);
        }
      }
    }
    Ok(removed)
  }
}
