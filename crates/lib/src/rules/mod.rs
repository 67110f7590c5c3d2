//! Build rules: module and target descriptors plus the registry that owns them.
//!
//! Rules are registered explicitly. A rules author either builds descriptors in
//! code (attaching [`ModuleHooks`] / [`TargetHooks`] for custom setup) or describes
//! them declaratively in a manifest (see [`manifest`]).

pub mod manifest;
pub mod module;
pub mod target;

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

pub use module::{Module, ModuleHooks, SetupFn};
pub use target::{ProjectInfo, Target, TargetHooks, TargetKind, TargetLinkType, TargetOutputType};

/// Errors raised while loading rules.
#[derive(Debug, Error)]
pub enum RulesError {
  #[error("failed to read rules manifest {path}: {source}")]
  Read {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse rules manifest {path}: {source}")]
  Parse {
    path: String,
    #[source]
    source: toml::de::Error,
  },

  #[error("target {target} references unknown project {project}")]
  UnknownProject { target: String, project: String },

  #[error("project {project} references unknown project {reference}")]
  UnknownReference { project: String, reference: String },

  #[error("invalid target kind {kind} for target {target}")]
  InvalidKind { target: String, kind: String },
}

/// Lookup table of every module and target known to a build.
#[derive(Debug, Default)]
pub struct RulesRegistry {
  modules: Vec<Arc<Module>>,
  module_index: HashMap<String, usize>,
  targets: Vec<Arc<Target>>,
}

impl RulesRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a module, replacing any earlier module with the same name.
  pub fn register_module(&mut self, module: Module) -> Arc<Module> {
    module.init();
    let module = Arc::new(module);
    match self.module_index.get(&module.name) {
      Some(&index) => {
        warn!(module = %module.name, "module registered twice, replacing earlier definition");
        self.modules[index] = module.clone();
      }
      None => {
        debug!(module = %module.name, "registered module");
        self.module_index.insert(module.name.clone(), self.modules.len());
        self.modules.push(module.clone());
      }
    }
    module
  }

  /// Register a module produced by a factory function.
  pub fn register_module_with(&mut self, factory: impl FnOnce() -> Module) -> Arc<Module> {
    self.register_module(factory())
  }

  /// Register a target, replacing any earlier target with the same name.
  pub fn register_target(&mut self, target: Target) -> Arc<Target> {
    target.init();
    let target = Arc::new(target);
    if let Some(existing) = self.targets.iter_mut().find(|t| t.name == target.name) {
      warn!(target = %target.name, "target registered twice, replacing earlier definition");
      *existing = target.clone();
    } else {
      debug!(target = %target.name, "registered target");
      self.targets.push(target.clone());
    }
    target
  }

  /// Look up a module by exact name, falling back to a case-insensitive match.
  pub fn module(&self, name: &str) -> Option<&Arc<Module>> {
    if let Some(&index) = self.module_index.get(name) {
      return self.modules.get(index);
    }
    self.modules.iter().find(|m| m.name.eq_ignore_ascii_case(name))
  }

  /// Look up a target by exact name, falling back to a case-insensitive match.
  pub fn target(&self, name: &str) -> Option<&Arc<Target>> {
    self
      .targets
      .iter()
      .find(|t| t.name == name)
      .or_else(|| self.targets.iter().find(|t| t.name.eq_ignore_ascii_case(name)))
  }

  pub fn modules(&self) -> &[Arc<Module>] {
    &self.modules
  }

  pub fn targets(&self) -> &[Arc<Target>] {
    &self.targets
  }
}
