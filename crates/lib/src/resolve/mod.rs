//! Module environment resolution.
//!
//! Walks a target's module graph depth first and produces one [`BuildOptions`] per
//! reachable module. A module is resolved only after every module it depends on,
//! so by the time its own environment is assembled the public settings of its
//! whole dependency closure are available to merge.
//!
//! Merge rules, for a dependent `M` and a dependency `D`:
//! - `D`'s public include paths and definitions land in `M`'s private partition if
//!   `M` depends on `D` privately, in `M`'s public partition otherwise.
//! - `D`'s public dependencies become dependencies of `M` with the visibility of
//!   `M`'s own declaration, which is how public dependencies propagate one level
//!   further per hop.
//! - `D`'s libraries are always forwarded to `M`.
//!
//! Link inputs are merged separately by [`inherit_link_inputs`] once dependency
//! output files are known.

pub mod visibility;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, trace};

use crate::options::{BuildOptions, append_unique};
use crate::rules::{Module, RulesRegistry, Target};

pub use visibility::apply_api_defines;

/// Configuration errors found while walking the module graph.
#[derive(Debug, Error)]
pub enum ResolveError {
  #[error("target {target}: module {dependency} required by {module} was not found")]
  MissingModule {
    target: String,
    /// Module (or target) that referenced the missing name.
    module: String,
    dependency: String,
  },

  #[error("target {target}: circular module dependency {chain}")]
  CircularDependency { target: String, chain: String },
}

/// Every module reachable from a target, with its resolved environment.
#[derive(Debug, Default)]
pub struct ResolvedModules {
  options: HashMap<String, BuildOptions>,
  /// Dependencies before dependents.
  order: Vec<Arc<Module>>,
}

impl ResolvedModules {
  /// Modules in resolution order: every module after all of its dependencies.
  pub fn order(&self) -> &[Arc<Module>] {
    &self.order
  }

  pub fn get(&self, module: &str) -> Option<&BuildOptions> {
    self.options.get(module)
  }

  pub fn get_mut(&mut self, module: &str) -> Option<&mut BuildOptions> {
    self.options.get_mut(module)
  }

  pub fn module(&self, name: &str) -> Option<&Arc<Module>> {
    self
      .order
      .iter()
      .find(|m| m.name == name)
      .or_else(|| self.order.iter().find(|m| m.name.eq_ignore_ascii_case(name)))
  }

  pub fn contains(&self, module: &str) -> bool {
    self.options.contains_key(module)
  }

  pub fn len(&self) -> usize {
    self.order.len()
  }

  pub fn is_empty(&self) -> bool {
    self.order.is_empty()
  }

  /// Canonical names of the dependencies a resolved module ended up with.
  pub fn dependencies_of(&self, module: &str) -> Vec<String> {
    let Some(options) = self.options.get(module) else {
      return Vec::new();
    };
    let mut names = Vec::new();
    for dep in options.all_dependencies() {
      if let Some(resolved) = self.module(&dep) {
        append_unique(&mut names, [resolved.name.clone()]);
      }
    }
    names
  }
}

struct Resolver<'a> {
  registry: &'a RulesRegistry,
  target: &'a Target,
  target_options: &'a BuildOptions,
  resolved: ResolvedModules,
  /// Modules on the current DFS path, for cycle reporting.
  stack: Vec<String>,
  visiting: HashSet<String>,
}

/// Resolve every module reachable from `target`'s root modules.
///
/// # Errors
///
/// Fails on the first missing or circular dependency; both make the target's
/// binaries impossible to link correctly.
pub fn resolve_modules(
  registry: &RulesRegistry,
  target: &Target,
  target_options: &BuildOptions,
) -> Result<ResolvedModules, ResolveError> {
  let mut resolver = Resolver {
    registry,
    target,
    target_options,
    resolved: ResolvedModules::default(),
    stack: Vec::new(),
    visiting: HashSet::new(),
  };

  for name in &target.modules {
    let module = resolver.lookup(&target.name, name)?;
    resolver.resolve(&module)?;
  }

  debug!(
    target = %target.name,
    modules = resolver.resolved.len(),
    "resolved module environments"
  );
  Ok(resolver.resolved)
}

impl Resolver<'_> {
  fn lookup(&self, referenced_by: &str, name: &str) -> Result<Arc<Module>, ResolveError> {
    self
      .registry
      .module(name)
      .cloned()
      .ok_or_else(|| ResolveError::MissingModule {
        target: self.target.name.clone(),
        module: referenced_by.to_string(),
        dependency: name.to_string(),
      })
  }

  fn resolve(&mut self, module: &Arc<Module>) -> Result<(), ResolveError> {
    if self.resolved.contains(&module.name) {
      return Ok(());
    }
    if self.visiting.contains(&module.name) {
      let start = self.stack.iter().position(|m| *m == module.name).unwrap_or(0);
      let mut chain: Vec<&str> = self.stack[start..].iter().map(String::as_str).collect();
      chain.push(&module.name);
      return Err(ResolveError::CircularDependency {
        target: self.target.name.clone(),
        chain: chain.join(" -> "),
      });
    }

    self.visiting.insert(module.name.clone());
    self.stack.push(module.name.clone());

    let mut options = self.target_options.for_module(&module.name);
    module.setup_environment(&mut options);
    options.fill_source_files_from_source_paths();

    let private = options.private_dependencies.clone();
    let public = options.public_dependencies.clone();
    for (names, is_public) in [(private, false), (public, true)] {
      for name in names {
        let dependency = self.lookup(&module.name, &name)?;
        self.resolve(&dependency)?;
        if let Some(dep_options) = self.resolved.get(&dependency.name) {
          merge_dependency(&mut options, dep_options, is_public);
        }
      }
    }

    trace!(
      module = %module.name,
      public_dependencies = ?options.public_dependencies,
      private_dependencies = ?options.private_dependencies,
      "resolved module"
    );

    self.stack.pop();
    self.visiting.remove(&module.name);
    self.resolved.options.insert(module.name.clone(), options);
    self.resolved.order.push(module.clone());
    Ok(())
  }
}

/// Fold a dependency's public settings into its dependent.
fn merge_dependency(options: &mut BuildOptions, dependency: &BuildOptions, is_public: bool) {
  let public_deps = dependency.public_dependencies.iter().cloned();
  if is_public {
    append_unique(&mut options.public_include_paths, dependency.public_include_paths.iter().cloned());
    append_unique(&mut options.public_definitions, dependency.public_definitions.iter().cloned());
    append_unique(&mut options.public_dependencies, public_deps);
  } else {
    append_unique(&mut options.private_include_paths, dependency.public_include_paths.iter().cloned());
    append_unique(&mut options.private_definitions, dependency.public_definitions.iter().cloned());
    append_unique(&mut options.private_dependencies, public_deps);
  }
  append_unique(&mut options.libraries, dependency.libraries.iter().cloned());
}

/// Append the output and runtime files of every dependency of `module` to its link
/// environment.
///
/// Must run after the dependencies were planned, since their output files are only
/// known then.
pub fn inherit_link_inputs(resolved: &mut ResolvedModules, module: &str) {
  let mut input_files = Vec::new();
  let mut dependency_files = Vec::new();
  for dep in resolved.dependencies_of(module) {
    if let Some(dep_options) = resolved.get(&dep) {
      input_files.extend(dep_options.output_files.iter().cloned());
      dependency_files.extend(dep_options.dependency_files.iter().cloned());
    }
  }
  if let Some(options) = resolved.get_mut(module) {
    append_unique(&mut options.link_env.input_files, input_files);
    append_unique(&mut options.dependency_files, dependency_files);
  }
}
