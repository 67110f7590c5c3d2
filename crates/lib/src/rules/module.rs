//! Module descriptors.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::options::{BuildOptions, append_unique};

/// Hooks a rules author can attach to a module.
///
/// Both hooks have empty default bodies so an implementor overrides only what it
/// needs.
pub trait ModuleHooks: Send + Sync {
  /// Called once when the module is registered, without any build context.
  fn init(&self, _module: &Module) {}

  /// Called once per build tuple after the declared settings were applied.
  ///
  /// Implementations append to the option lists; they must not drop entries that
  /// are already present.
  fn setup_environment(&self, _module: &Module, _options: &mut BuildOptions) {}
}

/// Adapter turning a closure into [`ModuleHooks::setup_environment`].
pub struct SetupFn<F>(pub F);

impl<F> ModuleHooks for SetupFn<F>
where
  F: Fn(&Module, &mut BuildOptions) + Send + Sync,
{
  fn setup_environment(&self, module: &Module, options: &mut BuildOptions) {
    (self.0)(module, options)
  }
}

/// A named unit of source code with its declared dependencies.
#[derive(Clone)]
pub struct Module {
  pub name: String,
  /// Link-unit grouping key; empty means the module produces no binary of its own.
  pub binary_module_name: String,
  /// Root folder of the module's sources.
  pub folder: PathBuf,
  pub public_dependencies: Vec<String>,
  pub private_dependencies: Vec<String>,
  pub public_definitions: Vec<String>,
  pub private_definitions: Vec<String>,
  pub public_include_paths: Vec<PathBuf>,
  pub private_include_paths: Vec<PathBuf>,
  /// Extra source folders; the module folder is always scanned.
  pub source_paths: Vec<PathBuf>,
  pub source_files: Vec<PathBuf>,
  pub libraries: Vec<String>,
  hooks: Option<Arc<dyn ModuleHooks>>,
}

impl Module {
  pub fn new(name: impl Into<String>, folder: impl Into<PathBuf>) -> Self {
    Self {
      name: name.into(),
      binary_module_name: String::new(),
      folder: folder.into(),
      public_dependencies: Vec::new(),
      private_dependencies: Vec::new(),
      public_definitions: Vec::new(),
      private_definitions: Vec::new(),
      public_include_paths: Vec::new(),
      private_include_paths: Vec::new(),
      source_paths: Vec::new(),
      source_files: Vec::new(),
      libraries: Vec::new(),
      hooks: None,
    }
  }

  pub fn with_binary_module(mut self, name: impl Into<String>) -> Self {
    self.binary_module_name = name.into();
    self
  }

  pub fn with_public_dependency(mut self, name: impl Into<String>) -> Self {
    self.public_dependencies.push(name.into());
    self
  }

  pub fn with_private_dependency(mut self, name: impl Into<String>) -> Self {
    self.private_dependencies.push(name.into());
    self
  }

  pub fn with_public_include_path(mut self, path: impl Into<PathBuf>) -> Self {
    self.public_include_paths.push(path.into());
    self
  }

  pub fn with_private_include_path(mut self, path: impl Into<PathBuf>) -> Self {
    self.private_include_paths.push(path.into());
    self
  }

  pub fn with_public_definition(mut self, define: impl Into<String>) -> Self {
    self.public_definitions.push(define.into());
    self
  }

  pub fn with_private_definition(mut self, define: impl Into<String>) -> Self {
    self.private_definitions.push(define.into());
    self
  }

  pub fn with_library(mut self, library: impl Into<String>) -> Self {
    self.libraries.push(library.into());
    self
  }

  pub fn with_hooks(mut self, hooks: impl ModuleHooks + 'static) -> Self {
    self.hooks = Some(Arc::new(hooks));
    self
  }

  /// The binary-module name, or `None` when the module has none.
  pub fn binary_module(&self) -> Option<&str> {
    (!self.binary_module_name.is_empty()).then_some(self.binary_module_name.as_str())
  }

  pub fn init(&self) {
    if let Some(hooks) = &self.hooks {
      hooks.init(self);
    }
  }

  /// Write the module's declared settings into its fresh environment and run
  /// the setup hook.
  pub fn setup_environment(&self, options: &mut BuildOptions) {
    append_unique(&mut options.source_paths, [self.folder.clone()]);
    append_unique(&mut options.source_paths, self.source_paths.iter().cloned());
    append_unique(&mut options.source_files, self.source_files.iter().cloned());
    append_unique(&mut options.public_dependencies, self.public_dependencies.iter().cloned());
    append_unique(&mut options.private_dependencies, self.private_dependencies.iter().cloned());
    append_unique(&mut options.public_definitions, self.public_definitions.iter().cloned());
    append_unique(&mut options.private_definitions, self.private_definitions.iter().cloned());
    append_unique(&mut options.public_include_paths, self.public_include_paths.iter().cloned());
    append_unique(&mut options.private_include_paths, self.private_include_paths.iter().cloned());
    append_unique(&mut options.libraries, self.libraries.iter().cloned());

    if let Some(hooks) = &self.hooks {
      hooks.setup_environment(self, options);
    }
  }

  /// Whether the module folder lies below `root`.
  pub fn is_under(&self, root: &Path) -> bool {
    self.folder.starts_with(root)
  }
}

impl fmt::Debug for Module {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Module")
      .field("name", &self.name)
      .field("binary_module_name", &self.binary_module_name)
      .field("folder", &self.folder)
      .field("public_dependencies", &self.public_dependencies)
      .field("private_dependencies", &self.private_dependencies)
      .field("has_hooks", &self.hooks.is_some())
      .finish()
  }
}
