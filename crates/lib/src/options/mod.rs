//! Per-module build environments.
//!
//! A [`BuildOptions`] holds everything needed to compile and link one module (or a
//! whole target) under a single [`BuildTuple`]. Settings are split into public and
//! private partitions: public entries are inherited by modules that depend on the
//! owner, private entries only affect the owner.

pub mod compile;
pub mod link;

use std::path::{Path, PathBuf};

use tracing::trace;
use walkdir::WalkDir;

use crate::platform::{BuildTuple, TargetConfiguration};

pub use compile::{CompileEnv, CppVersion, OptimizationHint};
pub use link::{LinkEnv, LinkerOutput};

/// File extensions compiled as C/C++ translation units.
pub const SOURCE_EXTENSIONS: &[&str] = &["c", "cc", "cpp", "cxx"];

/// File extensions treated as headers.
pub const HEADER_EXTENSIONS: &[&str] = &["h", "hh", "hpp", "hxx", "inl"];

/// Resolved build environment of one module (or target) for one build tuple.
#[derive(Debug, Clone)]
pub struct BuildOptions {
  pub tuple: BuildTuple,
  /// Directory command-line tools run in.
  pub working_directory: PathBuf,
  /// Folder for objects, caches and generated code.
  pub intermediate_folder: PathBuf,
  /// Folder receiving link artifacts.
  pub output_folder: PathBuf,
  /// Folder receiving generated sources.
  pub generated_folder: PathBuf,
  /// Directories scanned recursively for source files.
  pub source_paths: Vec<PathBuf>,
  /// Explicit source files to compile.
  pub source_files: Vec<PathBuf>,
  pub public_definitions: Vec<String>,
  pub private_definitions: Vec<String>,
  pub public_include_paths: Vec<PathBuf>,
  pub private_include_paths: Vec<PathBuf>,
  pub public_dependencies: Vec<String>,
  pub private_dependencies: Vec<String>,
  /// Libraries required by this module and everything it depends on.
  pub libraries: Vec<String>,
  /// Files the module's consumers must link against.
  pub output_files: Vec<PathBuf>,
  /// Extra files the build outputs rely on at runtime.
  pub dependency_files: Vec<PathBuf>,
  pub compile_env: CompileEnv,
  pub link_env: LinkEnv,
}

impl BuildOptions {
  /// Create an empty environment rooted at the given folders.
  pub fn new(
    tuple: BuildTuple,
    working_directory: impl Into<PathBuf>,
    intermediate_folder: impl Into<PathBuf>,
    output_folder: impl Into<PathBuf>,
  ) -> Self {
    let intermediate_folder = intermediate_folder.into();
    Self {
      tuple,
      working_directory: working_directory.into(),
      generated_folder: intermediate_folder.join("Generated"),
      intermediate_folder,
      output_folder: output_folder.into(),
      source_paths: Vec::new(),
      source_files: Vec::new(),
      public_definitions: Vec::new(),
      private_definitions: Vec::new(),
      public_include_paths: Vec::new(),
      private_include_paths: Vec::new(),
      public_dependencies: Vec::new(),
      private_dependencies: Vec::new(),
      libraries: Vec::new(),
      output_files: Vec::new(),
      dependency_files: Vec::new(),
      compile_env: CompileEnv::default(),
      link_env: LinkEnv::default(),
    }
  }

  pub fn configuration(&self) -> TargetConfiguration {
    self.tuple.configuration
  }

  /// Derive a fresh module environment from a target environment.
  ///
  /// Compile and link settings are inherited; the public/private partitions and file
  /// lists start empty so every module declares its own.
  pub fn for_module(&self, module_name: &str) -> Self {
    let intermediate_folder = self.intermediate_folder.join(module_name);
    Self {
      tuple: self.tuple,
      working_directory: self.working_directory.clone(),
      generated_folder: intermediate_folder.join("Generated"),
      intermediate_folder,
      output_folder: self.output_folder.clone(),
      source_paths: Vec::new(),
      source_files: Vec::new(),
      public_definitions: Vec::new(),
      private_definitions: Vec::new(),
      public_include_paths: Vec::new(),
      private_include_paths: Vec::new(),
      public_dependencies: Vec::new(),
      private_dependencies: Vec::new(),
      libraries: Vec::new(),
      output_files: Vec::new(),
      dependency_files: Vec::new(),
      compile_env: self.compile_env.clone(),
      link_env: LinkEnv {
        input_files: Vec::new(),
        ..self.link_env.clone()
      },
    }
  }

  /// All dependency names, private first, without duplicates.
  pub fn all_dependencies(&self) -> Vec<String> {
    let mut deps = self.private_dependencies.clone();
    append_unique(&mut deps, self.public_dependencies.iter().cloned());
    deps
  }

  /// Expand `source_paths` into `source_files`.
  ///
  /// Every C/C++ translation unit below each source path is appended once, in
  /// sorted order. The source paths are consumed.
  pub fn fill_source_files_from_source_paths(&mut self) {
    let paths = std::mem::take(&mut self.source_paths);
    for path in paths {
      let found = collect_files(&path, SOURCE_EXTENSIONS);
      trace!(path = %path.display(), count = found.len(), "collected source files");
      append_unique(&mut self.source_files, found);
    }
  }

  /// Fold public and private settings into the compile environment.
  ///
  /// Call once after dependency inheritance; the compile environment then holds
  /// everything the toolchain needs.
  pub fn finalize_compile_env(&mut self) {
    append_unique(
      &mut self.compile_env.preprocessor_definitions,
      self.public_definitions.iter().chain(&self.private_definitions).cloned(),
    );
    append_unique(
      &mut self.compile_env.include_paths,
      self
        .public_include_paths
        .iter()
        .chain(&self.private_include_paths)
        .map(|p| p.to_string_lossy().into_owned()),
    );
  }
}

/// Append items that are not already present, preserving insertion order.
pub fn append_unique<T: PartialEq>(target: &mut Vec<T>, items: impl IntoIterator<Item = T>) {
  for item in items {
    if !target.contains(&item) {
      target.push(item);
    }
  }
}

/// Recursively list files under `root` whose extension is in `extensions`.
pub fn collect_files(root: &Path, extensions: &[&str]) -> Vec<PathBuf> {
  let mut files: Vec<PathBuf> = WalkDir::new(root)
    .into_iter()
    .filter_map(|entry| entry.ok())
    .filter(|entry| entry.file_type().is_file())
    .map(|entry| entry.into_path())
    .filter(|path| has_extension(path, extensions))
    .collect();
  files.sort();
  files
}

/// Whether the path's extension (case-insensitive) is one of `extensions`.
pub fn has_extension(path: &Path, extensions: &[&str]) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}
