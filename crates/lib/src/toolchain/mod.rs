//! Toolchain seam.
//!
//! A toolchain turns a resolved environment into work items: one compile item per
//! source file and one link item per binary. It never runs anything itself; the
//! task graph does.

pub mod gnu;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::cache::IncludeScanner;
use crate::consts::OBJECT_HASH_LEN;
use crate::graph::TaskGraph;
use crate::options::BuildOptions;
use crate::platform::BuildTuple;
use crate::util::hash::hash_bytes;

pub use gnu::{GnuToolchain, GnuToolchainConfig};

#[derive(Debug, Error)]
pub enum ToolchainError {
  #[error("toolchain {toolchain} cannot build for {tuple}")]
  Unsupported { toolchain: String, tuple: BuildTuple },

  #[error("source file {0} has no file name")]
  InvalidSource(PathBuf),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// Files produced by the compile items of one module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileOutput {
  pub object_files: Vec<PathBuf>,
  pub debug_data_files: Vec<PathBuf>,
}

/// Files produced by one link item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkOutput {
  pub artifact: PathBuf,
  /// Import library companion, on platforms that have them.
  pub import_library: Option<PathBuf>,
}

impl LinkOutput {
  /// The file other binaries link against to use this one.
  pub fn link_artifact(&self) -> &Path {
    self.import_library.as_deref().unwrap_or(&self.artifact)
  }
}

/// Registers compile and link work items for one platform family.
pub trait Toolchain: Send + Sync {
  fn name(&self) -> &str;

  /// Whether this toolchain can produce binaries for `tuple`.
  fn supports(&self, _tuple: &BuildTuple) -> bool {
    true
  }

  /// Value of `<GROUP>_API` for code compiled into the group's own binary.
  fn dll_export(&self, tuple: &BuildTuple) -> String;

  /// Value of `<GROUP>_API` for code using another binary's symbols.
  fn dll_import(&self, tuple: &BuildTuple) -> String;

  /// Add toolchain-wide settings to a target environment.
  fn setup_environment(&self, _options: &mut BuildOptions) {}

  /// Register one compile item per source file.
  ///
  /// Each item's prerequisites are the source file plus its include closure, so
  /// touching any header it reaches re-runs it.
  fn compile_sources(
    &self,
    graph: &mut TaskGraph,
    includes: &mut IncludeScanner,
    options: &BuildOptions,
    sources: &[PathBuf],
    output_dir: &Path,
  ) -> Result<CompileOutput, ToolchainError>;

  /// Register one link item consuming `options.link_env.input_files`.
  fn link_objects(
    &self,
    graph: &mut TaskGraph,
    options: &BuildOptions,
    output_path: &Path,
  ) -> Result<LinkOutput, ToolchainError>;
}

/// Object file of every source in `sources`, all distinct within `output_dir`.
///
/// An object is named after its source's file stem. Sources sharing a stem with
/// another source (`Linux/File.cpp` and `Windows/File.cpp`, or `Foo.c` and
/// `Foo.cpp`) also carry a short hash of their full path. Stems compare
/// case-insensitively so the names stay distinct on case-insensitive file systems.
pub fn object_file_paths(sources: &[PathBuf], output_dir: &Path, extension: &str) -> Result<Vec<PathBuf>, ToolchainError> {
  let stems = sources
    .iter()
    .map(|source| {
      source
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .ok_or_else(|| ToolchainError::InvalidSource(source.clone()))
    })
    .collect::<Result<Vec<_>, _>>()?;

  let mut counts: HashMap<String, usize> = HashMap::new();
  for stem in &stems {
    *counts.entry(stem.to_lowercase()).or_default() += 1;
  }

  Ok(
    sources
      .iter()
      .zip(&stems)
      .map(|(source, stem)| {
        let shared = counts.get(&stem.to_lowercase()).is_some_and(|&n| n > 1);
        let name = if shared {
          let hash = hash_bytes(source.to_string_lossy().as_bytes());
          format!("{stem}.{}{extension}", &hash.0[..OBJECT_HASH_LEN])
        } else {
          format!("{stem}{extension}")
        };
        output_dir.join(name)
      })
      .collect(),
  )
}
