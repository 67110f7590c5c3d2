//! Code-generation header cache.
//!
//! Remembers, per module, which headers contain reflection markup so unchanged
//! headers need not be re-read on every build. The cache is keyed by the tool
//! version and a fingerprint of the configuration; if either, or the number of
//! headers, differs from what was recorded the whole module cache is discarded.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::consts::CODEGEN_CACHE_VERSION;
use crate::options::BuildOptions;
use crate::platform::{TargetArchitecture, TargetConfiguration, TargetPlatform};
use crate::util::fs::{modified_nanos, write_atomic};

/// Configuration knobs that invalidate generated code when they change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeGenFingerprint {
  pub intermediate_folder: PathBuf,
  pub platform: TargetPlatform,
  pub architecture: TargetArchitecture,
  pub configuration: TargetConfiguration,
  pub public_definitions: Vec<String>,
  pub private_definitions: Vec<String>,
  pub compile_definitions: Vec<String>,
}

impl CodeGenFingerprint {
  pub fn from_options(options: &BuildOptions) -> Self {
    Self {
      intermediate_folder: options.intermediate_folder.clone(),
      platform: options.tuple.platform,
      architecture: options.tuple.architecture,
      configuration: options.tuple.configuration,
      public_definitions: options.public_definitions.clone(),
      private_definitions: options.private_definitions.clone(),
      compile_definitions: options.compile_env.preprocessor_definitions.clone(),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct HeaderEntry {
  write_time: u64,
  contains_markup: bool,
}

/// On-disk layout. `version` must stay the first field.
#[derive(Debug, Serialize, Deserialize)]
struct CodeGenCacheFile {
  version: u32,
  tool_version: String,
  fingerprint: CodeGenFingerprint,
  header_count: usize,
  headers: Vec<(PathBuf, u64, bool)>,
}

/// Markup classification cache of one module.
#[derive(Debug)]
pub struct CodeGenCache {
  path: PathBuf,
  tool_version: String,
  fingerprint: CodeGenFingerprint,
  markup_tokens: Vec<String>,
  headers: HashMap<PathBuf, HeaderEntry>,
  dirty: bool,
}

impl CodeGenCache {
  /// Load the cache at `path`, discarding it unless it was written for the same
  /// tool version, fingerprint and header count.
  ///
  /// Never fails: unreadable or corrupt files yield an empty cache.
  pub fn load(
    path: impl Into<PathBuf>,
    tool_version: &str,
    fingerprint: CodeGenFingerprint,
    header_count: usize,
    markup_tokens: &[String],
  ) -> Self {
    let mut cache = Self {
      path: path.into(),
      tool_version: tool_version.to_string(),
      fingerprint,
      markup_tokens: markup_tokens.to_vec(),
      headers: HashMap::new(),
      dirty: true,
    };

    let content = match fs::read(&cache.path) {
      Ok(content) => content,
      Err(err) if err.kind() == io::ErrorKind::NotFound => return cache,
      Err(err) => {
        warn!(path = %cache.path.display(), error = %err, "failed to read code-generation cache");
        return cache;
      }
    };

    let file: CodeGenCacheFile = match serde_json::from_slice(&content) {
      Ok(file) => file,
      Err(err) => {
        warn!(path = %cache.path.display(), error = %err, "corrupt code-generation cache");
        return cache;
      }
    };

    if file.version != CODEGEN_CACHE_VERSION
      || file.tool_version != cache.tool_version
      || file.fingerprint != cache.fingerprint
      || file.header_count != header_count
      || file.headers.len() != header_count
    {
      debug!(path = %cache.path.display(), "code-generation cache is stale, rescanning all headers");
      return cache;
    }

    cache.headers = file
      .headers
      .into_iter()
      .map(|(path, write_time, contains_markup)| {
        (
          path,
          HeaderEntry {
            write_time,
            contains_markup,
          },
        )
      })
      .collect();
    cache.dirty = false;
    cache
  }

  /// Whether `header` contains reflection markup.
  ///
  /// Uses the cached answer unless the file was written after it was recorded.
  pub fn contains_markup(&mut self, header: &Path) -> bool {
    let Some(write_time) = modified_nanos(header) else {
      return false;
    };
    if let Some(entry) = self.headers.get(header)
      && write_time <= entry.write_time
    {
      return entry.contains_markup;
    }

    let contains_markup = scan_for_markup(header, &self.markup_tokens);
    self.headers.insert(
      header.to_path_buf(),
      HeaderEntry {
        write_time,
        contains_markup,
      },
    );
    self.dirty = true;
    contains_markup
  }

  /// Whether the cache changed since it was loaded.
  pub fn is_dirty(&self) -> bool {
    self.dirty
  }

  /// Number of headers with a cached classification.
  pub fn len(&self) -> usize {
    self.headers.len()
  }

  pub fn is_empty(&self) -> bool {
    self.headers.is_empty()
  }

  /// Persist the cache if it changed.
  pub fn save(&self) -> io::Result<()> {
    if !self.dirty {
      return Ok(());
    }
    let mut headers: Vec<(PathBuf, u64, bool)> = self
      .headers
      .iter()
      .map(|(path, entry)| (path.clone(), entry.write_time, entry.contains_markup))
      .collect();
    headers.sort();
    let file = CodeGenCacheFile {
      version: CODEGEN_CACHE_VERSION,
      tool_version: self.tool_version.clone(),
      fingerprint: self.fingerprint.clone(),
      header_count: headers.len(),
      headers,
    };
    let json = serde_json::to_vec(&file).map_err(io::Error::other)?;
    write_atomic(&self.path, &json)
  }
}

fn scan_for_markup(header: &Path, tokens: &[String]) -> bool {
  match fs::read_to_string(header) {
    Ok(contents) => tokens.iter().any(|token| contents.contains(token.as_str())),
    Err(_) => false,
  }
}
