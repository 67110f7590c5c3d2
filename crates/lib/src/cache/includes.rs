//! Include-closure scanning.
//!
//! Finds the headers a source file includes, directly and transitively, with a
//! lightweight lexical scan of `#include` directives. The closure becomes the
//! prerequisite list of the file's compile item, so touching any header re-runs
//! every compile item that reaches it.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::trace;

use crate::util::fs::normalize_path;

/// Memoizing include scanner for one workspace.
///
/// Included names are resolved against the engine source root, then the
/// including file's folder, then each referenced project's source root; the first
/// existing file wins. Includes that resolve nowhere (system headers) are ignored.
#[derive(Debug, Default)]
pub struct IncludeScanner {
  engine_source_root: Option<PathBuf>,
  project_roots: Vec<PathBuf>,
  direct: HashMap<PathBuf, Vec<PathBuf>>,
  closures: HashMap<PathBuf, Vec<PathBuf>>,
}

impl IncludeScanner {
  pub fn new(engine_source_root: Option<PathBuf>, project_roots: Vec<PathBuf>) -> Self {
    Self {
      engine_source_root,
      project_roots,
      direct: HashMap::new(),
      closures: HashMap::new(),
    }
  }

  /// Every header reachable from `file`, in discovery order, excluding `file`.
  pub fn find_all_includes(&mut self, file: &Path) -> Vec<PathBuf> {
    let file = normalize_path(file);
    if let Some(closure) = self.closures.get(&file) {
      return closure.clone();
    }

    let mut closure = Vec::new();
    let mut seen = HashSet::from([file.clone()]);
    let mut stack = vec![file.clone()];
    while let Some(current) = stack.pop() {
      for include in self.direct_includes(&current) {
        if seen.insert(include.clone()) {
          closure.push(include.clone());
          stack.push(include);
        }
      }
    }

    trace!(file = %file.display(), includes = closure.len(), "resolved include closure");
    self.closures.insert(file, closure.clone());
    closure
  }

  /// Headers directly included by `file` that resolve to existing files.
  pub fn direct_includes(&mut self, file: &Path) -> Vec<PathBuf> {
    if let Some(direct) = self.direct.get(file) {
      return direct.clone();
    }

    // Unreadable files simply contribute no includes.
    let contents = fs::read(file).unwrap_or_default();
    let including_dir = file.parent().unwrap_or(Path::new(""));
    let resolved: Vec<PathBuf> = parse_include_directives(&contents)
      .iter()
      .filter_map(|name| self.resolve(name, including_dir))
      .collect();

    self.direct.insert(file.to_path_buf(), resolved.clone());
    resolved
  }

  fn resolve(&self, name: &str, including_dir: &Path) -> Option<PathBuf> {
    self
      .engine_source_root
      .iter()
      .map(PathBuf::as_path)
      .chain(std::iter::once(including_dir))
      .chain(self.project_roots.iter().map(PathBuf::as_path))
      .map(|root| normalize_path(&root.join(name)))
      .find(|candidate| candidate.is_file())
  }
}

/// Names referenced by `#include "x"` and `#include <x>` directives.
///
/// Comments and string or character literals are skipped so commented-out
/// directives and quoted text never count.
pub fn parse_include_directives(source: &[u8]) -> Vec<String> {
  let mut includes = Vec::new();
  let len = source.len();
  let mut i = 0;
  let mut line_start = true;

  while i < len {
    match source[i] {
      b'\n' => {
        line_start = true;
        i += 1;
      }
      b' ' | b'\t' | b'\r' => i += 1,
      b'/' if source.get(i + 1) == Some(&b'/') => {
        while i < len && source[i] != b'\n' {
          i += 1;
        }
      }
      b'/' if source.get(i + 1) == Some(&b'*') => {
        i += 2;
        while i < len && !(source[i] == b'*' && source.get(i + 1) == Some(&b'/')) {
          i += 1;
        }
        i = (i + 2).min(len);
      }
      quote @ (b'"' | b'\'') => {
        line_start = false;
        i += 1;
        while i < len && source[i] != quote && source[i] != b'\n' {
          if source[i] == b'\\' {
            i += 1;
          }
          i += 1;
        }
        i += 1;
      }
      b'#' if line_start => {
        line_start = false;
        i += 1;
        while i < len && matches!(source[i], b' ' | b'\t') {
          i += 1;
        }
        if source[i..].starts_with(b"include") {
          i += "include".len();
          while i < len && matches!(source[i], b' ' | b'\t') {
            i += 1;
          }
          let close = match source.get(i) {
            Some(b'"') => Some(b'"'),
            Some(b'<') => Some(b'>'),
            _ => None,
          };
          if let Some(close) = close {
            let start = i + 1;
            let mut end = start;
            while end < len && source[end] != close && source[end] != b'\n' {
              end += 1;
            }
            if end < len && source[end] == close {
              if end > start {
                includes.push(String::from_utf8_lossy(&source[start..end]).into_owned());
              }
              i = end + 1;
            } else {
              // Unterminated; the newline arm starts the next line.
              i = end;
            }
          }
        }
      }
      _ => {
        line_start = false;
        i += 1;
      }
    }
  }

  includes
}
