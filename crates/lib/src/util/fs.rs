//! File system helpers shared by the caches and the build driver.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Last write time of `path` in nanoseconds since the Unix epoch.
///
/// Returns `None` if the file does not exist or its timestamp is unavailable.
pub fn modified_nanos(path: &Path) -> Option<u64> {
  let modified = fs::metadata(path).ok()?.modified().ok()?;
  let since_epoch = modified.duration_since(UNIX_EPOCH).ok()?;
  u64::try_from(since_epoch.as_nanos()).ok()
}

/// Lexically remove `.` and `..` components without touching the file system.
pub fn normalize_path(path: &Path) -> PathBuf {
  let mut normalized = PathBuf::new();
  for component in path.components() {
    match component {
      Component::CurDir => {}
      Component::ParentDir => {
        if !normalized.pop() {
          normalized.push("..");
        }
      }
      other => normalized.push(other.as_os_str()),
    }
  }
  normalized
}

/// Write `contents` to `path` unless the file already holds exactly those bytes.
///
/// Returns `true` if the file was written.
pub fn write_if_changed(path: &Path, contents: &[u8]) -> io::Result<bool> {
  if let Ok(existing) = fs::read(path)
    && existing == contents
  {
    return Ok(false);
  }
  write_atomic(path, contents)?;
  Ok(true)
}

/// Write through a temporary sibling file and rename it into place.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent)?;
  }
  let tmp_path = path.with_extension("tmp");
  fs::write(&tmp_path, contents)?;
  fs::rename(&tmp_path, path)
}

/// Remove a directory tree, ignoring a missing directory.
pub fn remove_dir_if_exists(path: &Path) -> io::Result<()> {
  match fs::remove_dir_all(path) {
    Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
    other => other,
  }
}
