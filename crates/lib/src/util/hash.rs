//! Fingerprints for work-item and cache invalidation.
//!
//! A [`Fingerprint`] is a SHA-256 over the JSON serialization of a value, so any
//! change to a command line, file list or configuration knob yields a new key.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::consts::FINGERPRINT_LEN;

pub type HashError = serde_json::Error;

/// Truncated lowercase hex SHA-256 identifying a configuration or work item.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub String);

impl std::fmt::Display for Fingerprint {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

pub trait Fingerprintable: Serialize {
  fn fingerprint(&self) -> Result<Fingerprint, HashError> {
    let serialized = serde_json::to_string(self)?;
    Ok(hash_bytes(serialized.as_bytes()))
  }
}

impl<T: Serialize> Fingerprintable for T {}

/// Hash arbitrary bytes into a fingerprint.
pub fn hash_bytes(data: &[u8]) -> Fingerprint {
  let mut hasher = Sha256::new();
  hasher.update(data);
  let full = hex::encode(hasher.finalize());
  Fingerprint(full[..FINGERPRINT_LEN].to_string())
}
