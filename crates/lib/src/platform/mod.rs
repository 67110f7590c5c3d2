//! Build tuple identifiers: target platform, CPU architecture and configuration.

pub mod arch;
pub mod config;
pub mod os;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use arch::TargetArchitecture;
pub use config::TargetConfiguration;
pub use os::TargetPlatform;

/// A platform, architecture or configuration name that could not be parsed.
#[derive(Debug, Clone, Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
  pub kind: &'static str,
  pub value: String,
}

impl ParseEnumError {
  fn new(kind: &'static str, value: &str) -> Self {
    Self {
      kind,
      value: value.to_string(),
    }
  }
}

/// One (platform, architecture, configuration) combination a target is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BuildTuple {
  pub platform: TargetPlatform,
  pub architecture: TargetArchitecture,
  pub configuration: TargetConfiguration,
}

impl BuildTuple {
  pub fn new(
    platform: TargetPlatform,
    architecture: TargetArchitecture,
    configuration: TargetConfiguration,
  ) -> Self {
    Self {
      platform,
      architecture,
      configuration,
    }
  }

  /// The tuple describing the machine the tool runs on, in the given configuration.
  ///
  /// Returns `None` if the host OS or architecture is not supported.
  pub fn host(configuration: TargetConfiguration) -> Option<Self> {
    Some(Self::new(
      TargetPlatform::host()?,
      TargetArchitecture::host()?,
      configuration,
    ))
  }

  /// Whether the platform can build for the architecture.
  pub fn is_supported(&self) -> bool {
    self.platform.supports(self.architecture)
  }
}

impl fmt::Display for BuildTuple {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {} {}", self.platform, self.architecture, self.configuration)
  }
}
