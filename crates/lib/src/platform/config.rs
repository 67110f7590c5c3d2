use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ParseEnumError;

/// Build configuration presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TargetConfiguration {
  /// No optimizations, full debug checks.
  Debug,
  /// Optimized with debug info, used during day to day development.
  Development,
  /// Fully optimized shipping build.
  Release,
}

impl TargetConfiguration {
  pub const ALL: [TargetConfiguration; 3] = [Self::Debug, Self::Development, Self::Release];

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Debug => "Debug",
      Self::Development => "Development",
      Self::Release => "Release",
    }
  }

  /// Preprocessor define identifying the configuration (e.g. `BUILD_DEBUG`).
  pub fn define(&self) -> String {
    format!("BUILD_{}", self.as_str().to_ascii_uppercase())
  }
}

impl fmt::Display for TargetConfiguration {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl FromStr for TargetConfiguration {
  type Err = ParseEnumError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "debug" => Ok(Self::Debug),
      "development" | "dev" => Ok(Self::Development),
      "release" => Ok(Self::Release),
      _ => Err(ParseEnumError::new("configuration", s)),
    }
  }
}

impl TryFrom<String> for TargetConfiguration {
  type Error = ParseEnumError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<TargetConfiguration> for String {
  fn from(value: TargetConfiguration) -> Self {
    value.as_str().to_string()
  }
}
