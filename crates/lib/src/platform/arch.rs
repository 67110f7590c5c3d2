use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ParseEnumError;

/// CPU architectures a target can be built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TargetArchitecture {
  X86,
  X64,
  Arm64,
}

impl TargetArchitecture {
  pub const ALL: [TargetArchitecture; 3] = [Self::X86, Self::X64, Self::Arm64];

  /// Detect the architecture the build tool is running on.
  pub fn host() -> Option<Self> {
    match std::env::consts::ARCH {
      "x86" => Some(Self::X86),
      "x86_64" => Some(Self::X64),
      "aarch64" => Some(Self::Arm64),
      _ => None,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::X86 => "x86",
      Self::X64 => "x64",
      Self::Arm64 => "ARM64",
    }
  }
}

impl fmt::Display for TargetArchitecture {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl FromStr for TargetArchitecture {
  type Err = ParseEnumError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "x86" | "i686" => Ok(Self::X86),
      "x64" | "x86_64" | "amd64" => Ok(Self::X64),
      "arm64" | "aarch64" => Ok(Self::Arm64),
      _ => Err(ParseEnumError::new("architecture", s)),
    }
  }
}

impl TryFrom<String> for TargetArchitecture {
  type Error = ParseEnumError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<TargetArchitecture> for String {
  fn from(value: TargetArchitecture) -> Self {
    value.as_str().to_string()
  }
}
