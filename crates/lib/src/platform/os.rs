use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::options::LinkerOutput;

use super::{ParseEnumError, TargetArchitecture};

/// Operating systems a target can be built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TargetPlatform {
  Windows,
  Linux,
  Mac,
}

impl TargetPlatform {
  pub const ALL: [TargetPlatform; 3] = [Self::Windows, Self::Linux, Self::Mac];

  /// Detect the platform the build tool is running on.
  ///
  /// Returns `None` if the host OS is not supported.
  pub fn host() -> Option<Self> {
    match std::env::consts::OS {
      "windows" => Some(Self::Windows),
      "linux" => Some(Self::Linux),
      "macos" => Some(Self::Mac),
      _ => None,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Windows => "Windows",
      Self::Linux => "Linux",
      Self::Mac => "Mac",
    }
  }

  /// Whether this platform can produce binaries for the given architecture.
  pub fn supports(&self, arch: TargetArchitecture) -> bool {
    match self {
      Self::Windows => true,
      Self::Linux | Self::Mac => matches!(arch, TargetArchitecture::X64 | TargetArchitecture::Arm64),
    }
  }

  pub fn object_file_extension(&self) -> &'static str {
    match self {
      Self::Windows => ".obj",
      Self::Linux | Self::Mac => ".o",
    }
  }

  pub fn static_library_extension(&self) -> &'static str {
    match self {
      Self::Windows => ".lib",
      Self::Linux | Self::Mac => ".a",
    }
  }

  pub fn shared_library_extension(&self) -> &'static str {
    match self {
      Self::Windows => ".dll",
      Self::Linux => ".so",
      Self::Mac => ".dylib",
    }
  }

  pub fn executable_extension(&self) -> &'static str {
    match self {
      Self::Windows => ".exe",
      Self::Linux | Self::Mac => "",
    }
  }

  /// File name of a link artifact named `name` of the given kind.
  pub fn link_output_file_name(&self, name: &str, output: LinkerOutput) -> String {
    let prefix = match self {
      Self::Windows => "",
      Self::Linux | Self::Mac => "lib",
    };
    match output {
      LinkerOutput::Executable => format!("{}{}", name, self.executable_extension()),
      LinkerOutput::SharedLibrary => format!("{}{}{}", prefix, name, self.shared_library_extension()),
      LinkerOutput::StaticLibrary | LinkerOutput::ImportLibrary => {
        format!("{}{}{}", prefix, name, self.static_library_extension())
      }
    }
  }

  /// Whether linking a shared library also produces a separate import library.
  pub fn has_import_libraries(&self) -> bool {
    matches!(self, Self::Windows)
  }
}

impl fmt::Display for TargetPlatform {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl FromStr for TargetPlatform {
  type Err = ParseEnumError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "windows" | "win64" => Ok(Self::Windows),
      "linux" => Ok(Self::Linux),
      "mac" | "macos" | "darwin" => Ok(Self::Mac),
      _ => Err(ParseEnumError::new("platform", s)),
    }
  }
}

impl TryFrom<String> for TargetPlatform {
  type Error = ParseEnumError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<TargetPlatform> for String {
  fn from(value: TargetPlatform) -> Self {
    value.as_str().to_string()
  }
}
