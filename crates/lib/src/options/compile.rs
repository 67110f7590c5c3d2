//! Compiler settings for a module.

use serde::{Deserialize, Serialize};

use crate::platform::TargetConfiguration;

use super::append_unique;

/// C++ language standard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CppVersion {
  #[default]
  Cpp17,
  Cpp20,
  Latest,
}

/// Preferred trade-off when optimizing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptimizationHint {
  #[default]
  Neither,
  FastCode,
  SmallCode,
}

/// Everything the toolchain needs to compile one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileEnv {
  pub cpp_version: CppVersion,
  pub optimization_hint: OptimizationHint,
  pub optimization: bool,
  pub function_level_linking: bool,
  pub debug_information: bool,
  pub runtime_checks: bool,
  pub string_pooling: bool,
  pub intrinsic_functions: bool,
  pub buffer_security_check: bool,
  pub inlining: bool,
  pub whole_program_optimization: bool,
  pub use_debug_crt: bool,
  /// Preprocessor symbols, `NAME` or `NAME=VALUE`, in insertion order.
  pub preprocessor_definitions: Vec<String>,
  /// Include search directories, in insertion order.
  pub include_paths: Vec<String>,
}

impl Default for CompileEnv {
  fn default() -> Self {
    Self {
      cpp_version: CppVersion::default(),
      optimization_hint: OptimizationHint::default(),
      optimization: false,
      function_level_linking: false,
      debug_information: false,
      runtime_checks: false,
      string_pooling: false,
      intrinsic_functions: false,
      buffer_security_check: true,
      inlining: false,
      whole_program_optimization: false,
      use_debug_crt: false,
      preprocessor_definitions: Vec::new(),
      include_paths: Vec::new(),
    }
  }
}

impl CompileEnv {
  /// Apply the code generation preset of a build configuration.
  pub fn apply_configuration(&mut self, configuration: TargetConfiguration) {
    append_unique(&mut self.preprocessor_definitions, [configuration.define()]);
    match configuration {
      TargetConfiguration::Debug => {
        self.function_level_linking = false;
        self.optimization = false;
        self.optimization_hint = OptimizationHint::Neither;
        self.debug_information = true;
        self.runtime_checks = true;
        self.string_pooling = false;
        self.intrinsic_functions = false;
        self.buffer_security_check = true;
        self.inlining = false;
        self.whole_program_optimization = false;
        self.use_debug_crt = true;
      }
      TargetConfiguration::Development => {
        self.function_level_linking = true;
        self.optimization = true;
        self.optimization_hint = OptimizationHint::FastCode;
        self.debug_information = true;
        self.runtime_checks = false;
        self.string_pooling = true;
        self.intrinsic_functions = true;
        self.buffer_security_check = true;
        self.inlining = true;
        self.whole_program_optimization = false;
        self.use_debug_crt = false;
      }
      TargetConfiguration::Release => {
        self.function_level_linking = true;
        self.optimization = true;
        self.optimization_hint = OptimizationHint::FastCode;
        self.debug_information = false;
        self.runtime_checks = false;
        self.string_pooling = true;
        self.intrinsic_functions = true;
        self.buffer_security_check = false;
        self.inlining = true;
        self.whole_program_optimization = true;
        self.use_debug_crt = false;
      }
    }
  }
}
