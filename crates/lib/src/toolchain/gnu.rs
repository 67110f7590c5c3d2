//! GCC / Clang command-line toolchain.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::cache::IncludeScanner;
use crate::graph::{CommandSpec, Task, TaskAction, TaskGraph};
use crate::options::{BuildOptions, CppVersion, LinkerOutput, OptimizationHint, has_extension};
use crate::platform::{BuildTuple, TargetArchitecture, TargetPlatform};

use super::{CompileOutput, LinkOutput, Toolchain, ToolchainError, object_file_paths};

const VISIBILITY_DEFAULT: &str = "__attribute__((visibility(\"default\")))";

/// Programs and extra flags of a GNU-style toolchain, as read from the manifest's
/// `[toolchain]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GnuToolchainConfig {
  /// C++ compiler driver.
  pub compiler: String,
  /// C compiler driver, used for `.c` files.
  pub c_compiler: String,
  pub archiver: String,
  /// Link driver; the C++ compiler when unset.
  pub linker: Option<String>,
  pub compile_args: Vec<String>,
  pub link_args: Vec<String>,
}

impl Default for GnuToolchainConfig {
  fn default() -> Self {
    Self {
      compiler: "c++".to_string(),
      c_compiler: "cc".to_string(),
      archiver: "ar".to_string(),
      linker: None,
      compile_args: Vec::new(),
      link_args: Vec::new(),
    }
  }
}

/// Toolchain driving `cc`-compatible compilers.
#[derive(Debug, Clone, Default)]
pub struct GnuToolchain {
  config: GnuToolchainConfig,
}

impl GnuToolchain {
  pub fn new(config: GnuToolchainConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &GnuToolchainConfig {
    &self.config
  }

  fn compile_command(&self, options: &BuildOptions, source: &Path, object: &Path) -> CommandSpec {
    let env = &options.compile_env;
    let is_c = has_extension(source, &["c"]);
    let program = if is_c { &self.config.c_compiler } else { &self.config.compiler };

    let mut cmd = CommandSpec::new(program).arg("-c");
    if !is_c {
      cmd = cmd.arg(match env.cpp_version {
        CppVersion::Cpp17 => "-std=c++17",
        CppVersion::Cpp20 => "-std=c++20",
        CppVersion::Latest => "-std=c++2b",
      });
    }
    cmd = cmd.arg(match (env.optimization, env.optimization_hint) {
      (false, _) => "-O0",
      (true, OptimizationHint::SmallCode) => "-Os",
      (true, OptimizationHint::FastCode) => "-O3",
      (true, OptimizationHint::Neither) => "-O2",
    });
    if env.debug_information {
      cmd = cmd.arg("-g");
    }
    if env.function_level_linking {
      cmd = cmd.args(["-ffunction-sections", "-fdata-sections"]);
    }
    if env.whole_program_optimization {
      cmd = cmd.arg("-flto");
    }
    if !env.buffer_security_check {
      cmd = cmd.arg("-fno-stack-protector");
    }
    if options.tuple.platform != TargetPlatform::Windows {
      cmd = cmd.arg("-fPIC");
    }
    cmd
      .arg("-fvisibility=hidden")
      .args(arch_flags(options.tuple.architecture))
      .args(env.preprocessor_definitions.iter().map(|d| format!("-D{d}")))
      .args(env.include_paths.iter().map(|p| format!("-I{p}")))
      .args(self.config.compile_args.iter().cloned())
      .arg("-o")
      .arg(object.to_string_lossy())
      .arg(source.to_string_lossy())
  }

  fn link_command(&self, options: &BuildOptions, output_path: &Path, import_library: Option<&Path>) -> CommandSpec {
    let env = &options.link_env;
    if env.output == LinkerOutput::StaticLibrary {
      return CommandSpec::new(&self.config.archiver)
        .arg("rcs")
        .arg(output_path.to_string_lossy())
        .args(env.input_files.iter().map(|f| f.to_string_lossy().into_owned()));
    }

    let program = self.config.linker.as_deref().unwrap_or(&self.config.compiler);
    let mut cmd = CommandSpec::new(program);
    if env.output == LinkerOutput::SharedLibrary {
      cmd = cmd.arg(match options.tuple.platform {
        TargetPlatform::Mac => "-dynamiclib",
        TargetPlatform::Windows | TargetPlatform::Linux => "-shared",
      });
    }
    if env.debug_information {
      cmd = cmd.arg("-g");
    }
    if env.link_time_code_generation {
      cmd = cmd.arg("-flto");
    }
    match options.tuple.platform {
      TargetPlatform::Linux => cmd = cmd.arg("-Wl,-rpath,$ORIGIN"),
      TargetPlatform::Mac => cmd = cmd.arg("-Wl,-rpath,@loader_path"),
      TargetPlatform::Windows => {
        if let Some(lib) = import_library {
          cmd = cmd.arg(format!("-Wl,--out-implib,{}", lib.display()));
        }
      }
    }
    cmd
      .args(arch_flags(options.tuple.architecture))
      .arg("-o")
      .arg(output_path.to_string_lossy())
      .args(env.input_files.iter().map(|f| f.to_string_lossy().into_owned()))
      .args(env.library_paths.iter().map(|p| format!("-L{}", p.display())))
      .args(env.input_libraries.iter().map(|lib| library_arg(lib)))
      .args(self.config.link_args.iter().cloned())
  }
}

fn arch_flags(arch: TargetArchitecture) -> Vec<&'static str> {
  match arch {
    TargetArchitecture::X86 => vec!["-m32"],
    TargetArchitecture::X64 | TargetArchitecture::Arm64 => Vec::new(),
  }
}

/// Library given by path is passed verbatim, a bare name becomes `-l<name>`.
fn library_arg(library: &str) -> String {
  let path = Path::new(library);
  if path.components().count() > 1 || path.extension().is_some() {
    library.to_string()
  } else {
    format!("-l{library}")
  }
}

impl Toolchain for GnuToolchain {
  fn name(&self) -> &str {
    "gnu"
  }

  fn dll_export(&self, tuple: &BuildTuple) -> String {
    match tuple.platform {
      TargetPlatform::Windows => "__declspec(dllexport)".to_string(),
      TargetPlatform::Linux | TargetPlatform::Mac => VISIBILITY_DEFAULT.to_string(),
    }
  }

  fn dll_import(&self, tuple: &BuildTuple) -> String {
    match tuple.platform {
      TargetPlatform::Windows => "__declspec(dllimport)".to_string(),
      TargetPlatform::Linux | TargetPlatform::Mac => VISIBILITY_DEFAULT.to_string(),
    }
  }

  fn compile_sources(
    &self,
    graph: &mut TaskGraph,
    includes: &mut IncludeScanner,
    options: &BuildOptions,
    sources: &[PathBuf],
    output_dir: &Path,
  ) -> Result<CompileOutput, ToolchainError> {
    let extension = options.tuple.platform.object_file_extension();
    let objects = object_file_paths(sources, output_dir, extension)?;
    let mut output = CompileOutput::default();

    for (source, object) in sources.iter().zip(objects) {
      let mut prerequisites = vec![source.clone()];
      prerequisites.extend(includes.find_all_includes(source));
      let cost = u32::try_from(prerequisites.len()).unwrap_or(u32::MAX);
      trace!(source = %source.display(), includes = prerequisites.len() - 1, "planned compile");

      let info = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
      let command = self.compile_command(options, source, &object);
      graph.add(
        Task::new(info, &options.working_directory, TaskAction::Command(command))
          .with_prerequisites(prerequisites)
          .with_outputs([object.clone()])
          .with_cost(cost),
      );
      output.object_files.push(object);
    }

    Ok(output)
  }

  fn link_objects(
    &self,
    graph: &mut TaskGraph,
    options: &BuildOptions,
    output_path: &Path,
  ) -> Result<LinkOutput, ToolchainError> {
    let platform = options.tuple.platform;
    let import_library = (platform.has_import_libraries()
      && matches!(options.link_env.output, LinkerOutput::SharedLibrary | LinkerOutput::Executable))
    .then(|| output_path.with_extension(platform.static_library_extension().trim_start_matches('.')));

    let command = self.link_command(options, output_path, import_library.as_deref());
    let mut outputs = vec![output_path.to_path_buf()];
    outputs.extend(import_library.iter().cloned());

    let info = output_path
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_default();
    let cost = u32::try_from(options.link_env.input_files.len()).unwrap_or(u32::MAX);
    graph.add(
      Task::new(info, &options.working_directory, TaskAction::Command(command))
        .with_prerequisites(options.link_env.input_files.iter().cloned())
        .with_outputs(outputs)
        .with_cost(cost),
    );

    Ok(LinkOutput {
      artifact: output_path.to_path_buf(),
      import_library,
    })
  }
}
