//! Shared helpers: an on-disk workspace and a toolchain whose work items run
//! in-process and record what they were asked to do.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use kiln_lib::cache::IncludeScanner;
use kiln_lib::config::BuildConfig;
use kiln_lib::graph::{Task, TaskAction, TaskError, TaskGraph};
use kiln_lib::options::{BuildOptions, LinkerOutput};
use kiln_lib::platform::{BuildTuple, TargetArchitecture, TargetConfiguration, TargetPlatform};
use kiln_lib::toolchain::{CompileOutput, LinkOutput, Toolchain, ToolchainError, object_file_paths};
use tempfile::TempDir;

pub const EXPORT: &str = "EXPORT";
pub const IMPORT: &str = "IMPORT";

/// Marker making a recorded compile fail.
pub const COMPILE_ERROR: &str = "#error broken";

pub fn linux_tuple() -> BuildTuple {
  BuildTuple::new(
    TargetPlatform::Linux,
    TargetArchitecture::X64,
    TargetConfiguration::Debug,
  )
}

/// Temporary workspace root with helpers for writing sources.
pub struct Workspace {
  pub temp: TempDir,
  clock: AtomicU64,
}

impl Workspace {
  pub fn new() -> Self {
    Self {
      temp: TempDir::new().unwrap(),
      clock: AtomicU64::new(100),
    }
  }

  pub fn root(&self) -> &Path {
    self.temp.path()
  }

  pub fn path(&self, relative: &str) -> PathBuf {
    self.root().join(relative)
  }

  pub fn write(&self, relative: &str, content: &str) -> PathBuf {
    let path = self.path(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    path
  }

  /// Move a file's write time into the future, later than any earlier touch.
  pub fn touch(&self, relative: &str) {
    let offset = self.clock.fetch_add(10, Ordering::SeqCst);
    let file = fs::File::options().write(true).open(self.path(relative)).unwrap();
    file
      .set_modified(SystemTime::now() + Duration::from_secs(offset))
      .unwrap();
  }

  /// Configuration building only the Linux x64 Debug tuple.
  pub fn config(&self) -> BuildConfig {
    let mut config = BuildConfig::new(self.root());
    config.platforms = vec![TargetPlatform::Linux];
    config.architectures = vec![TargetArchitecture::X64];
    config.configurations = vec![TargetConfiguration::Debug];
    config.max_concurrency = 4;
    config
  }
}

#[derive(Debug, Clone)]
pub struct CompileRecord {
  pub source: PathBuf,
  pub object: PathBuf,
  pub defines: Vec<String>,
  pub include_paths: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct LinkRecord {
  pub output: PathBuf,
  pub kind: LinkerOutput,
  pub inputs: Vec<PathBuf>,
  pub libraries: Vec<String>,
}

/// Toolchain planning callback work items.
///
/// Planning is recorded in `compiles` / `links`; every execution is appended to
/// `executed` by the item's info message.
#[derive(Default, Clone)]
pub struct RecordingToolchain {
  pub compiles: Arc<Mutex<Vec<CompileRecord>>>,
  pub links: Arc<Mutex<Vec<LinkRecord>>>,
  pub executed: Arc<Mutex<Vec<String>>>,
}

impl RecordingToolchain {
  pub fn executed(&self) -> Vec<String> {
    self.executed.lock().unwrap().clone()
  }

  pub fn compile_of(&self, file_name: &str) -> CompileRecord {
    self
      .compiles
      .lock()
      .unwrap()
      .iter()
      .rev()
      .find(|c| c.source.file_name().is_some_and(|n| n == file_name))
      .cloned()
      .unwrap_or_else(|| panic!("no compile planned for {file_name}"))
  }

  pub fn links(&self) -> Vec<LinkRecord> {
    self.links.lock().unwrap().clone()
  }

  pub fn reset(&self) {
    self.compiles.lock().unwrap().clear();
    self.links.lock().unwrap().clear();
    self.executed.lock().unwrap().clear();
  }
}

fn write_outputs(task: &Task) -> Result<(), TaskError> {
  for output in &task.produced_files {
    fs::write(output, task.info_message.as_bytes())?;
  }
  Ok(())
}

impl Toolchain for RecordingToolchain {
  fn name(&self) -> &str {
    "recording"
  }

  fn dll_export(&self, _tuple: &BuildTuple) -> String {
    EXPORT.to_string()
  }

  fn dll_import(&self, _tuple: &BuildTuple) -> String {
    IMPORT.to_string()
  }

  fn compile_sources(
    &self,
    graph: &mut TaskGraph,
    includes: &mut IncludeScanner,
    options: &BuildOptions,
    sources: &[PathBuf],
    output_dir: &Path,
  ) -> Result<CompileOutput, ToolchainError> {
    let objects = object_file_paths(sources, output_dir, ".o")?;
    let mut output = CompileOutput::default();
    for (source, object) in sources.iter().zip(objects) {
      let mut prerequisites = vec![source.clone()];
      prerequisites.extend(includes.find_all_includes(source));

      self.compiles.lock().unwrap().push(CompileRecord {
        source: source.clone(),
        object: object.clone(),
        defines: options.compile_env.preprocessor_definitions.clone(),
        include_paths: options.compile_env.include_paths.clone(),
      });

      let executed = self.executed.clone();
      let source_path = source.clone();
      let info = source.file_name().unwrap().to_string_lossy().into_owned();
      let action = TaskAction::callback(format!("compile {}", source.display()), move |task| {
        executed.lock().unwrap().push(task.info_message.clone());
        let text = fs::read_to_string(&source_path).unwrap_or_default();
        if text.contains(COMPILE_ERROR) {
          return Err(TaskError::CmdFailed {
            cmd: format!("cc -c {}", source_path.display()),
            code: Some(1),
          });
        }
        write_outputs(task)
      });
      graph.add(
        Task::new(info, &options.working_directory, action)
          .with_prerequisites(prerequisites)
          .with_outputs([object.clone()]),
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
    self.links.lock().unwrap().push(LinkRecord {
      output: output_path.to_path_buf(),
      kind: options.link_env.output,
      inputs: options.link_env.input_files.clone(),
      libraries: options.link_env.input_libraries.clone(),
    });

    let executed = self.executed.clone();
    let info = output_path.file_name().unwrap().to_string_lossy().into_owned();
    let action = TaskAction::callback(format!("link {}", output_path.display()), move |task| {
      executed.lock().unwrap().push(task.info_message.clone());
      write_outputs(task)
    });
    graph.add(
      Task::new(info, &options.working_directory, action)
        .with_prerequisites(options.link_env.input_files.iter().cloned())
        .with_outputs([output_path.to_path_buf()]),
    );
    Ok(LinkOutput {
      artifact: output_path.to_path_buf(),
      import_library: None,
    })
  }
}
