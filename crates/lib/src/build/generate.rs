//! Generating stage: one code-generation work item per module with markup headers.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::cache::{CodeGenCache, CodeGenFingerprint};
use crate::config::BuildConfig;
use crate::graph::{CommandSpec, Task, TaskAction, TaskGraph};
use crate::options::{HEADER_EXTENSIONS, append_unique, collect_files};
use crate::resolve::ResolvedModules;

/// Register code-generation items for every resolved module.
///
/// Returns the number of items registered. Does nothing without a configured
/// generator command.
pub(crate) fn plan_codegen(config: &BuildConfig, graph: &mut TaskGraph, resolved: &mut ResolvedModules) -> usize {
  let Some(template) = config.codegen_command.as_deref() else {
    debug!("no code generator configured, skipping generation");
    return 0;
  };
  if template.is_empty() {
    warn!("empty code generator command, skipping generation");
    return 0;
  }

  let mut planned = 0;
  for module in resolved.order().to_vec() {
    let Some(options) = resolved.get_mut(&module.name) else {
      continue;
    };
    let headers = collect_files(&module.folder, HEADER_EXTENSIONS);
    if headers.is_empty() {
      continue;
    }

    let cache_path = options.intermediate_folder.join(format!("{}.Gen.cache", module.name));
    let mut cache = CodeGenCache::load(
      cache_path,
      &config.tool_version,
      CodeGenFingerprint::from_options(options),
      headers.len(),
      &config.markup_tokens,
    );
    let marked: Vec<PathBuf> = headers.into_iter().filter(|h| cache.contains_markup(h)).collect();
    if let Err(err) = cache.save() {
      warn!(module = %module.name, error = %err, "failed to save code-generation cache");
    }
    if marked.is_empty() {
      continue;
    }

    let file_name = format!("{}.Gen.cpp", module.name);
    let generated = options.generated_folder.join(&file_name);
    let command = expand_command(template, &module.name, &generated, &options.intermediate_folder, &marked);
    debug!(module = %module.name, headers = marked.len(), "planned code generation");

    let cost = u32::try_from(marked.len()).unwrap_or(u32::MAX);
    graph.add(
      Task::new(file_name, &options.working_directory, TaskAction::Command(command))
        .with_prerequisites(marked)
        .with_outputs([generated.clone()])
        .with_cost(cost),
    );
    let generated_folder = options.generated_folder.clone();
    append_unique(&mut options.source_files, [generated]);
    append_unique(&mut options.private_include_paths, [generated_folder]);
    planned += 1;
  }
  planned
}

/// Substitute `{module}`, `{output}`, `{intermediate}` and `{headers}` in the
/// generator command. `{headers}` must be a whole argument and expands into one
/// argument per header.
fn expand_command(
  template: &[String],
  module: &str,
  output: &Path,
  intermediate: &Path,
  headers: &[PathBuf],
) -> CommandSpec {
  let output = output.to_string_lossy();
  let intermediate = intermediate.to_string_lossy();
  let expand = |arg: &str| {
    arg
      .replace("{module}", module)
      .replace("{output}", &output)
      .replace("{intermediate}", &intermediate)
  };

  let mut command = CommandSpec::new(expand(&template[0]));
  for arg in &template[1..] {
    if arg == "{headers}" {
      command = command.args(headers.iter().map(|h| h.to_string_lossy().into_owned()));
    } else {
      command = command.arg(expand(arg));
    }
  }
  command
}
