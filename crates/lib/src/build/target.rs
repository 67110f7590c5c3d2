//! Per-target build flow.
//!
//! `PreBuild -> ResolvingModules -> Generating -> Compiling -> Linking -> PostBuild`,
//! repeated independently for every requested tuple. Generating, Compiling and
//! Linking only register work items; the graph runs once everything is planned.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::binary::{BinaryModule, LinkUnit, group_binary_modules, link_units};
use crate::cache::IncludeScanner;
use crate::consts::TASK_CACHE_FILE_NAME;
use crate::graph::{ExecutorConfig, GraphResult, TaskCache, TaskGraph};
use crate::options::{BuildOptions, SOURCE_EXTENSIONS, append_unique, has_extension};
use crate::platform::BuildTuple;
use crate::resolve::{ResolvedModules, apply_api_defines, inherit_link_inputs, resolve_modules};
use crate::rules::{Target, TargetKind, TargetLinkType, TargetOutputType};
use crate::util::fs::remove_dir_if_exists;

use super::Builder;
use super::generate::plan_codegen;
use super::info::{BinaryModuleInfo, BuildTargetInfo};
use super::types::{BuildError, BuildStage, TargetBuild, TargetReport};

/// Mutable progress of one target build, kept for the report even on failure.
#[derive(Debug, Default)]
struct TargetRun {
  stage: BuildStage,
  result: GraphResult,
  skipped: bool,
}

impl TargetRun {
  fn enter(&mut self, target: &Target, tuple: &BuildTuple, stage: BuildStage) {
    debug!(target = %target.name, tuple = %tuple, stage = %stage, "entering stage");
    self.stage = stage;
  }
}

impl Builder<'_> {
  /// Build `target` for `tuple`, or return the outcome of an earlier build of the
  /// same pair in this invocation.
  pub fn build_target(&mut self, target: &Arc<Target>, tuple: BuildTuple) -> Result<Arc<TargetBuild>, BuildError> {
    let key = (target.name.clone(), tuple);
    if let Some(build) = self.built.get(&key) {
      debug!(target = %target.name, tuple = %tuple, "target already built in this invocation");
      return Ok(build.clone());
    }

    self.in_progress.insert(key.clone());
    let started = Instant::now();
    let mut run = TargetRun::default();
    let outcome = self.run_target(target, tuple, &mut run);
    self.in_progress.remove(&key);

    let (build, err) = match outcome {
      Ok(build) => (build, None),
      Err(err) => {
        error!(target = %target.name, tuple = %tuple, stage = %run.stage, error = %err, "target build failed");
        (TargetBuild::failed(&target.name, tuple), Some(err))
      }
    };

    let success = build.success;
    // Work items run while the target is in its linking stage.
    let failed_at = if run.result.is_success() { run.stage } else { BuildStage::Linking };
    self.reports.push(TargetReport {
      target: target.name.clone(),
      tuple: Some(tuple),
      stage: if success { BuildStage::Done } else { BuildStage::Failed },
      failed_at: (!success).then_some(failed_at),
      skipped: run.skipped,
      result: run.result,
      error: err.as_ref().map(ToString::to_string),
      elapsed: started.elapsed(),
    });

    let build = Arc::new(build);
    self.built.insert(key, build.clone());
    match err {
      Some(err) => Err(err),
      None => Ok(build),
    }
  }

  fn run_target(&mut self, target: &Arc<Target>, tuple: BuildTuple, run: &mut TargetRun) -> Result<TargetBuild, BuildError> {
    if !tuple.is_supported() || !target.supports(&tuple) || !self.toolchain.supports(&tuple) {
      return Err(BuildError::UnsupportedTuple {
        target: target.name.clone(),
        tuple,
      });
    }
    info!(target = %target.name, tuple = %tuple, "building target");

    if target.modules.is_empty() {
      warn!(target = %target.name, "target has no modules to build");
      run.enter(target, &tuple, BuildStage::PreBuild);
      target.pre_build(&tuple);
      run.enter(target, &tuple, BuildStage::PostBuild);
      target.post_build(&tuple);
      run.skipped = true;
      return Ok(TargetBuild {
        target: target.name.clone(),
        tuple,
        success: true,
        info: None,
        link_artifacts: Vec::new(),
      });
    }

    let intermediate = self.config.target_intermediate_folder(&target.name, &tuple);
    let output = self.config.target_output_folder(&target.name, &tuple);
    if self.config.rebuild {
      for folder in [&intermediate, &output] {
        remove_dir_if_exists(folder).map_err(|source| io_error(folder, source))?;
      }
    }

    run.enter(target, &tuple, BuildStage::PreBuild);
    target.pre_build(&tuple);
    for folder in [&intermediate, &output] {
      fs::create_dir_all(folder).map_err(|source| io_error(folder, source))?;
    }

    let mut target_options = BuildOptions::new(tuple, &self.config.root, &intermediate, &output);
    self.toolchain.setup_environment(&mut target_options);
    target.setup_target_environment(&mut target_options);

    let reference = self.build_reference(target, tuple)?;

    run.enter(target, &tuple, BuildStage::ResolvingModules);
    let mut resolved = resolve_modules(self.registry, target, &target_options)?;
    let groups = group_binary_modules(resolved.order());
    let referenced_groups = reference.as_ref().map(|r| r.binary_module_names()).unwrap_or_default();
    apply_api_defines(
      target.link_type,
      &groups,
      &mut resolved,
      &self.toolchain.dll_export(&tuple),
      &self.toolchain.dll_import(&tuple),
      &referenced_groups,
    );
    if let Some(reference) = &reference {
      for module in resolved.order().to_vec() {
        if let Some(options) = resolved.get_mut(&module.name) {
          append_unique(&mut options.link_env.input_files, reference.link_artifacts.iter().cloned());
        }
      }
    }

    let mut graph = TaskGraph::new(&self.config.root);

    run.enter(target, &tuple, BuildStage::Generating);
    plan_codegen(&self.config, &mut graph, &mut resolved);

    run.enter(target, &tuple, BuildStage::Compiling);
    let units = link_units(target, &groups, resolved.order());
    let group_artifacts = self.group_artifacts(target, &units, &target_options);
    self.plan_compiles(target, reference.as_deref(), &mut graph, &mut resolved, &group_artifacts)?;

    run.enter(target, &tuple, BuildStage::Linking);
    let (info, link_artifacts) = self.plan_links(target, &mut graph, &resolved, &groups, &units, &target_options)?;

    graph.setup().map_err(|source| BuildError::Graph {
      target: target.name.clone(),
      source,
    })?;
    graph.sort_tasks();
    let cache_path = intermediate.join(TASK_CACHE_FILE_NAME);
    let mut cache = if self.config.rebuild {
      TaskCache::empty(cache_path, &self.config.tool_version)
    } else {
      TaskCache::load(cache_path, &self.config.tool_version)
    };
    graph.load_cache(&cache).map_err(|source| BuildError::Graph {
      target: target.name.clone(),
      source,
    })?;

    run.result = graph.execute(&ExecutorConfig {
      max_concurrency: self.config.max_concurrency,
    });
    graph.update_cache(&mut cache);
    if run.result.executed > 0
      && let Err(err) = cache.save()
    {
      warn!(path = %cache.path().display(), error = %err, "failed to save work-item cache");
    }
    info!(
      target = %target.name,
      tuple = %tuple,
      executed = run.result.executed,
      up_to_date = run.result.up_to_date,
      failed = run.result.failed_count(),
      "target graph finished"
    );

    info.write(&output).map_err(|source| io_error(&output, source))?;

    run.enter(target, &tuple, BuildStage::PostBuild);
    target.post_build(&tuple);

    Ok(TargetBuild {
      target: target.name.clone(),
      tuple,
      success: run.result.is_success(),
      info: Some(info),
      link_artifacts,
    })
  }

  /// Build the engine target a game target links against, for the same tuple.
  fn build_reference(&mut self, target: &Target, tuple: BuildTuple) -> Result<Option<Arc<TargetBuild>>, BuildError> {
    let Some(name) = target.kind.referenced_target() else {
      return Ok(None);
    };
    let referenced = self
      .registry
      .target(name)
      .cloned()
      .ok_or_else(|| BuildError::TargetNotFound(name.to_string()))?;
    if self.in_progress.contains(&(referenced.name.clone(), tuple)) {
      return Err(BuildError::CircularReference {
        target: target.name.clone(),
        referenced: referenced.name.clone(),
      });
    }
    if referenced.output_type == TargetOutputType::Executable {
      return Err(BuildError::ReferencedExecutable {
        target: target.name.clone(),
        referenced: referenced.name.clone(),
      });
    }

    info!(target = %target.name, referenced = %referenced.name, "building referenced target");
    let failed = || BuildError::ReferencedTargetFailed {
      target: target.name.clone(),
      referenced: referenced.name.clone(),
    };
    let build = self.build_target(&referenced, tuple).map_err(|_| failed())?;
    if !build.success {
      return Err(failed());
    }
    Ok(Some(build))
  }

  /// Link artifact every module of a modular group exports to its dependents.
  fn group_artifacts(&self, target: &Target, units: &[LinkUnit], options: &BuildOptions) -> HashMap<String, PathBuf> {
    if target.link_type == TargetLinkType::Monolithic {
      return HashMap::new();
    }
    let platform = options.tuple.platform;
    units
      .iter()
      .map(|unit| {
        let path = options
          .output_folder
          .join(platform.link_output_file_name(&unit.name, unit.output));
        let artifact = if platform.has_import_libraries() {
          path.with_extension(platform.static_library_extension().trim_start_matches('.'))
        } else {
          path
        };
        (unit.name.clone(), artifact)
      })
      .collect()
  }

  fn plan_compiles(
    &mut self,
    target: &Target,
    reference: Option<&TargetBuild>,
    graph: &mut TaskGraph,
    resolved: &mut ResolvedModules,
    group_artifacts: &HashMap<String, PathBuf>,
  ) -> Result<(), BuildError> {
    let toolchain = self.toolchain;
    let engine_root = self.engine_source_root(target, reference);
    let scanner = self.includes.entry(target.name.clone()).or_insert_with(|| {
      let project_roots = target
        .kind
        .project()
        .map(|p| p.all_source_folders())
        .unwrap_or_default();
      IncludeScanner::new(engine_root, project_roots)
    });

    for module in resolved.order().to_vec() {
      inherit_link_inputs(resolved, &module.name);
      let Some(options) = resolved.get_mut(&module.name) else {
        continue;
      };
      options.finalize_compile_env();
      let libraries = options.libraries.clone();
      append_unique(&mut options.link_env.input_libraries, libraries);

      let sources: Vec<PathBuf> = options
        .source_files
        .iter()
        .filter(|f| has_extension(f, SOURCE_EXTENSIONS))
        .cloned()
        .collect();
      info!(module = %module.name, sources = sources.len(), "building module");

      let output_dir = options.intermediate_folder.clone();
      let compiled = toolchain
        .compile_sources(graph, scanner, options, &sources, &output_dir)
        .map_err(|source| BuildError::Toolchain {
          target: target.name.clone(),
          source,
        })?;

      let inherited = std::mem::take(&mut options.link_env.input_files);
      options.link_env.input_files = compiled.object_files.clone();
      append_unique(&mut options.link_env.input_files, inherited);

      options.output_files = match (target.link_type, module.binary_module()) {
        (TargetLinkType::Modular, Some(group)) => group_artifacts.get(group).cloned().into_iter().collect(),
        // Object code flows straight into whichever binary depends on it.
        _ => options.link_env.input_files.clone(),
      };
    }
    Ok(())
  }

  fn engine_source_root(&self, target: &Target, reference: Option<&TargetBuild>) -> Option<PathBuf> {
    match &target.kind {
      TargetKind::Engine { project } => Some(project.source_folder()),
      TargetKind::Game { .. } => reference
        .and_then(|r| self.registry.target(&r.target))
        .and_then(|t| t.kind.project())
        .map(|p| p.source_folder()),
      TargetKind::Standalone => None,
    }
  }

  fn plan_links(
    &self,
    target: &Target,
    graph: &mut TaskGraph,
    resolved: &ResolvedModules,
    groups: &[BinaryModule],
    units: &[LinkUnit],
    target_options: &BuildOptions,
  ) -> Result<(BuildTargetInfo, Vec<PathBuf>), BuildError> {
    let platform = target_options.tuple.platform;
    let mut info = BuildTargetInfo::new(&target.name, &target_options.tuple);
    let mut artifacts = Vec::new();

    for unit in units {
      let output_path = match target.link_type {
        TargetLinkType::Monolithic => target.output_file_path(target_options),
        TargetLinkType::Modular => target_options
          .output_folder
          .join(platform.link_output_file_name(&unit.name, unit.output)),
      };

      let mut options = target_options.clone();
      options.link_env.output = unit.output;
      options.link_env.input_files.clear();
      for module in &unit.modules {
        let Some(module_options) = resolved.get(&module.name) else {
          continue;
        };
        append_unique(
          &mut options.link_env.input_files,
          module_options
            .link_env
            .input_files
            .iter()
            .filter(|f| !is_own_artifact(f, &output_path))
            .cloned(),
        );
        append_unique(&mut options.link_env.input_libraries, module_options.link_env.input_libraries.iter().cloned());
        append_unique(&mut options.dependency_files, module_options.dependency_files.iter().cloned());
      }

      debug!(unit = %unit.name, inputs = options.link_env.input_files.len(), "planned link");
      let linked = self
        .toolchain
        .link_objects(graph, &options, &output_path)
        .map_err(|source| BuildError::Toolchain {
          target: target.name.clone(),
          source,
        })?;
      artifacts.push(linked.link_artifact().to_path_buf());

      match target.link_type {
        TargetLinkType::Monolithic => {
          for group in groups {
            info.binary_modules.push(BinaryModuleInfo {
              name: group.name.clone(),
              native_path: linked.artifact.clone(),
            });
          }
        }
        TargetLinkType::Modular => info.binary_modules.push(BinaryModuleInfo {
          name: unit.name.clone(),
          native_path: linked.artifact.clone(),
        }),
      }
    }

    Ok((info, artifacts))
  }
}

/// Whether `file` is the binary being linked or its import library.
fn is_own_artifact(file: &Path, output_path: &Path) -> bool {
  file == output_path || (file.parent() == output_path.parent() && file.file_stem() == output_path.file_stem())
}

fn io_error(path: &Path, source: std::io::Error) -> BuildError {
  BuildError::Io {
    path: path.to_path_buf(),
    source,
  }
}
