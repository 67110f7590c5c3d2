//! Implementation of the `kiln build` command.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use owo_colors::{OwoColorize, Stream};

use kiln_lib::build::{BuildSummary, Builder};
use kiln_lib::platform::{TargetArchitecture, TargetConfiguration, TargetPlatform};
use kiln_lib::toolchain::gnu::GnuToolchain;

use crate::output::{format_elapsed, print_error, print_success, symbols};

use super::load_workspace;

/// Command-line selection for one build invocation.
#[derive(Debug, Clone)]
pub struct BuildRequest {
  pub manifest: PathBuf,
  pub targets: Vec<String>,
  pub platforms: Vec<TargetPlatform>,
  pub architectures: Vec<TargetArchitecture>,
  pub configurations: Vec<TargetConfiguration>,
  pub jobs: Option<usize>,
  pub rebuild: bool,
}

/// Build the requested targets.
///
/// Exits with code 1 when any target or work item failed.
pub fn cmd_build(request: &BuildRequest) -> Result<ExitCode> {
  let workspace = load_workspace(&request.manifest)?;
  let mut config = workspace.config;
  config.targets = request.targets.clone();
  if !request.platforms.is_empty() {
    config.platforms = request.platforms.clone();
  }
  if !request.architectures.is_empty() {
    config.architectures = request.architectures.clone();
  }
  if !request.configurations.is_empty() {
    config.configurations = request.configurations.clone();
  }
  if let Some(jobs) = request.jobs {
    config.max_concurrency = jobs.max(1);
  }
  config.rebuild = request.rebuild;

  let toolchain = GnuToolchain::new(workspace.manifest.toolchain.clone());
  let mut builder = Builder::new(&workspace.registry, &toolchain, config);
  let summary = builder.build();

  print_summary(&summary);
  Ok(if summary.is_success() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn print_summary(summary: &BuildSummary) {
  let failed: Vec<_> = summary.failed_commands().collect();
  if !failed.is_empty() {
    eprintln!();
    eprintln!("Failed commands:");
    for task in failed {
      let code = task
        .exit_code
        .map(|c| c.to_string())
        .unwrap_or_else(|| "none".to_string());
      eprintln!(
        "  {} {} (exit code {})",
        symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
        task.info_message,
        code
      );
      eprintln!("    {}", task.command.if_supports_color(Stream::Stderr, |s| s.dimmed()));
    }
  }

  for (target, err) in summary.errors() {
    print_error(&format!("{}: {}", target, err));
  }

  let line = format!(
    "{} executed, {} up to date, {} failed in {}",
    summary.executed(),
    summary.up_to_date(),
    summary.failed_count(),
    format_elapsed(summary.elapsed)
  );
  if summary.is_success() {
    print_success(&format!("Build succeeded: {}", line));
  } else {
    print_error(&format!("Build failed: {}", line));
  }
}
