//! Implementation of the `kiln info` command.

use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;
use owo_colors::{OwoColorize, Stream};

use kiln_lib::build::{TargetOverview, describe_target};

use crate::output::{print_json, print_stat, print_warning, symbols};

use super::load_workspace;

pub fn cmd_info(manifest: &Path, json: bool) -> Result<ExitCode> {
  let workspace = load_workspace(manifest)?;

  let mut overviews: Vec<TargetOverview> = Vec::new();
  for target in workspace.registry.targets() {
    match describe_target(&workspace.registry, target, &workspace.config) {
      Ok(overview) => overviews.push(overview),
      Err(err) => print_warning(&err.to_string()),
    }
  }

  if json {
    print_json(&overviews)?;
    return Ok(ExitCode::SUCCESS);
  }

  if overviews.is_empty() {
    println!("No targets defined in {}", manifest.display());
    return Ok(ExitCode::SUCCESS);
  }

  for (i, overview) in overviews.iter().enumerate() {
    if i > 0 {
      println!();
    }
    println!(
      "{} {}",
      overview.name.if_supports_color(Stream::Stdout, |s| s.bold()),
      format!("({}, {}, {})", overview.kind, overview.link_type, overview.output_type)
        .if_supports_color(Stream::Stdout, |s| s.dimmed())
    );
    print_stat("Modules", &overview.modules.join(", "));
    print_stat("Tuples", &overview.tuples.join(", "));
    for group in &overview.binary_modules {
      println!(
        "  {} {}: {}",
        symbols::ARROW,
        group.name,
        group.modules.join(", ")
      );
    }
  }
  Ok(ExitCode::SUCCESS)
}
