//! Implementation of the `kiln clean` command.

use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;

use kiln_lib::build::Builder;
use kiln_lib::toolchain::gnu::GnuToolchain;

use crate::output::{print_info, print_success};

use super::load_workspace;

pub fn cmd_clean(manifest: &Path, targets: Vec<String>) -> Result<ExitCode> {
  let workspace = load_workspace(manifest)?;
  let mut config = workspace.config;
  config.targets = targets;

  let toolchain = GnuToolchain::new(workspace.manifest.toolchain.clone());
  let removed = Builder::new(&workspace.registry, &toolchain, config).clean()?;

  if removed.is_empty() {
    print_info("Nothing to clean");
  } else {
    for folder in &removed {
      println!("  - {}", folder.display());
    }
    print_success(&format!("Removed {} folder(s)", removed.len()));
  }
  Ok(ExitCode::SUCCESS)
}
