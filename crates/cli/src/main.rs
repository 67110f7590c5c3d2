//! kiln - incremental build driver for modular C++ projects.

mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use kiln_lib::consts::MANIFEST_FILE_NAME;
use kiln_lib::platform::{TargetArchitecture, TargetConfiguration, TargetPlatform};
use tracing_subscriber::EnvFilter;

use crate::cmd::BuildRequest;

#[derive(Parser)]
#[command(name = "kiln")]
#[command(author, version, about = "Incremental build driver for modular C++ projects", long_about = None)]
struct Cli {
  /// Enable debug logging
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Rules manifest to load
  #[arg(long, global = true, default_value = MANIFEST_FILE_NAME)]
  manifest: PathBuf,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build targets for every requested platform, architecture and configuration
  Build {
    /// Target to build (repeatable; default: every target)
    #[arg(short, long = "target", value_name = "NAME")]
    targets: Vec<String>,

    /// Platform to build for (repeatable)
    #[arg(long = "platform", value_name = "PLATFORM")]
    platforms: Vec<TargetPlatform>,

    /// Architecture to build for (repeatable)
    #[arg(long = "arch", value_name = "ARCH")]
    architectures: Vec<TargetArchitecture>,

    /// Configuration to build (repeatable)
    #[arg(short, long = "configuration", value_name = "CONFIG")]
    configurations: Vec<TargetConfiguration>,

    /// Maximum number of concurrently running work items
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Clean intermediate and output folders first
    #[arg(long)]
    rebuild: bool,
  },

  /// Remove intermediate and output folders
  Clean {
    /// Target to clean (repeatable; default: every target)
    #[arg(short, long = "target", value_name = "NAME")]
    targets: Vec<String>,
  },

  /// Show targets with their modules, binary modules and tuples
  Info {
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },
}

fn main() -> Result<ExitCode> {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "info" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .with_writer(std::io::stderr)
    .with_target(false)
    .without_time()
    .init();

  match cli.command {
    Commands::Build {
      targets,
      platforms,
      architectures,
      configurations,
      jobs,
      rebuild,
    } => cmd::cmd_build(&BuildRequest {
      manifest: cli.manifest,
      targets,
      platforms,
      architectures,
      configurations,
      jobs,
      rebuild,
    }),
    Commands::Clean { targets } => cmd::cmd_clean(&cli.manifest, targets),
    Commands::Info { json } => cmd::cmd_info(&cli.manifest, json),
  }
}
