// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Parser, Subcommand};
use imgxfer::output::OutputMode;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "imgxfer")]
#[command(about = "Stage Cisco software images on network devices over SSH")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print final results
    #[arg(short, long, global = true, conflicts_with = "json")]
    pub quiet: bool,

    /// Print JSON lines
    #[arg(long, global = true)]
    pub json: bool,

    /// Path to the configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn output_mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else if self.quiet {
            OutputMode::Quiet
        } else {
            OutputMode::Normal
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new imgxfer.yml configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Transfer the target image to configured devices
    Run {
        /// Log copy and delete commands instead of sending them
        #[arg(long)]
        dry_run: bool,

        /// Retries after the first attempt (0 = single attempt)
        #[arg(long)]
        max_retries: Option<u32>,

        /// Only run against this host
        #[arg(long)]
        device: Option<String>,
    },

    /// Resolve catalog and repository entries without contacting devices
    Check {
        /// Only check this host
        #[arg(long)]
        device: Option<String>,
    },
}
