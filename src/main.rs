// ABOUTME: Entry point for the imgxfer CLI application.
// ABOUTME: Parses arguments, installs logging and dispatches to command handlers.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use imgxfer::config::{self, Config};
use imgxfer::error::Result;
use imgxfer::output::Output;
use std::env;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let mut output = Output::new(cli.output_mode());
    output.start_timer();

    if let Err(e) = run(cli, &output).await {
        output.error(&e.to_string());
        std::process::exit(1);
    }
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    match &cli.config {
        Some(path) => Config::load(path),
        None => Config::discover(&env::current_dir()?),
    }
}

async fn run(cli: Cli, output: &Output) -> Result<()> {
    match &cli.command {
        Commands::Init { force } => {
            init_tracing(cli.verbose);
            let cwd = env::current_dir()?;
            config::init_config(&cwd, *force)?;
            output.success(&format!("Created {}", config::CONFIG_FILENAME));
            Ok(())
        }
        Commands::Run {
            dry_run,
            max_retries,
            device,
        } => {
            let config = load_config(&cli)?.with_overrides(*dry_run, *max_retries);
            init_tracing(cli.verbose || config.debug);
            commands::run(&config, device.as_deref(), output).await
        }
        Commands::Check { device } => {
            let config = load_config(&cli)?;
            init_tracing(cli.verbose || config.debug);
            commands::check(&config, device.as_deref(), output).await
        }
    }
}
