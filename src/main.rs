//! mono - Build-artifact cache for parallel working copies
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use mono::cli::{Cli, Commands};
use mono::error::MonoResult;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> MonoResult<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = match cli.verbose {
        0 => EnvFilter::new("mono=info"),
        1 => EnvFilter::new("mono=debug"),
        _ => EnvFilter::new("mono=trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    // Dispatch to command
    match cli.command {
        Commands::Init(args) => mono::cli::commands::init(args).await,
        Commands::Destroy(args) => mono::cli::commands::destroy(args).await,
        Commands::Sync(args) => mono::cli::commands::sync(args).await,
        Commands::List(args) => mono::cli::commands::list(args).await,
        Commands::Detect(args) => mono::cli::commands::detect(args).await,
        Commands::Cache(args) => mono::cli::commands::cache(args).await,
    }
}
