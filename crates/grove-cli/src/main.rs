//! # grove-cli
//!
//! Command line front end for the Grove package resolver.
//!
//! Parses arguments, sets up logging, loads layered settings and hands the
//! requested targets to the resolver.

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::error;

mod commands;
mod output;

use commands::CommandContext;
use output::errors::ErrorFormatter;

/// Resolve and fetch source packages from a Grove registry
#[derive(Parser)]
#[command(name = "grove", version, about = "Source package resolver and fetcher")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Skip the local mirror and ask the registry directly
    #[arg(long, global = true)]
    pub force_server_query: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the dependency closure of targets without downloading
    Resolve {
        /// `path`, `path-version` or `path-branch`
        #[arg(required = true)]
        targets: Vec<String>,
    },
    /// Resolve targets and unpack them into the storage directory
    Fetch {
        #[arg(required = true)]
        targets: Vec<String>,
        /// Report whether the consumer with this key must rebuild
        #[arg(long, value_name = "KEY")]
        rebuild_key: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let runtime = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
    let result = runtime.block_on(async {
        let ctx = CommandContext::new(cli.force_server_query).await?;
        commands::dispatch_command(cli.command, &ctx).await
    });

    if let Err(e) = result {
        error!("{}", e);
        eprintln!("{}", ErrorFormatter::new().format_error(&e));
        std::process::exit(1);
    }
    Ok(())
}

fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    tracing_subscriber::fmt()
        // Prefix match: covers every grove_* crate
        .with_env_filter(format!("grove={}", level))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
