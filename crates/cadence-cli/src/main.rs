//! Cadence CLI entry point.
//!
//! Binary name: `cadence`
//!
//! Parses CLI arguments, initializes tracing, then dispatches to the serve
//! or connect command handler.

mod campaign;
mod cli;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up tracing based on verbosity
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,cadence=debug,cadence_core=debug,cadence_net=debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();

    match cli.command {
        Commands::Serve {
            campaign,
            config,
            port,
            connect_grace,
        } => {
            cli::serve::serve(&campaign, config.as_deref(), port, connect_grace, cli.json).await?;
        }

        Commands::Connect { name, addr } => {
            cli::connect::connect(&addr, &name).await?;
        }
    }

    Ok(())
}
