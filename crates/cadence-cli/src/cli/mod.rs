//! CLI command definitions and dispatch for the `cadence` binary.
//!
//! Uses clap derive macros for argument parsing. Two commands: `serve` runs
//! the campaign server, `connect` joins it as an endpoint.

pub mod connect;
pub mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Run scripted outreach campaigns over persistent connections.
#[derive(Parser)]
#[command(name = "cadence", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Accept endpoint connections and run a campaign against them.
    Serve {
        /// Campaign definition file (TOML).
        campaign: PathBuf,

        /// Server configuration file (TOML).
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port to listen on (overrides the config file).
        #[arg(short, long)]
        port: Option<u16>,

        /// Seconds to wait for endpoints before the campaign starts
        /// (overrides the config file).
        #[arg(long)]
        connect_grace: Option<u64>,
    },

    /// Connect to a campaign server as a named endpoint.
    Connect {
        /// Display name announced to the server.
        name: String,

        /// Server address to connect to.
        #[arg(long, default_value = "127.0.0.1:1212")]
        addr: String,
    },
}
