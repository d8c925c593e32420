//! CLI definitions for apiwatch.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// apiwatch CLI.
#[derive(Parser)]
#[command(name = "apiwatch")]
#[command(about = "Endpoint health monitoring with deduplicated alerting")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(
        short,
        long,
        env = "APIWATCH_CONFIG",
        default_value = "config/apiwatch.toml",
        global = true
    )]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run the scheduler in foreground (default)
    Run,

    /// Run one sweep over every non-token endpoint and exit
    Sweep,

    /// Run one token-balance pass and exit
    Tokens,

    /// Send the daily report now and exit
    Report,

    /// Validate the configuration file
    CheckConfig,

    /// Endpoint store management
    Endpoints {
        #[command(subcommand)]
        action: EndpointAction,
    },
}

#[derive(Subcommand)]
pub(crate) enum EndpointAction {
    /// List stored endpoints
    List {
        /// Output format (table, json)
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Insert or replace endpoints from a JSON array file
    Import {
        /// Path to the JSON file
        file: PathBuf,
    },
}
