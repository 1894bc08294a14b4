#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the safezone alerting engine.
//!
//! `safezone watch` (the default) loads zones, bulk-fetches incidents,
//! follows the live incident stream and reads position updates from stdin
//! as `lat,lng` lines. Alerts are printed to stdout as JSON lines and shown
//! as notifications on stderr.
//!
//! Uses `indicatif-log-bridge` (via [`safezone_cli_utils::init_logger`])
//! so log lines and spinners share the terminal.

mod check;
mod config;
mod watch;
mod zones;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use safezone_geo::Coordinate;

use crate::config::{Config, parse_position};

#[derive(Parser)]
#[command(name = "safezone", about = "Geofenced incident alerting")]
struct Cli {
    /// Path to the TOML config file. Missing files fall back to defaults.
    #[arg(long, global = true, default_value = "safezone.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow the backend and alert on incidents inside your zones (default)
    Watch {
        /// Starting position as `lat,lng` (overrides `[position]`)
        #[arg(long, value_parser = parse_position)]
        position: Option<Coordinate>,
        /// Do not read position updates from stdin
        #[arg(long)]
        no_stdin: bool,
        /// Log alerts instead of ringing the terminal bell
        #[arg(long)]
        quiet: bool,
    },
    /// Evaluate a JSON file of incident records against the configured
    /// zones without contacting the backend
    Check {
        /// JSON array of incident records
        incidents: PathBuf,
        /// Position for the self zone as `lat,lng` (overrides `[position]`)
        #[arg(long, value_parser = parse_position)]
        position: Option<Coordinate>,
    },
    /// Manage zones stored on the backend
    Zones {
        #[command(subcommand)]
        command: zones::ZonesCommand,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = safezone_cli_utils::init_logger();
    let cli = Cli::parse();
    let config = Config::load_or_default(&cli.config)?;

    let command = cli.command.unwrap_or(Commands::Watch {
        position: None,
        no_stdin: false,
        quiet: false,
    });

    match command {
        Commands::Watch {
            position,
            no_stdin,
            quiet,
        } => {
            let options = watch::WatchOptions {
                position,
                no_stdin,
                quiet,
            };
            watch::run(&config, &multi, options).await?;
        }
        Commands::Check {
            incidents,
            position,
        } => check::run(&config, &incidents, position)?,
        Commands::Zones { command } => zones::run(&config, &multi, command).await?,
    }

    Ok(())
}
