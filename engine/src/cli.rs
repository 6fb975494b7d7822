//! CLI interface for Cadence
//!
//! Commands and global flags, using clap's derive API.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Cadence study planner
///
/// Talk to a planning assistant, agree on a study schedule, and push it to
/// your calendar.
#[derive(Parser, Debug)]
#[command(name = "cadence")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start an interactive planning conversation
    Chat,

    /// Send one request and run a single routing cycle
    Run {
        /// The request, e.g. "Schedule a Math session tomorrow 8-9:30"
        request: String,
    },

    /// Check configuration, model providers and calendar credentials
    Doctor,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,
}
