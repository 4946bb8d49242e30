//! Command-line interface definitions for Sector Desk.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Options can be provided via command-line flags or environment variables;
//! API keys are only ever read from the environment.

use crate::pipeline::Job;
use clap::{Parser, Subcommand};

/// Command-line arguments for the Sector Desk application.
///
/// # Examples
///
/// ```sh
/// # Strategy reports for every configured sector
/// sector_desk
///
/// # Structured analyses for two sectors, writing under ./site
/// sector_desk --root-dir ./site --sector finance --sector tech editor
///
/// # Persona comments with a custom config file
/// sector_desk -c desk.yaml comments
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a config.yaml file
    #[arg(short, long, env = "SECTOR_DESK_CONFIG")]
    pub config: Option<String>,

    /// Directory receiving latest artifacts, history/ and history_index.json
    #[arg(short, long, default_value = ".")]
    pub root_dir: String,

    /// Only process these sector keys (repeatable)
    #[arg(short, long = "sector")]
    pub sectors: Vec<String>,

    /// Override the generation API base URL
    #[arg(long, env = "GEMINI_API_BASE")]
    pub api_base: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Which job to run; defaults to `boardroom`.
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Archive raw data, write per-sector strategy reports, refresh the history index
    Boardroom,
    /// Write per-sector structured JSON analyses
    Editor,
    /// Write per-sector persona comment sections
    Comments,
}

impl Cli {
    pub fn job(&self) -> Job {
        match self.command.unwrap_or(Command::Boardroom) {
            Command::Boardroom => Job::Boardroom,
            Command::Editor => Job::Editor,
            Command::Comments => Job::Comments,
        }
    }
}
