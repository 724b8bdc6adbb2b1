use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Versioned deduplicating backup store.
#[derive(Debug, Parser)]
#[command(name = "strata", version, about)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long = "config-file", global = true, default_value = "config.toml")]
    pub config_file: PathBuf,

    /// Increase log verbosity (-v: info, -vv: debug, -vvv: trace).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Ingest a file as the next version.
    Write {
        /// The backup workload to ingest.
        #[arg(long = "input-file")]
        input_file: PathBuf,

        /// Run the arrangement pass after ingestion.
        #[arg(long = "apply-arrangement", default_value_t = true,
              action = clap::ArgAction::Set)]
        apply_arrangement: bool,
    },

    /// Restore a retained version to a file.
    Restore {
        /// Which version to restore (1 ..= number of retained versions).
        #[arg(long = "restore-version", default_value_t = 1)]
        restore_version: u64,

        /// Where the restored file is written.
        #[arg(long = "restore-path")]
        restore_path: PathBuf,
    },

    /// Delete the earliest retained version.
    Delete,

    /// Show the store's durable state.
    Status,
}
