//! CLI argument parsing using clap derive

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Vault Sync - Mirror a document vault onto the local filesystem
#[derive(Parser, Debug)]
#[command(name = "vault-sync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// The command to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Synchronize the local tree with the vault
    ///
    /// Failed runs are retried on the configured delay schedule unless
    /// --no-retry is given. Exits with status 1 when the run reported errors.
    Sync {
        /// Configuration file (.toml, .json, .yaml)
        #[arg(short, long, env = "VAULT_SYNC_CONFIG")]
        config: PathBuf,

        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,

        /// Make a single attempt
        #[arg(long)]
        no_retry: bool,
    },

    /// Show what a sync would do without changing anything
    Plan {
        /// Configuration file (.toml, .json, .yaml)
        #[arg(short, long, env = "VAULT_SYNC_CONFIG")]
        config: PathBuf,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },
}
