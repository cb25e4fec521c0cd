//! UTXO ledger CLI
//!
//! Runs the demonstration narrative and inspects saved chains.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use utxo_ledger::cli;
use utxo_ledger::core::{LedgerConfig, DEFAULT_DIFFICULTY, MINIMUM_TRANSACTION};
use utxo_ledger::crypto::MerkleMode;
use utxo_ledger::storage::{Storage, StorageConfig};

#[derive(Parser)]
#[command(name = "ledger")]
#[command(version = "0.1.0")]
#[command(about = "A single-node UTXO ledger with proof-of-work sealing", long_about = None)]
struct Cli {
    /// Data directory for chain storage
    #[arg(short, long, default_value = ".ledger_data")]
    data_dir: PathBuf,

    /// Number of rotating backups kept on save (0 disables)
    #[arg(long, default_value = "5")]
    max_backups: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a fresh chain through the demo transfers and save it
    Demo {
        /// Mining difficulty (number of leading zero hex characters)
        #[arg(short = 'D', long, default_value_t = DEFAULT_DIFFICULTY)]
        difficulty: usize,

        /// Smallest total input value a transfer may spend
        #[arg(short, long, default_value_t = MINIMUM_TRANSACTION)]
        minimum: u64,

        /// Threads used for the nonce search
        #[arg(short, long, default_value = "1")]
        workers: usize,

        /// Use the legacy merkle pairing (drops an unpaired trailing id)
        #[arg(long)]
        legacy_merkle: bool,
    },

    /// Replay the saved chain from genesis
    Validate,

    /// Show chain statistics and recent blocks
    Info {
        /// Number of blocks to show
        #[arg(short, long, default_value = "10")]
        count: usize,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let storage = Storage::new(StorageConfig {
        data_dir: cli.data_dir.clone(),
        max_backups: cli.max_backups,
        ..Default::default()
    })?;

    match cli.command {
        Commands::Demo {
            difficulty,
            minimum,
            workers,
            legacy_merkle,
        } => {
            let config = LedgerConfig {
                difficulty,
                minimum_value: minimum,
                merkle_mode: if legacy_merkle {
                    MerkleMode::Legacy
                } else {
                    MerkleMode::Balanced
                },
                mining_workers: workers,
            };
            cli::cmd_demo(&storage, config)?;
        }

        Commands::Validate => {
            cli::cmd_validate(&storage)?;
        }

        Commands::Info { count } => {
            cli::cmd_info(&storage, count)?;
        }
    }

    Ok(())
}
