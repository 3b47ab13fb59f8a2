use std::path::PathBuf;

use clap::{Parser, Subcommand};
use concordia_core::{Source, TransactionKey};

/// Reconcile payment transactions against open invoices and orders
#[derive(Parser)]
#[command(name = "concordia-run")]
#[command(about = "Batch payment reconciliation", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "concordia.db", global = true)]
    pub db: PathBuf,

    /// TOML configuration; built-in defaults when omitted
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Identifies one transaction by its source and source-stable id.
#[derive(clap::Args)]
pub struct TransactionArg {
    /// Source the transaction came from (bank-a, processor-x, ...)
    #[arg(long)]
    pub source: Source,

    /// Source-stable transaction id
    #[arg(long)]
    pub id: String,
}

impl TransactionArg {
    pub fn key(&self) -> TransactionKey {
        TransactionKey::new(self.source, self.id.clone())
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ingest a JSON feed and reconcile everything it delivered
    Ingest {
        /// Feed file with `transactions` and `documents` arrays
        #[arg(short, long)]
        feed: PathBuf,
    },

    /// Reconcile transactions already in the database
    Reconcile {
        /// Only this source
        #[arg(long)]
        source: Option<Source>,

        /// Skip transactions whose match is already confirmed
        #[arg(long)]
        open_only: bool,
    },

    /// Accept a provisional match or a review candidate
    ConfirmMatch {
        #[command(flatten)]
        transaction: TransactionArg,

        /// Document id
        #[arg(long)]
        document: String,
    },

    /// Replace a confirmed match
    Override {
        #[command(flatten)]
        transaction: TransactionArg,

        /// Document id
        #[arg(long)]
        document: String,

        /// Why the confirmed match was wrong
        #[arg(long)]
        reason: String,
    },

    /// Assign an account and teach the learned rules
    ConfirmAccount {
        #[command(flatten)]
        transaction: TransactionArg,

        /// Account code, e.g. 4920
        #[arg(long)]
        account: String,
    },

    /// Stop a learned rule from producing suggestions
    DeactivateRule {
        /// Rule pattern as stored
        pattern: String,
    },
}
