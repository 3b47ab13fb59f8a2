//! concordia-run: batch payment reconciliation over a SQLite database.
//!
//! Usage:
//!   concordia-run ingest --feed feed.json      Ingest and reconcile a feed
//!   concordia-run reconcile --open-only        Re-run over stored transactions
//!   concordia-run confirm-match --source bank-a --id T1 --document D42

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use concordia_core::TransactionFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose.
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    // Logs go to stderr so stdout stays machine-readable JSON.
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr).compact())
        .init();

    let config = commands::load_config(cli.config.as_deref())?;
    let pipeline = commands::open_pipeline(&cli.db, &config).await?;

    match cli.command {
        Commands::Ingest { feed } => commands::cmd_ingest(&pipeline, &feed).await,
        Commands::Reconcile { source, open_only } => {
            let filter = TransactionFilter {
                source,
                without_confirmed_match: open_only,
                ..TransactionFilter::default()
            };
            commands::cmd_reconcile(&pipeline, filter).await
        }
        Commands::ConfirmMatch { transaction, document } => {
            commands::cmd_confirm_match(&pipeline, &transaction.key(), &document).await
        }
        Commands::Override {
            transaction,
            document,
            reason,
        } => commands::cmd_override(&pipeline, &transaction.key(), &document, &reason).await,
        Commands::ConfirmAccount { transaction, account } => {
            commands::cmd_confirm_account(&pipeline, &transaction.key(), &account).await
        }
        Commands::DeactivateRule { pattern } => commands::cmd_deactivate_rule(&pipeline, &pattern).await,
    }
}
