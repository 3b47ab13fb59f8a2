use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::{Context, Result};
use concordia_core::{ReconcileConfig, TransactionFilter, TransactionKey};
use concordia_reconcile::{cancel_token, BatchReport, CancelToken, Feed, ReconciliationPipeline};
use concordia_storage::{create_db, SqliteLearningStore, SqliteRecordStore};
use serde_json::json;
use tracing::{info, warn};

pub type Pipeline = ReconciliationPipeline<SqliteRecordStore, SqliteLearningStore>;

pub fn load_config(path: Option<&Path>) -> Result<ReconcileConfig> {
    let Some(path) = path else {
        return Ok(ReconcileConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    ReconcileConfig::from_toml(&raw).with_context(|| format!("Invalid config {}", path.display()))
}

pub async fn open_pipeline(db: &Path, config: &ReconcileConfig) -> Result<Pipeline> {
    let pool = create_db(db)
        .await
        .with_context(|| format!("Failed to open database {}", db.display()))?;
    let pipeline = Pipeline::new(
        config,
        Arc::new(SqliteRecordStore::new(pool.clone())),
        Arc::new(SqliteLearningStore::new(pool)),
    )?;
    Ok(pipeline)
}

/// Ctrl-C stops new transactions from starting; in-flight ones finish.
fn cancel_on_interrupt() -> CancelToken {
    let cancel = cancel_token();
    let flag = Arc::clone(&cancel);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing in-flight transactions");
            flag.store(true, Ordering::SeqCst);
        }
    });
    cancel
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_report(report: &BatchReport) -> Result<()> {
    let tally = &report.summary.tally;
    if tally.is_partial() {
        warn!(
            errors = tally.errors.len(),
            skipped = tally.skipped,
            "Batch finished with failures"
        );
    }
    print_json(report)
}

pub async fn cmd_ingest(pipeline: &Pipeline, feed_path: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(feed_path)
        .with_context(|| format!("Failed to read feed {}", feed_path.display()))?;
    let feed: Feed = serde_json::from_str(&raw)
        .with_context(|| format!("Feed {} is not valid JSON", feed_path.display()))?;
    info!(
        transactions = feed.transactions.len(),
        documents = feed.documents.len(),
        "Feed loaded"
    );

    let report = pipeline.process_feed(feed, &cancel_on_interrupt()).await;
    print_report(&report)
}

pub async fn cmd_reconcile(pipeline: &Pipeline, filter: TransactionFilter) -> Result<()> {
    let report = pipeline.run(&filter, &cancel_on_interrupt()).await?;
    print_report(&report)
}

pub async fn cmd_confirm_match(pipeline: &Pipeline, key: &TransactionKey, document: &str) -> Result<()> {
    let result = pipeline.confirm_match(key, document).await?;
    print_json(&result)
}

pub async fn cmd_override(
    pipeline: &Pipeline,
    key: &TransactionKey,
    document: &str,
    reason: &str,
) -> Result<()> {
    let result = pipeline.override_match(key, document, reason).await?;
    print_json(&result)
}

pub async fn cmd_confirm_account(pipeline: &Pipeline, key: &TransactionKey, account: &str) -> Result<()> {
    let learned = pipeline.confirm_suggestion(key, account).await?;
    print_json(&json!({
        "transaction": key.to_string(),
        "account_code": account,
        "rule_change": learned.as_ref().map(|l| l.change),
        "rule": learned.map(|l| l.rule),
    }))
}

pub async fn cmd_deactivate_rule(pipeline: &Pipeline, pattern: &str) -> Result<()> {
    if !pipeline.deactivate_rule(pattern).await? {
        anyhow::bail!("No active rule with pattern '{pattern}'");
    }
    println!("Deactivated rule '{pattern}'");
    Ok(())
}
