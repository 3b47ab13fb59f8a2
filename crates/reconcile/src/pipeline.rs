//! Batch reconciliation over injected stores.
//!
//! Each transaction runs extraction, candidate generation, selection and
//! persistence in sequence; transactions run concurrently on a bounded
//! worker pool. Cancellation is checked before a transaction is started,
//! never in the middle of one.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use concordia_core::{
    AccountSuggestion, ConfidenceLevel, ConfigError, Document, LearningStore, MatchMethod,
    MatchResult, MatchWrite, PersistenceGuard, ReconcileConfig, RecordStore, RuleOrigin, StoreError,
    SuggestionMethod, Transaction, TransactionFilter, TransactionKey,
};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::candidates::{CandidateGenerator, CandidateSet};
use crate::error::{PipelineError, Result};
use crate::ingest::{Feed, Ingestor};
use crate::learning::{learn_from_confirmation, LearnedOutcome};
use crate::selector::{MatchSelector, Selection};
use crate::suggest::AccountSuggestionEngine;
use crate::summary::{BatchReport, BatchSummary, BatchTally};

/// Cooperative cancellation signal. Set to true to stop starting new
/// transactions.
pub type CancelToken = Arc<AtomicBool>;

pub fn cancel_token() -> CancelToken {
    Arc::new(AtomicBool::new(false))
}

/// Result of processing one transaction.
#[derive(Debug, Clone)]
pub struct Processed {
    pub selection: Selection,
    /// Method of the suggestion the transaction carries afterwards.
    pub suggestion: Option<SuggestionMethod>,
}

pub struct ReconciliationPipeline<S, L> {
    records: Arc<S>,
    learning: Arc<L>,
    generator: Arc<CandidateGenerator>,
    selector: MatchSelector,
    suggester: Arc<AccountSuggestionEngine>,
    guard: PersistenceGuard,
    max_workers: usize,
}

impl<S, L> Clone for ReconciliationPipeline<S, L> {
    fn clone(&self) -> Self {
        Self {
            records: Arc::clone(&self.records),
            learning: Arc::clone(&self.learning),
            generator: Arc::clone(&self.generator),
            selector: self.selector.clone(),
            suggester: Arc::clone(&self.suggester),
            guard: self.guard,
            max_workers: self.max_workers,
        }
    }
}

impl<S, L> ReconciliationPipeline<S, L>
where
    S: RecordStore + 'static,
    L: LearningStore + 'static,
{
    pub fn new(config: &ReconcileConfig, records: Arc<S>, learning: Arc<L>) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            generator: Arc::new(CandidateGenerator::new(config)?),
            selector: MatchSelector::new(config.auto_accept_confidence),
            suggester: Arc::new(AccountSuggestionEngine::standard(config, Arc::clone(&learning))),
            guard: PersistenceGuard,
            max_workers: config.max_workers,
            records,
            learning,
        })
    }

    /// Replace the suggestion cascade.
    pub fn with_suggestion_engine(mut self, engine: AccountSuggestionEngine) -> Self {
        self.suggester = Arc::new(engine);
        self
    }

    pub fn records(&self) -> &Arc<S> {
        &self.records
    }

    pub fn learning(&self) -> &Arc<L> {
        &self.learning
    }

    /// Ingest a feed, then reconcile every transaction it delivered.
    pub async fn process_feed(&self, feed: Feed, cancel: &CancelToken) -> BatchReport {
        let ingested = Ingestor::new(Arc::clone(&self.records)).ingest(feed).await;
        let mut report = self.run_batch(ingested.keys, cancel).await;

        let tally = &mut report.summary.tally;
        tally.malformed = ingested.malformed.len();
        tally.malformed_records = ingested.malformed;
        tally.total += ingested.failed.len();
        tally.errors.extend(ingested.failed);
        tally.errors.sort();
        report
    }

    /// Reconcile every stored transaction the filter selects.
    pub async fn run(&self, filter: &TransactionFilter, cancel: &CancelToken) -> Result<BatchReport> {
        let keys = self.records.list_transactions(filter).await?;
        Ok(self.run_batch(keys, cancel).await)
    }

    /// Always completes; per-transaction failures are reported in the tally.
    pub async fn run_batch(&self, keys: Vec<TransactionKey>, cancel: &CancelToken) -> BatchReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let clock = Instant::now();
        info!(%run_id, transactions = keys.len(), workers = self.max_workers, "Batch started");

        let mut tally = BatchTally {
            total: keys.len(),
            ..BatchTally::default()
        };
        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut handles = Vec::with_capacity(keys.len());
        let mut pending = keys.into_iter();

        while let Some(key) = pending.next() {
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            if cancel.load(Ordering::SeqCst) {
                tally.cancelled = true;
                tally.skipped = 1 + pending.len();
                info!(%run_id, skipped = tally.skipped, "Batch cancelled");
                break;
            }
            let this = self.clone();
            let task_key = key.clone();
            let handle = tokio::spawn(async move {
                let _permit = permit;
                this.process_transaction(&task_key).await
            });
            handles.push((key, handle));
        }

        let mut review_queue = Vec::new();
        for (key, handle) in handles {
            match handle.await {
                Ok(Ok(processed)) => {
                    tally.record(&processed.selection, processed.suggestion);
                    review_queue.extend(processed.selection.review);
                }
                Ok(Err(e)) => {
                    warn!(transaction = %key, error = %e, "Transaction failed");
                    tally.record_failure(key, e);
                }
                Err(e) => {
                    error!(transaction = %key, error = %e, "Transaction worker panicked");
                    tally.record_failure(key, e);
                }
            }
        }
        tally.errors.sort();
        review_queue.sort_by(|a, b| a.transaction.cmp(&b.transaction));

        let elapsed = clock.elapsed();
        info!(
            %run_id,
            processed = tally.processed,
            confirmed = tally.outcomes.confirmed,
            provisional = tally.outcomes.provisional,
            review = tally.outcomes.review,
            unmatched = tally.outcomes.unmatched,
            errors = tally.errors.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Batch finished"
        );

        BatchReport {
            summary: BatchSummary {
                run_id,
                started_at,
                elapsed,
                tally,
            },
            review_queue,
        }
    }

    /// Extraction, candidates, selection, then one atomic write of the match
    /// and the suggestion. All reads happen before that write, so a failed
    /// transaction is left untouched. A learned rule's use is counted only
    /// after the write has landed.
    pub async fn process_transaction(&self, key: &TransactionKey) -> Result<Processed> {
        let txn = self.load(key).await?;
        let documents = self.candidate_documents(&txn).await?;
        let set = self.generator.generate(&txn, &documents);
        let mut selection = self.selector.select(&txn, &set);

        let suggestion = if txn.suggestion.is_none() && txn.assigned_account.is_none() {
            self.suggester.suggest(&txn).await?
        } else {
            None
        };

        if selection.write.is_some() || suggestion.is_some() {
            let saved = self
                .records
                .save_outcome(key, selection.write.as_ref(), suggestion.as_ref())
                .await;
            match saved {
                Ok(()) => {}
                Err(StoreError::ConfirmedConflict(_)) => {
                    debug!(transaction = %key, "Match confirmed concurrently, keeping it");
                    let current = self.load(key).await?;
                    selection = self.selector.select(&current, &set);
                    if suggestion.is_some() {
                        self.records.save_outcome(key, None, suggestion.as_ref()).await?;
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        if let Some(pattern) = suggestion.as_ref().and_then(|s| s.rule.as_deref()) {
            if let Err(e) = self.learning.record_use(pattern, Utc::now()).await {
                warn!(transaction = %key, pattern, error = %e, "Learned rule use not counted");
            }
        }

        debug!(
            transaction = %key,
            outcome = ?selection.outcome,
            method = %selection.method,
            candidates = set.candidates.len(),
            "Transaction processed"
        );
        Ok(Processed {
            suggestion: suggestion.or(txn.suggestion).map(|s| s.method),
            selection,
        })
    }

    /// Identifier hits plus everything in the transaction's date window.
    async fn candidate_documents(&self, txn: &Transaction) -> Result<Vec<Document>> {
        let mut by_id = BTreeMap::new();
        for id in self.generator.identifiers(txn) {
            for doc in self.records.find_documents_by_identifier(&id.value).await? {
                by_id.entry(doc.id.clone()).or_insert(doc);
            }
        }
        for doc in self.records.documents_in_range(self.generator.window(txn)).await? {
            by_id.entry(doc.id.clone()).or_insert(doc);
        }
        Ok(by_id.into_values().collect())
    }

    async fn load(&self, key: &TransactionKey) -> Result<Transaction> {
        self.records
            .get_transaction(key)
            .await?
            .ok_or_else(|| PipelineError::UnknownTransaction(key.clone()))
    }

    async fn load_document(&self, id: &str) -> Result<Document> {
        self.records
            .get_document(id)
            .await?
            .ok_or_else(|| PipelineError::UnknownDocument(id.to_string()))
    }

    // ── Human decisions ──────────────────────────────────────────────────────

    /// Accept a provisional match or a review suggestion. Refused when the
    /// transaction already carries a confirmed match.
    pub async fn confirm_match(&self, key: &TransactionKey, document_id: &str) -> Result<MatchResult> {
        let txn = self.load(key).await?;
        let doc = self.load_document(document_id).await?;

        let proposed = txn
            .active_match
            .clone()
            .filter(|m| m.document_id.as_deref() == Some(document_id))
            .unwrap_or_else(|| self.reviewer_match(&txn, &doc));
        let write = self
            .guard
            .confirm(&txn, proposed)
            .ok_or_else(|| PipelineError::AlreadyConfirmed(key.clone()))?;
        self.save_human_match(&write).await?;

        info!(transaction = %key, document = document_id, "Match confirmed");
        Ok(write.result().clone())
    }

    /// The only operation that replaces a confirmed match.
    pub async fn override_match(
        &self,
        key: &TransactionKey,
        document_id: &str,
        reason: &str,
    ) -> Result<MatchResult> {
        let txn = self.load(key).await?;
        self.load_document(document_id).await?;

        let write = self.guard.manual_override(&txn, document_id, reason);
        self.save_human_match(&write).await?;

        info!(
            transaction = %key,
            document = document_id,
            previous = ?txn.active_match.as_ref().and_then(|m| m.document_id.as_deref()),
            "Match overridden"
        );
        Ok(write.result().clone())
    }

    /// Assign the account and feed the learning loop. Accepting the pending
    /// suggestion as-is learns with origin `auto`, anything else is `manual`.
    pub async fn confirm_suggestion(
        &self,
        key: &TransactionKey,
        account_code: &str,
    ) -> Result<Option<LearnedOutcome>> {
        let txn = self.load(key).await?;
        let origin = match &txn.suggestion {
            Some(s) if s.account_code == account_code => RuleOrigin::Auto,
            _ => RuleOrigin::Manual,
        };
        self.records.assign_account(key, account_code).await?;
        let outcome =
            learn_from_confirmation(self.learning.as_ref(), &txn, account_code, origin, Utc::now()).await?;
        Ok(outcome)
    }

    pub async fn deactivate_rule(&self, pattern: &str) -> Result<bool> {
        let deactivated = self.learning.deactivate(pattern).await?;
        if deactivated {
            info!(pattern, "Learned rule deactivated");
        }
        Ok(deactivated)
    }

    /// Suggestion for a single transaction without persisting it.
    pub async fn suggest(&self, key: &TransactionKey) -> Result<Option<AccountSuggestion>> {
        let txn = self.load(key).await?;
        Ok(self.suggester.suggest(&txn).await?)
    }

    /// The candidate for `doc` if the tiers produce one, else a manual match.
    fn reviewer_match(&self, txn: &Transaction, doc: &Document) -> MatchResult {
        let set: CandidateSet = self.generator.generate(txn, std::slice::from_ref(doc));
        match set.best() {
            Some(candidate) => MatchResult::from_candidate(txn.key(), candidate, true),
            None => {
                let partial = self
                    .generator
                    .scorer()
                    .partial_payment(txn.amount, doc.gross_amount);
                MatchResult {
                    transaction: txn.key(),
                    document_id: Some(doc.id.clone()),
                    confidence: ConfidenceLevel::High,
                    score: 0.0,
                    method: MatchMethod::Manual,
                    reason: "confirmed by reviewer".to_string(),
                    is_partial_payment: partial.is_some(),
                    partial_percentage: partial,
                    confirmed: true,
                }
            }
        }
    }

    async fn save_human_match(&self, write: &MatchWrite) -> Result<()> {
        self.records.save_match(write).await.map_err(|e| match e {
            StoreError::ConfirmedConflict(key) => PipelineError::AlreadyConfirmed(key),
            other => other.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use concordia_core::{InMemoryLearningStore, InMemoryRecordStore, Money, Source};

    type Pipeline = ReconciliationPipeline<InMemoryRecordStore, InMemoryLearningStore>;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, day).unwrap()
    }

    async fn pipeline_with(txns: &[Transaction], docs: &[Document]) -> Pipeline {
        let records = Arc::new(InMemoryRecordStore::new());
        for t in txns {
            records.upsert_transaction(t).await.unwrap();
        }
        for doc in docs {
            records.upsert_document(doc).await.unwrap();
        }
        Pipeline::new(&ReconcileConfig::default(), records, Arc::new(InMemoryLearningStore::new())).unwrap()
    }

    fn txn(id: &str, cents: i64, text: &str) -> Transaction {
        Transaction::new(Source::BankA, id, Money::from_cents(cents), d(10), text)
    }

    #[tokio::test]
    async fn rejects_invalid_config() {
        let mut config = ReconcileConfig::default();
        config.max_workers = 0;
        let result = Pipeline::new(
            &config,
            Arc::new(InMemoryRecordStore::new()),
            Arc::new(InMemoryLearningStore::new()),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn unknown_transaction_is_an_error() {
        let p = pipeline_with(&[], &[]).await;
        let err = p
            .process_transaction(&TransactionKey::new(Source::BankA, "nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnknownTransaction(_)));
    }

    #[tokio::test]
    async fn confirm_match_accepts_review_candidate() {
        let t = txn("T1", 5000, "");
        let doc = Document::new("D1", "RE2025-00050", Money::from_cents(10000), d(9));
        let p = pipeline_with(&[t.clone()], &[doc]).await;

        let result = p.confirm_match(&t.key(), "D1").await.unwrap();
        assert!(result.confirmed);
        assert_eq!(result.method, MatchMethod::AmountDate);
        assert!(result.is_partial_payment);

        let err = p.confirm_match(&t.key(), "D1").await.unwrap_err();
        assert!(matches!(err, PipelineError::AlreadyConfirmed(_)));
    }

    #[tokio::test]
    async fn confirm_match_outside_candidates_is_manual() {
        let t = txn("T1", 5000, "");
        let far = Document::new("D9", "RE2024-00001", Money::from_cents(99900), d(1));
        let p = pipeline_with(&[t.clone()], &[far]).await;
        let result = p.confirm_match(&t.key(), "D9").await.unwrap();
        assert_eq!(result.method, MatchMethod::Manual);
        assert!(result.confirmed);
    }

    #[tokio::test]
    async fn confirm_match_unknown_document() {
        let t = txn("T1", 5000, "");
        let p = pipeline_with(&[t.clone()], &[]).await;
        assert!(matches!(
            p.confirm_match(&t.key(), "D404").await,
            Err(PipelineError::UnknownDocument(_))
        ));
    }

    #[tokio::test]
    async fn override_replaces_confirmed_match() {
        let t = txn("T1", 11900, "RE2025-00042");
        let d1 = Document::new("D1", "RE2025-00042", Money::from_cents(11900), d(1));
        let d2 = Document::new("D2", "RE2025-00043", Money::from_cents(11900), d(2));
        let p = pipeline_with(&[t.clone()], &[d1, d2]).await;

        p.process_transaction(&t.key()).await.unwrap();
        let result = p.override_match(&t.key(), "D2", "paid the wrong invoice number").await.unwrap();
        assert_eq!(result.method, MatchMethod::Manual);

        let stored = p.records().get_transaction(&t.key()).await.unwrap().unwrap();
        assert_eq!(stored.active_match.unwrap().document_id.as_deref(), Some("D2"));
    }

    #[tokio::test]
    async fn suggestion_is_computed_once() {
        let t = txn("T1", -4990, "Telekom Mobilfunk 03/2025");
        let p = pipeline_with(&[t.clone()], &[]).await;
        let first = p.process_transaction(&t.key()).await.unwrap();
        assert_eq!(first.suggestion, Some(SuggestionMethod::Static));
        let second = p.process_transaction(&t.key()).await.unwrap();
        assert_eq!(second.suggestion, Some(SuggestionMethod::Static));
    }
}
