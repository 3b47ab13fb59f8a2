//! Contracts for the two collaborators the reconciliation core depends on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::account::{AccountSuggestion, LearnedRule, RuleChange, RuleOrigin};
use crate::document::Document;
use crate::guard::MatchWrite;
use crate::period::DateRange;
use crate::transaction::{Source, Transaction, TransactionKey};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Write conflict on {0}: the active match is confirmed")]
    ConfirmedConflict(TransactionKey),
    #[error("Corrupt stored value: {0}")]
    Corrupt(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

/// Predicate for listing transactions. Empty filter lists everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionFilter {
    pub source: Option<Source>,
    pub occurred_within: Option<DateRange>,
    pub without_confirmed_match: bool,
}

impl TransactionFilter {
    pub fn matches(&self, txn: &Transaction) -> bool {
        self.source.map_or(true, |s| s == txn.source)
            && self.occurred_within.map_or(true, |r| r.contains(txn.occurred_at))
            && !(self.without_confirmed_match && txn.is_match_confirmed())
    }
}

/// The normalized record store holding transactions and documents.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert or update keyed by `(source, id)`. Re-ingesting a record
    /// refreshes its payload but never touches match or account fields.
    async fn upsert_transaction(&self, txn: &Transaction) -> Result<UpsertOutcome, StoreError>;

    async fn get_transaction(&self, key: &TransactionKey) -> Result<Option<Transaction>, StoreError>;

    /// Keys in `(source, id)` order.
    async fn list_transactions(&self, filter: &TransactionFilter) -> Result<Vec<TransactionKey>, StoreError>;

    async fn upsert_document(&self, doc: &Document) -> Result<UpsertOutcome, StoreError>;

    async fn get_document(&self, id: &str) -> Result<Option<Document>, StoreError>;

    /// Documents issued within `range`, ordered by id.
    async fn documents_in_range(&self, range: DateRange) -> Result<Vec<Document>, StoreError>;

    /// Documents whose number or order reference contains `identifier`,
    /// case-insensitively, ordered by id.
    async fn find_documents_by_identifier(&self, identifier: &str) -> Result<Vec<Document>, StoreError>;

    /// Persist a guarded match write. Implementations must re-check
    /// [`MatchWrite::permitted_on`] against the stored state atomically and
    /// fail with [`StoreError::ConfirmedConflict`] instead of overwriting.
    async fn save_match(&self, write: &MatchWrite) -> Result<(), StoreError>;

    /// Persist one transaction's automatic outcome: the guarded match write
    /// and the new suggestion, either or both. All of it lands or none of
    /// it does; a [`StoreError::ConfirmedConflict`] on the match also
    /// discards the suggestion.
    async fn save_outcome(
        &self,
        key: &TransactionKey,
        write: Option<&MatchWrite>,
        suggestion: Option<&AccountSuggestion>,
    ) -> Result<(), StoreError>;

    async fn assign_account(&self, key: &TransactionKey, account_code: &str) -> Result<(), StoreError>;
}

/// Persistent learned rules, keyed by pattern.
#[async_trait]
pub trait LearningStore: Send + Sync {
    async fn get_rule(&self, pattern: &str) -> Result<Option<LearnedRule>, StoreError>;

    async fn active_rules(&self) -> Result<Vec<LearnedRule>, StoreError>;

    /// Create the rule for `pattern` or apply [`LearnedRule::confirm`] to the
    /// existing one, atomically.
    async fn record_confirmation(
        &self,
        pattern: &str,
        account_code: &str,
        origin: RuleOrigin,
        now: DateTime<Utc>,
    ) -> Result<(RuleChange, LearnedRule), StoreError>;

    /// Apply [`LearnedRule::record_use`] and return the updated rule.
    async fn record_use(&self, pattern: &str, now: DateTime<Utc>) -> Result<Option<LearnedRule>, StoreError>;

    /// Returns whether an active rule was deactivated.
    async fn deactivate(&self, pattern: &str) -> Result<bool, StoreError>;
}
