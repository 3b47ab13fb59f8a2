//! In-process implementations of the store contracts. Used as the default
//! store for tests and for one-shot runs that do not need persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use crate::account::{AccountSuggestion, LearnedRule, RuleChange, RuleOrigin};
use crate::document::Document;
use crate::guard::MatchWrite;
use crate::period::DateRange;
use crate::store::{LearningStore, RecordStore, StoreError, TransactionFilter, UpsertOutcome};
use crate::transaction::{Transaction, TransactionKey};

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    m.lock()
        .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".to_string()))
}

#[derive(Debug, Default)]
struct Records {
    transactions: BTreeMap<TransactionKey, Transaction>,
    documents: BTreeMap<String, Document>,
}

#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: Mutex<Records>,
    unavailable: Mutex<BTreeSet<TransactionKey>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every read and write touching `key` fail with
    /// [`StoreError::Unavailable`], simulating a collaborator outage.
    pub fn make_unavailable(&self, key: TransactionKey) {
        if let Ok(mut keys) = self.unavailable.lock() {
            keys.insert(key);
        }
    }

    pub fn restore(&self, key: &TransactionKey) {
        if let Ok(mut keys) = self.unavailable.lock() {
            keys.remove(key);
        }
    }

    /// Snapshot of every stored transaction in key order.
    pub fn transactions(&self) -> Vec<Transaction> {
        self.records
            .lock()
            .map(|r| r.transactions.values().cloned().collect())
            .unwrap_or_default()
    }

    fn check_available(&self, key: &TransactionKey) -> Result<(), StoreError> {
        if lock(&self.unavailable)?.contains(key) {
            return Err(StoreError::Unavailable(format!("record store refused {key}")));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn upsert_transaction(&self, txn: &Transaction) -> Result<UpsertOutcome, StoreError> {
        let key = txn.key();
        self.check_available(&key)?;
        let mut records = lock(&self.records)?;
        match records.transactions.get_mut(&key) {
            Some(existing) if existing.same_payload(txn) => Ok(UpsertOutcome::Unchanged),
            Some(existing) => {
                let mut refreshed = txn.clone();
                refreshed.active_match = existing.active_match.take();
                refreshed.suggestion = existing.suggestion.take();
                refreshed.assigned_account = existing.assigned_account.take();
                refreshed.ingested_at = existing.ingested_at;
                *existing = refreshed;
                Ok(UpsertOutcome::Updated)
            }
            None => {
                let mut fresh = txn.clone();
                fresh.ingested_at.get_or_insert_with(Utc::now);
                records.transactions.insert(key, fresh);
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    async fn get_transaction(&self, key: &TransactionKey) -> Result<Option<Transaction>, StoreError> {
        self.check_available(key)?;
        Ok(lock(&self.records)?.transactions.get(key).cloned())
    }

    async fn list_transactions(&self, filter: &TransactionFilter) -> Result<Vec<TransactionKey>, StoreError> {
        Ok(lock(&self.records)?
            .transactions
            .values()
            .filter(|t| filter.matches(t))
            .map(Transaction::key)
            .collect())
    }

    async fn upsert_document(&self, doc: &Document) -> Result<UpsertOutcome, StoreError> {
        let mut records = lock(&self.records)?;
        match records.documents.insert(doc.id.clone(), doc.clone()) {
            None => Ok(UpsertOutcome::Inserted),
            Some(previous) if previous == *doc => Ok(UpsertOutcome::Unchanged),
            Some(_) => Ok(UpsertOutcome::Updated),
        }
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>, StoreError> {
        Ok(lock(&self.records)?.documents.get(id).cloned())
    }

    async fn documents_in_range(&self, range: DateRange) -> Result<Vec<Document>, StoreError> {
        Ok(lock(&self.records)?
            .documents
            .values()
            .filter(|d| range.contains(d.issued_at))
            .cloned()
            .collect())
    }

    async fn find_documents_by_identifier(&self, identifier: &str) -> Result<Vec<Document>, StoreError> {
        Ok(lock(&self.records)?
            .documents
            .values()
            .filter(|d| d.references(identifier))
            .cloned()
            .collect())
    }

    async fn save_match(&self, write: &MatchWrite) -> Result<(), StoreError> {
        let key = write.transaction();
        self.check_available(key)?;
        let mut records = lock(&self.records)?;
        let txn = records
            .transactions
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        if write.apply_to(txn) {
            Ok(())
        } else {
            Err(StoreError::ConfirmedConflict(key.clone()))
        }
    }

    async fn save_outcome(
        &self,
        key: &TransactionKey,
        write: Option<&MatchWrite>,
        suggestion: Option<&AccountSuggestion>,
    ) -> Result<(), StoreError> {
        self.check_available(key)?;
        let mut records = lock(&self.records)?;
        let txn = records
            .transactions
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        if let Some(write) = write {
            if write.transaction() != key {
                return Err(StoreError::Corrupt(format!("match for {} saved under {key}", write.transaction())));
            }
            if !write.apply_to(txn) {
                return Err(StoreError::ConfirmedConflict(key.clone()));
            }
        }
        if let Some(s) = suggestion {
            txn.suggestion = Some(s.clone());
        }
        Ok(())
    }

    async fn assign_account(&self, key: &TransactionKey, account_code: &str) -> Result<(), StoreError> {
        self.check_available(key)?;
        let mut records = lock(&self.records)?;
        let txn = records
            .transactions
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        txn.assigned_account = Some(account_code.to_string());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryLearningStore {
    rules: Mutex<BTreeMap<String, LearnedRule>>,
}

impl InMemoryLearningStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every rule, active or not, in pattern order.
    pub fn all_rules(&self) -> Vec<LearnedRule> {
        self.rules
            .lock()
            .map(|r| r.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn insert(&self, rule: LearnedRule) {
        if let Ok(mut rules) = self.rules.lock() {
            rules.insert(rule.pattern.clone(), rule);
        }
    }
}

#[async_trait]
impl LearningStore for InMemoryLearningStore {
    async fn get_rule(&self, pattern: &str) -> Result<Option<LearnedRule>, StoreError> {
        Ok(lock(&self.rules)?.get(pattern).cloned())
    }

    async fn active_rules(&self) -> Result<Vec<LearnedRule>, StoreError> {
        Ok(lock(&self.rules)?
            .values()
            .filter(|r| r.active)
            .cloned()
            .collect())
    }

    async fn record_confirmation(
        &self,
        pattern: &str,
        account_code: &str,
        origin: RuleOrigin,
        now: DateTime<Utc>,
    ) -> Result<(RuleChange, LearnedRule), StoreError> {
        let mut rules = lock(&self.rules)?;
        match rules.get_mut(pattern) {
            Some(rule) => {
                let change = rule.confirm(account_code, origin, now);
                Ok((change, rule.clone()))
            }
            None => {
                let rule = LearnedRule::new(pattern, account_code, origin, now);
                rules.insert(pattern.to_string(), rule.clone());
                Ok((RuleChange::Created, rule))
            }
        }
    }

    async fn record_use(&self, pattern: &str, now: DateTime<Utc>) -> Result<Option<LearnedRule>, StoreError> {
        let mut rules = lock(&self.rules)?;
        Ok(rules.get_mut(pattern).map(|rule| {
            rule.record_use(now);
            rule.clone()
        }))
    }

    async fn deactivate(&self, pattern: &str) -> Result<bool, StoreError> {
        let mut rules = lock(&self.rules)?;
        Ok(match rules.get_mut(pattern) {
            Some(rule) if rule.active => {
                rule.active = false;
                true
            }
            _ => false,
        })
    }
}
