use std::collections::BTreeSet;
use std::sync::Arc;

use concordia_core::{
    Document, DocumentRecord, RecordStore, SourceRecord, TransactionKey, UpsertOutcome,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::summary::TransactionFailure;

/// One delivery from the excluded feed collaborators.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Feed {
    pub transactions: Vec<SourceRecord>,
    pub documents: Vec<DocumentRecord>,
}

/// Which list of a feed a record was delivered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Document,
    Transaction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MalformedRecord {
    pub kind: RecordKind,
    /// Position within the list `kind` names.
    pub index: usize,
    pub reason: String,
}

impl MalformedRecord {
    fn new(kind: RecordKind, index: usize, reason: impl ToString) -> Self {
        Self {
            kind,
            index,
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestCounts {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
}

impl IngestCounts {
    fn add(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Unchanged => self.unchanged += 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub transactions: IngestCounts,
    pub documents: IngestCounts,
    /// Keys of every stored transaction in this delivery, deduplicated, in
    /// delivery order.
    pub keys: Vec<TransactionKey>,
    pub malformed: Vec<MalformedRecord>,
    pub failed: Vec<TransactionFailure>,
    pub failed_documents: Vec<String>,
}

/// Maps feed records into canonical form and upserts them. Duplicate
/// deliveries converge on the same stored record.
pub struct Ingestor<S: ?Sized> {
    store: Arc<S>,
}

impl<S: RecordStore + ?Sized> Ingestor<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Documents first, so transactions in the same feed can match them.
    /// A malformed record is skipped and reported; it never fails the feed.
    pub async fn ingest(&self, feed: Feed) -> IngestReport {
        let mut report = IngestReport::default();
        self.ingest_documents(feed.documents, &mut report).await;
        self.ingest_transactions(feed.transactions, &mut report).await;
        info!(
            inserted = report.transactions.inserted,
            updated = report.transactions.updated,
            unchanged = report.transactions.unchanged,
            documents = report.documents.inserted + report.documents.updated,
            malformed = report.malformed.len(),
            failed = report.failed.len() + report.failed_documents.len(),
            "Feed ingested"
        );
        report
    }

    async fn ingest_documents(&self, records: Vec<DocumentRecord>, report: &mut IngestReport) {
        for (index, record) in records.into_iter().enumerate() {
            let doc = match Document::try_from(record) {
                Ok(doc) => doc,
                Err(e) => {
                    warn!(index, error = %e, "Skipping malformed document");
                    report.malformed.push(MalformedRecord::new(RecordKind::Document, index, e));
                    continue;
                }
            };
            match self.store.upsert_document(&doc).await {
                Ok(outcome) => report.documents.add(outcome),
                Err(e) => {
                    warn!(document = %doc.id, error = %e, "Document upsert failed");
                    report.failed_documents.push(format!("{}: {e}", doc.id));
                }
            }
        }
    }

    async fn ingest_transactions(&self, records: Vec<SourceRecord>, report: &mut IngestReport) {
        let mut seen = BTreeSet::new();
        for (index, record) in records.into_iter().enumerate() {
            let txn = match record.into_transaction() {
                Ok(txn) => txn,
                Err(e) => {
                    warn!(index, error = %e, "Skipping malformed transaction");
                    report.malformed.push(MalformedRecord::new(RecordKind::Transaction, index, e));
                    continue;
                }
            };
            let key = txn.key();
            match self.store.upsert_transaction(&txn).await {
                Ok(outcome) => {
                    debug!(transaction = %key, ?outcome, "Transaction upserted");
                    report.transactions.add(outcome);
                    if seen.insert(key.clone()) {
                        report.keys.push(key);
                    }
                }
                Err(e) => {
                    warn!(transaction = %key, error = %e, "Transaction upsert failed");
                    report.failed.push(TransactionFailure {
                        transaction: key,
                        error: e.to_string(),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use concordia_core::{BankAccount, BankLine, InMemoryRecordStore, Source};
    use rust_decimal::prelude::dec;

    fn line(id: Option<&str>, amount: Option<rust_decimal::Decimal>) -> SourceRecord {
        SourceRecord::Bank {
            account: BankAccount::BankA,
            line: BankLine {
                transaction_id: id.map(str::to_string),
                booking_date: NaiveDate::from_ymd_opt(2025, 3, 10),
                amount,
                purpose: Some("Invoice REF RE2025-00042".to_string()),
                ..BankLine::default()
            },
        }
    }

    fn document(id: Option<&str>) -> DocumentRecord {
        DocumentRecord {
            id: id.map(str::to_string),
            document_number: Some("RE2025-00042".to_string()),
            gross_amount: Some(dec!(119.00)),
            issued_at: NaiveDate::from_ymd_opt(2025, 3, 1),
            ..DocumentRecord::default()
        }
    }

    #[tokio::test]
    async fn duplicate_delivery_is_deduplicated() {
        let store = Arc::new(InMemoryRecordStore::new());
        let ingestor = Ingestor::new(store.clone());
        let feed = Feed {
            transactions: vec![line(Some("T1"), Some(dec!(119))), line(Some("T1"), Some(dec!(119)))],
            documents: vec![document(Some("D1"))],
        };

        let report = ingestor.ingest(feed.clone()).await;
        assert_eq!(report.transactions.inserted, 1);
        assert_eq!(report.transactions.unchanged, 1);
        assert_eq!(report.keys, vec![TransactionKey::new(Source::BankA, "T1")]);
        assert_eq!(report.documents.inserted, 1);

        let again = ingestor.ingest(feed).await;
        assert_eq!(again.transactions.unchanged, 2);
        assert_eq!(again.documents.unchanged, 1);
        assert_eq!(store.transactions().len(), 1);
    }

    #[tokio::test]
    async fn malformed_records_are_skipped_and_counted() {
        let store = Arc::new(InMemoryRecordStore::new());
        let feed = Feed {
            transactions: vec![line(Some("T1"), None), line(None, Some(dec!(5))), line(Some("T2"), Some(dec!(5)))],
            documents: vec![document(None)],
        };
        let report = Ingestor::new(store.clone()).ingest(feed).await;
        let located: Vec<_> = report.malformed.iter().map(|m| (m.kind, m.index)).collect();
        // Index 0 appears twice, once per list.
        assert_eq!(
            located,
            vec![
                (RecordKind::Document, 0),
                (RecordKind::Transaction, 0),
                (RecordKind::Transaction, 1),
            ]
        );
        assert!(report.malformed[0].reason.contains("id"));
        assert!(report.malformed[1].reason.contains("amount"));
        assert_eq!(report.keys, vec![TransactionKey::new(Source::BankA, "T2")]);
    }

    #[tokio::test]
    async fn feed_parses_from_json() {
        let feed: Feed = serde_json::from_str(
            r#"{
                "transactions": [
                    {"kind": "bank", "account": "bank-b", "transaction_id": "X1",
                     "booking_date": "2025-03-10", "amount": "-49.90", "purpose": "Telekom"}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(feed.transactions[0].source(), Source::BankB);
        assert!(feed.documents.is_empty());
    }
}
