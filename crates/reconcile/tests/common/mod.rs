#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDate;
use concordia_core::{
    Counterparty, Document, InMemoryLearningStore, InMemoryRecordStore, Money, ReconcileConfig,
    RecordStore, Source, Transaction,
};
use concordia_reconcile::ReconciliationPipeline;

pub type Pipeline = ReconciliationPipeline<InMemoryRecordStore, InMemoryLearningStore>;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn march(day: u32) -> NaiveDate {
    date(2025, 3, day)
}

pub fn eur(cents: i64) -> Money {
    Money::from_cents(cents)
}

pub fn bank_txn(id: &str, cents: i64, day: u32, text: &str) -> Transaction {
    Transaction::new(Source::BankA, id, eur(cents), march(day), text)
}

pub fn paid_by(txn: Transaction, counterparty: &str) -> Transaction {
    txn.with_counterparty(Counterparty::named(counterparty))
}

pub fn invoice(id: &str, number: &str, cents: i64, day: u32) -> Document {
    Document::new(id, number, eur(cents), march(day))
}

pub fn pipeline(config: ReconcileConfig) -> Pipeline {
    Pipeline::new(
        &config,
        Arc::new(InMemoryRecordStore::new()),
        Arc::new(InMemoryLearningStore::new()),
    )
    .unwrap()
}

pub async fn seed(p: &Pipeline, txns: &[Transaction], docs: &[Document]) {
    for t in txns {
        p.records().upsert_transaction(t).await.unwrap();
    }
    for d in docs {
        p.records().upsert_document(d).await.unwrap();
    }
}

pub async fn stored(p: &Pipeline, txn: &Transaction) -> Transaction {
    p.records().get_transaction(&txn.key()).await.unwrap().unwrap()
}
