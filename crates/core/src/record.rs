//! Source-specific record shapes and their mapping into the canonical
//! [`Transaction`] and [`Document`].

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::document::Document;
use crate::money::Money;
use crate::transaction::{Counterparty, Source, Transaction};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("{record} is missing required field '{field}'")]
    MissingField { record: String, field: &'static str },
    #[error("{record} has an invalid value for '{field}': {value}")]
    InvalidField {
        record: String,
        field: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BankAccount {
    BankA,
    BankB,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Processor {
    ProcessorX,
    ProcessorY,
}

/// One booked line from a bank statement feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BankLine {
    pub transaction_id: Option<String>,
    pub booking_date: Option<NaiveDate>,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub purpose: Option<String>,
    pub end_to_end_reference: Option<String>,
    pub counterparty_name: Option<String>,
    pub counterparty_iban: Option<String>,
}

/// A balance movement exported by a payment processor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessorEvent {
    pub id: Option<String>,
    pub created: Option<NaiveDate>,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    /// The processor's own fee/movement taxonomy.
    pub balance_type: Option<String>,
    pub description: Option<String>,
    pub invoice_reference: Option<String>,
    pub customer_name: Option<String>,
}

/// A line of a marketplace settlement report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketplaceSettlement {
    pub settlement_id: Option<String>,
    pub posted_date: Option<NaiveDate>,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub order_id: Option<String>,
    pub amount_type: Option<String>,
    pub description: Option<String>,
}

/// Closed set of inbound record shapes, one variant per source family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceRecord {
    Bank {
        account: BankAccount,
        #[serde(flatten)]
        line: BankLine,
    },
    Processor {
        processor: Processor,
        #[serde(flatten)]
        event: ProcessorEvent,
    },
    Marketplace {
        #[serde(flatten)]
        settlement: MarketplaceSettlement,
    },
}

impl SourceRecord {
    pub fn source(&self) -> Source {
        match self {
            SourceRecord::Bank { account: BankAccount::BankA, .. } => Source::BankA,
            SourceRecord::Bank { account: BankAccount::BankB, .. } => Source::BankB,
            SourceRecord::Processor { processor: Processor::ProcessorX, .. } => Source::ProcessorX,
            SourceRecord::Processor { processor: Processor::ProcessorY, .. } => Source::ProcessorY,
            SourceRecord::Marketplace { .. } => Source::MarketplaceZ,
        }
    }

    /// Map into the canonical transaction, or report the first missing field.
    pub fn into_transaction(self) -> Result<Transaction, RecordError> {
        let source = self.source();
        let record = format!("{source} record");

        match self {
            SourceRecord::Bank { line, .. } => {
                let id = require_text(line.transaction_id, &record, "transaction_id")?;
                let record = format!("{source} record {id}");
                let occurred_at = require(line.booking_date, &record, "booking_date")?;
                let amount = require(line.amount, &record, "amount")?;
                let free_text = join_text([line.purpose, line.end_to_end_reference]);
                let counterparty = Counterparty {
                    name: line.counterparty_name.unwrap_or_default().trim().to_string(),
                    iban: line.counterparty_iban.map(|i| i.replace(' ', "").to_uppercase()),
                };
                Ok(Transaction {
                    currency: currency_or_default(line.currency),
                    counterparty,
                    ..Transaction::new(source, id, Money::from_decimal(amount), occurred_at, free_text)
                })
            }
            SourceRecord::Processor { event, .. } => {
                let id = require_text(event.id, &record, "id")?;
                let record = format!("{source} record {id}");
                let occurred_at = require(event.created, &record, "created")?;
                let amount = require(event.amount, &record, "amount")?;
                let free_text = join_text([event.description, event.invoice_reference]);
                Ok(Transaction {
                    currency: currency_or_default(event.currency),
                    counterparty: Counterparty::named(event.customer_name.unwrap_or_default().trim()),
                    category: non_empty(event.balance_type),
                    ..Transaction::new(source, id, Money::from_decimal(amount), occurred_at, free_text)
                })
            }
            SourceRecord::Marketplace { settlement } => {
                let settlement_id = require_text(settlement.settlement_id, &record, "settlement_id")?;
                // A settlement carries one line per order and amount type.
                let id = match (&settlement.order_id, &settlement.amount_type) {
                    (Some(order), Some(kind)) => format!("{settlement_id}/{order}/{kind}"),
                    (Some(order), None) => format!("{settlement_id}/{order}"),
                    _ => settlement_id,
                };
                let record = format!("{source} record {id}");
                let occurred_at = require(settlement.posted_date, &record, "posted_date")?;
                let amount = require(settlement.amount, &record, "amount")?;
                let free_text = join_text([settlement.order_id, settlement.description]);
                Ok(Transaction {
                    currency: currency_or_default(settlement.currency),
                    category: non_empty(settlement.amount_type),
                    ..Transaction::new(source, id, Money::from_decimal(amount), occurred_at, free_text)
                })
            }
        }
    }
}

/// Inbound document as delivered by the document feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: Option<String>,
    pub document_number: Option<String>,
    pub order_reference: Option<String>,
    pub gross_amount: Option<Decimal>,
    pub issued_at: Option<NaiveDate>,
    pub counterparty_name: Option<String>,
}

impl TryFrom<DocumentRecord> for Document {
    type Error = RecordError;

    fn try_from(rec: DocumentRecord) -> Result<Self, Self::Error> {
        let id = require_text(rec.id, "document", "id")?;
        let record = format!("document {id}");
        let number = require_text(rec.document_number, &record, "document_number")?;
        let gross = require(rec.gross_amount, &record, "gross_amount")?;
        if gross <= Decimal::ZERO {
            return Err(RecordError::InvalidField {
                record,
                field: "gross_amount",
                value: gross.to_string(),
            });
        }
        let issued_at = require(rec.issued_at, &record, "issued_at")?;
        Ok(Document {
            id,
            document_number: number,
            order_reference: non_empty(rec.order_reference),
            gross_amount: Money::from_decimal(gross),
            issued_at,
            counterparty_name: rec.counterparty_name.unwrap_or_default(),
        })
    }
}

fn require<T>(value: Option<T>, record: &str, field: &'static str) -> Result<T, RecordError> {
    value.ok_or_else(|| RecordError::MissingField {
        record: record.to_string(),
        field,
    })
}

fn require_text(value: Option<String>, record: &str, field: &'static str) -> Result<String, RecordError> {
    require(non_empty(value), record, field)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn join_text<const N: usize>(parts: [Option<String>; N]) -> String {
    parts
        .into_iter()
        .filter_map(non_empty)
        .collect::<Vec<_>>()
        .join(" ")
}

fn currency_or_default(currency: Option<String>) -> String {
    non_empty(currency)
        .map(|c| c.to_uppercase())
        .unwrap_or_else(|| "EUR".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::prelude::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn bank_line() -> BankLine {
        BankLine {
            transaction_id: Some("TX-1".to_string()),
            booking_date: Some(date(2025, 3, 10)),
            amount: Some(dec!(119.00)),
            currency: None,
            purpose: Some("Invoice REF RE2025-00042".to_string()),
            end_to_end_reference: Some("E2E-77".to_string()),
            counterparty_name: Some("  ACME GmbH ".to_string()),
            counterparty_iban: Some("de89 3704 0044 0532 0130 00".to_string()),
        }
    }

    #[test]
    fn bank_line_maps_to_transaction() {
        let rec = SourceRecord::Bank { account: BankAccount::BankB, line: bank_line() };
        let txn = rec.into_transaction().unwrap();
        assert_eq!(txn.source, Source::BankB);
        assert_eq!(txn.id, "TX-1");
        assert_eq!(txn.amount, Money::from_cents(11900));
        assert_eq!(txn.currency, "EUR");
        assert_eq!(txn.free_text, "Invoice REF RE2025-00042 E2E-77");
        assert_eq!(txn.counterparty.name, "ACME GmbH");
        assert_eq!(txn.counterparty.iban.as_deref(), Some("DE89370400440532013000"));
        assert!(txn.category.is_none());
    }

    #[test]
    fn bank_line_missing_amount_is_malformed() {
        let line = BankLine { amount: None, ..bank_line() };
        let err = SourceRecord::Bank { account: BankAccount::BankA, line }
            .into_transaction()
            .unwrap_err();
        assert_eq!(
            err,
            RecordError::MissingField { record: "bank-a record TX-1".to_string(), field: "amount" }
        );
    }

    #[test]
    fn blank_identifier_is_malformed() {
        let line = BankLine { transaction_id: Some("   ".to_string()), ..bank_line() };
        assert!(SourceRecord::Bank { account: BankAccount::BankA, line }
            .into_transaction()
            .is_err());
    }

    #[test]
    fn processor_event_carries_category() {
        let event = ProcessorEvent {
            id: Some("txn_1".to_string()),
            created: Some(date(2025, 3, 10)),
            amount: Some(dec!(-0.54)),
            currency: Some("eur".to_string()),
            balance_type: Some("fee".to_string()),
            description: Some("Processing fee".to_string()),
            invoice_reference: None,
            customer_name: None,
        };
        let txn = SourceRecord::Processor { processor: Processor::ProcessorX, event }
            .into_transaction()
            .unwrap();
        assert_eq!(txn.source, Source::ProcessorX);
        assert_eq!(txn.category.as_deref(), Some("fee"));
        assert_eq!(txn.currency, "EUR");
        assert!(txn.amount.is_outflow());
    }

    #[test]
    fn marketplace_id_combines_settlement_order_and_type() {
        let settlement = MarketplaceSettlement {
            settlement_id: Some("S-9".to_string()),
            posted_date: Some(date(2025, 3, 11)),
            amount: Some(dec!(24.99)),
            currency: None,
            order_id: Some("302-1234567-7654321".to_string()),
            amount_type: Some("principal".to_string()),
            description: None,
        };
        let txn = SourceRecord::Marketplace { settlement }.into_transaction().unwrap();
        assert_eq!(txn.id, "S-9/302-1234567-7654321/principal");
        assert_eq!(txn.free_text, "302-1234567-7654321");
        assert_eq!(txn.category.as_deref(), Some("principal"));
    }

    #[test]
    fn source_record_deserializes_tagged_json() {
        let json = r#"{"kind":"bank","account":"bank-a","transaction_id":"X","booking_date":"2025-03-10","amount":"5.00"}"#;
        let rec: SourceRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.source(), Source::BankA);
        assert_eq!(rec.into_transaction().unwrap().amount, Money::from_cents(500));
    }

    #[test]
    fn document_record_validation() {
        let rec = DocumentRecord {
            id: Some("D1".to_string()),
            document_number: Some("RE2025-00042".to_string()),
            order_reference: Some(" ".to_string()),
            gross_amount: Some(dec!(119.00)),
            issued_at: Some(date(2025, 3, 1)),
            counterparty_name: None,
        };
        let doc = Document::try_from(rec.clone()).unwrap();
        assert_eq!(doc.order_reference, None);

        let missing = DocumentRecord { document_number: None, ..rec.clone() };
        assert!(Document::try_from(missing).is_err());

        let negative = DocumentRecord { gross_amount: Some(dec!(-1)), ..rec };
        assert!(matches!(
            Document::try_from(negative),
            Err(RecordError::InvalidField { field: "gross_amount", .. })
        ));
    }
}
