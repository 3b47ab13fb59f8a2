//! SQLite-backed [`RecordStore`].
//!
//! Money is stored as decimal text so no precision is lost, dates as ISO
//! text so range queries compare lexically. The active match and the
//! account suggestion are JSON columns; `match_confirmed` mirrors the
//! match's flag so the guard condition can be checked in the UPDATE itself.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use concordia_core::{
    AccountSuggestion, Counterparty, DateRange, Document, MatchResult, MatchWrite, Money,
    RecordStore, Source, StoreError, Transaction, TransactionFilter, TransactionKey, UpsertOutcome,
};
use tracing::debug;

use crate::db::{corrupt, unavailable, DbPool};

type TransactionRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
);

const TRANSACTION_COLUMNS: &str = "source, id, amount, currency, occurred_at, free_text, counterparty_name, counterparty_iban, category, ingested_at, active_match, suggestion, assigned_account";

type DocumentRow = (String, String, Option<String>, String, String, String);

const DOCUMENT_COLUMNS: &str = "id, document_number, order_reference, gross_amount, issued_at, counterparty_name";

#[derive(Debug, Clone)]
pub struct SqliteRecordStore {
    pool: DbPool,
}

impl SqliteRecordStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    async fn exists(&self, key: &TransactionKey) -> Result<bool, StoreError> {
        let row = sqlx::query_as::<_, (i64,)>("SELECT 1 FROM transactions WHERE source = ? AND id = ?")
            .bind(key.source.as_str())
            .bind(&key.id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(row.is_some())
    }

    /// Fails with `NotFound` when an UPDATE touched nothing.
    fn require_row(affected: u64, key: &TransactionKey) -> Result<(), StoreError> {
        if affected == 0 {
            Err(StoreError::NotFound(key.to_string()))
        } else {
            Ok(())
        }
    }
}

fn parse_date(column: &str, value: &str) -> Result<NaiveDate, StoreError> {
    value.parse().map_err(|e| corrupt(column, e))
}

fn parse_money(column: &str, value: &str) -> Result<Money, StoreError> {
    value.parse().map_err(|e| corrupt(column, e))
}

fn parse_json<T: serde::de::DeserializeOwned>(column: &str, value: Option<String>) -> Result<Option<T>, StoreError> {
    value
        .map(|v| serde_json::from_str(&v).map_err(|e| corrupt(column, e)))
        .transpose()
}

fn to_json<T: serde::Serialize>(column: &str, value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| corrupt(column, e))
}

fn transaction_from_row(r: TransactionRow) -> Result<Transaction, StoreError> {
    let ingested_at = DateTime::parse_from_rfc3339(&r.9)
        .map_err(|e| corrupt("ingested_at", e))?
        .with_timezone(&Utc);
    Ok(Transaction {
        source: r.0.parse().map_err(|e: String| corrupt("source", e))?,
        id: r.1,
        amount: parse_money("amount", &r.2)?,
        currency: r.3,
        occurred_at: parse_date("occurred_at", &r.4)?,
        free_text: r.5,
        counterparty: Counterparty { name: r.6, iban: r.7 },
        category: r.8,
        ingested_at: Some(ingested_at),
        active_match: parse_json::<MatchResult>("active_match", r.10)?,
        suggestion: parse_json::<AccountSuggestion>("suggestion", r.11)?,
        assigned_account: r.12,
    })
}

fn document_from_row(r: DocumentRow) -> Result<Document, StoreError> {
    Ok(Document {
        id: r.0,
        document_number: r.1,
        order_reference: r.2,
        gross_amount: parse_money("gross_amount", &r.3)?,
        issued_at: parse_date("issued_at", &r.4)?,
        counterparty_name: r.5,
    })
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn upsert_transaction(&self, txn: &Transaction) -> Result<UpsertOutcome, StoreError> {
        let key = txn.key();
        let existing = self.get_transaction(&key).await?;
        if existing.as_ref().is_some_and(|e| e.same_payload(txn)) {
            return Ok(UpsertOutcome::Unchanged);
        }

        let ingested_at = txn.ingested_at.unwrap_or_else(Utc::now).to_rfc3339();
        // Match and account columns are never part of the conflict update.
        sqlx::query(
            r#"
            INSERT INTO transactions (source, id, amount, currency, occurred_at, free_text,
                counterparty_name, counterparty_iban, category, ingested_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (source, id) DO UPDATE SET
                amount = excluded.amount,
                currency = excluded.currency,
                occurred_at = excluded.occurred_at,
                free_text = excluded.free_text,
                counterparty_name = excluded.counterparty_name,
                counterparty_iban = excluded.counterparty_iban,
                category = excluded.category
            "#,
        )
        .bind(key.source.as_str())
        .bind(&key.id)
        .bind(txn.amount.as_decimal().to_string())
        .bind(&txn.currency)
        .bind(txn.occurred_at.to_string())
        .bind(&txn.free_text)
        .bind(&txn.counterparty.name)
        .bind(&txn.counterparty.iban)
        .bind(&txn.category)
        .bind(ingested_at)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        let outcome = if existing.is_some() {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        };
        debug!(transaction = %key, ?outcome, "Transaction stored");
        Ok(outcome)
    }

    async fn get_transaction(&self, key: &TransactionKey) -> Result<Option<Transaction>, StoreError> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE source = ? AND id = ?"
        ))
        .bind(key.source.as_str())
        .bind(&key.id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;
        row.map(transaction_from_row).transpose()
    }

    async fn list_transactions(&self, filter: &TransactionFilter) -> Result<Vec<TransactionKey>, StoreError> {
        let (start, end) = match filter.occurred_within {
            Some(range) => (Some(range.start.to_string()), Some(range.end.to_string())),
            None => (None, None),
        };
        let rows = sqlx::query_as::<_, (String, String)>(
            r#"
            SELECT source, id FROM transactions
            WHERE (? IS NULL OR source = ?)
              AND (? IS NULL OR occurred_at >= ?)
              AND (? IS NULL OR occurred_at <= ?)
              AND (? = 0 OR match_confirmed = 0)
            "#,
        )
        .bind(filter.source.map(Source::as_str))
        .bind(filter.source.map(Source::as_str))
        .bind(&start)
        .bind(&start)
        .bind(&end)
        .bind(&end)
        .bind(filter.without_confirmed_match)
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        let mut keys = rows
            .into_iter()
            .map(|(source, id)| {
                let source: Source = source.parse().map_err(|e: String| corrupt("source", e))?;
                Ok(TransactionKey::new(source, id))
            })
            .collect::<Result<Vec<_>, StoreError>>()?;
        // Source order is the enum's, not the column text's.
        keys.sort();
        Ok(keys)
    }

    async fn upsert_document(&self, doc: &Document) -> Result<UpsertOutcome, StoreError> {
        let existing = self.get_document(&doc.id).await?;
        if existing.as_ref() == Some(doc) {
            return Ok(UpsertOutcome::Unchanged);
        }

        sqlx::query(
            r#"
            INSERT INTO documents (id, document_number, order_reference, gross_amount, issued_at, counterparty_name)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                document_number = excluded.document_number,
                order_reference = excluded.order_reference,
                gross_amount = excluded.gross_amount,
                issued_at = excluded.issued_at,
                counterparty_name = excluded.counterparty_name
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.document_number)
        .bind(&doc.order_reference)
        .bind(doc.gross_amount.as_decimal().to_string())
        .bind(doc.issued_at.to_string())
        .bind(&doc.counterparty_name)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(if existing.is_some() {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        })
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query_as::<_, DocumentRow>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;
        row.map(document_from_row).transpose()
    }

    async fn documents_in_range(&self, range: DateRange) -> Result<Vec<Document>, StoreError> {
        let rows = sqlx::query_as::<_, DocumentRow>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE issued_at >= ? AND issued_at <= ? ORDER BY id"
        ))
        .bind(range.start.to_string())
        .bind(range.end.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;
        rows.into_iter().map(document_from_row).collect()
    }

    async fn find_documents_by_identifier(&self, identifier: &str) -> Result<Vec<Document>, StoreError> {
        if identifier.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, DocumentRow>(&format!(
            r#"
            SELECT {DOCUMENT_COLUMNS} FROM documents
            WHERE instr(lower(document_number), lower(?)) > 0
               OR instr(lower(coalesce(order_reference, '')), lower(?)) > 0
            ORDER BY id
            "#
        ))
        .bind(identifier)
        .bind(identifier)
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        // SQLite's lower() only folds ASCII; the document decides.
        rows.into_iter()
            .map(document_from_row)
            .filter(|d| d.as_ref().map_or(true, |d| d.references(identifier)))
            .collect()
    }

    async fn save_match(&self, write: &MatchWrite) -> Result<(), StoreError> {
        let key = write.transaction();
        let result = write.result();
        let guard = if write.kind().may_replace_confirmed() {
            ""
        } else {
            " AND match_confirmed = 0"
        };
        let affected = sqlx::query(&format!(
            "UPDATE transactions SET active_match = ?, match_confirmed = ? WHERE source = ? AND id = ?{guard}"
        ))
        .bind(to_json("active_match", result)?)
        .bind(result.confirmed)
        .bind(key.source.as_str())
        .bind(&key.id)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?
        .rows_affected();

        if affected > 0 {
            return Ok(());
        }
        if self.exists(key).await? {
            Err(StoreError::ConfirmedConflict(key.clone()))
        } else {
            Err(StoreError::NotFound(key.to_string()))
        }
    }

    /// One UPDATE, so the match and the suggestion land together. The guard
    /// condition sits in the WHERE clause, so a conflict writes neither.
    async fn save_outcome(
        &self,
        key: &TransactionKey,
        write: Option<&MatchWrite>,
        suggestion: Option<&AccountSuggestion>,
    ) -> Result<(), StoreError> {
        if let Some(write) = write {
            if write.transaction() != key {
                return Err(StoreError::Corrupt(format!("match for {} saved under {key}", write.transaction())));
            }
        }
        let mut sets = Vec::new();
        if write.is_some() {
            sets.push("active_match = ?, match_confirmed = ?");
        }
        if suggestion.is_some() {
            sets.push("suggestion = ?");
        }
        if sets.is_empty() {
            return if self.exists(key).await? {
                Ok(())
            } else {
                Err(StoreError::NotFound(key.to_string()))
            };
        }
        let guarded = write.is_some_and(|w| !w.kind().may_replace_confirmed());
        let guard = if guarded { " AND match_confirmed = 0" } else { "" };
        let sql = format!(
            "UPDATE transactions SET {} WHERE source = ? AND id = ?{guard}",
            sets.join(", ")
        );

        let mut query = sqlx::query(&sql);
        if let Some(write) = write {
            query = query
                .bind(to_json("active_match", write.result())?)
                .bind(write.result().confirmed);
        }
        if let Some(s) = suggestion {
            query = query.bind(to_json("suggestion", s)?);
        }
        let affected = query
            .bind(key.source.as_str())
            .bind(&key.id)
            .execute(&self.pool)
            .await
            .map_err(unavailable)?
            .rows_affected();

        if affected > 0 {
            debug!(transaction = %key, matched = write.is_some(), suggested = suggestion.is_some(), "Outcome saved");
            return Ok(());
        }
        if guarded && self.exists(key).await? {
            Err(StoreError::ConfirmedConflict(key.clone()))
        } else {
            Err(StoreError::NotFound(key.to_string()))
        }
    }

    async fn assign_account(&self, key: &TransactionKey, account_code: &str) -> Result<(), StoreError> {
        let affected = sqlx::query("UPDATE transactions SET assigned_account = ? WHERE source = ? AND id = ?")
            .bind(account_code)
            .bind(key.source.as_str())
            .bind(&key.id)
            .execute(&self.pool)
            .await
            .map_err(unavailable)?
            .rows_affected();
        Self::require_row(affected, key)
    }
}
