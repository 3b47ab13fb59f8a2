use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::account::AccountSuggestion;
use crate::matching::MatchResult;
use crate::money::Money;

/// Where a transaction was ingested from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Source {
    BankA,
    BankB,
    ProcessorX,
    ProcessorY,
    MarketplaceZ,
}

impl Source {
    pub const ALL: [Source; 5] = [
        Source::BankA,
        Source::BankB,
        Source::ProcessorX,
        Source::ProcessorY,
        Source::MarketplaceZ,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Source::BankA => "bank-a",
            Source::BankB => "bank-b",
            Source::ProcessorX => "processor-x",
            Source::ProcessorY => "processor-y",
            Source::MarketplaceZ => "marketplace-z",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Source::ALL
            .into_iter()
            .find(|src| src.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown source: '{s}'"))
    }
}

/// Globally unique transaction identity: the source-stable id is only
/// unique within its source.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransactionKey {
    pub source: Source,
    pub id: String,
}

impl TransactionKey {
    pub fn new(source: Source, id: impl Into<String>) -> Self {
        Self { source, id: id.into() }
    }
}

impl fmt::Display for TransactionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counterparty {
    pub name: String,
    pub iban: Option<String>,
}

impl Counterparty {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), iban: None }
    }
}

/// The canonical transaction every source record is mapped into.
///
/// The ingested fields never change after the first upsert. The match and
/// account fields are written by the store on behalf of the selector and
/// the suggestion engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub source: Source,
    pub amount: Money,
    pub currency: String,
    pub occurred_at: NaiveDate,
    pub free_text: String,
    pub counterparty: Counterparty,
    pub category: Option<String>,
    pub ingested_at: Option<DateTime<Utc>>,
    pub active_match: Option<MatchResult>,
    pub suggestion: Option<AccountSuggestion>,
    pub assigned_account: Option<String>,
}

impl Transaction {
    pub fn new(
        source: Source,
        id: impl Into<String>,
        amount: Money,
        occurred_at: NaiveDate,
        free_text: impl Into<String>,
    ) -> Self {
        Transaction {
            id: id.into(),
            source,
            amount,
            currency: "EUR".to_string(),
            occurred_at,
            free_text: free_text.into(),
            counterparty: Counterparty::default(),
            category: None,
            ingested_at: None,
            active_match: None,
            suggestion: None,
            assigned_account: None,
        }
    }

    pub fn with_counterparty(mut self, counterparty: Counterparty) -> Self {
        self.counterparty = counterparty;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn key(&self) -> TransactionKey {
        TransactionKey::new(self.source, self.id.clone())
    }

    pub fn is_match_confirmed(&self) -> bool {
        self.active_match.as_ref().is_some_and(|m| m.confirmed)
    }

    /// Free text and counterparty name, the haystack for keyword and rule matching.
    pub fn search_text(&self) -> String {
        if self.counterparty.name.is_empty() {
            self.free_text.clone()
        } else {
            format!("{} {}", self.counterparty.name, self.free_text)
        }
    }

    /// Whether `other` carries the same ingested payload. Match and account
    /// fields are ignored.
    pub fn same_payload(&self, other: &Transaction) -> bool {
        self.id == other.id
            && self.source == other.source
            && self.amount == other.amount
            && self.currency == other.currency
            && self.occurred_at == other.occurred_at
            && self.free_text == other.free_text
            && self.counterparty == other.counterparty
            && self.category == other.category
    }
}
