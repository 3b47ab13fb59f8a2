use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::money::Money;
use crate::transaction::TransactionKey;

/// Coarse trust bucket. Ordered so that `High > Medium > Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            ConfidenceLevel::Low => "low",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::High => "high",
        }
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ConfidenceLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(ConfidenceLevel::Low),
            "medium" => Ok(ConfidenceLevel::Medium),
            "high" => Ok(ConfidenceLevel::High),
            other => Err(format!("Unknown confidence level: '{other}'")),
        }
    }
}

/// Kinds of document identifier that can appear in free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
    InternalOrderNumber,
    InvoiceNumber,
    MarketplaceOrderId,
}

impl IdentifierKind {
    pub const ALL: [IdentifierKind; 3] = [
        IdentifierKind::InternalOrderNumber,
        IdentifierKind::InvoiceNumber,
        IdentifierKind::MarketplaceOrderId,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            IdentifierKind::InternalOrderNumber => "internal_order_number",
            IdentifierKind::InvoiceNumber => "invoice_number",
            IdentifierKind::MarketplaceOrderId => "marketplace_order_id",
        }
    }
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which strategy produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    Identifier(IdentifierKind),
    AmountDate,
    Manual,
    None,
}

impl MatchMethod {
    pub fn is_exact_identifier(self) -> bool {
        matches!(self, MatchMethod::Identifier(_))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MatchMethod::Identifier(kind) => kind.as_str(),
            MatchMethod::AmountDate => "amount_date",
            MatchMethod::Manual => "manual",
            MatchMethod::None => "none",
        }
    }
}

impl fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MatchMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "amount_date" => Ok(MatchMethod::AmountDate),
            "manual" => Ok(MatchMethod::Manual),
            "none" => Ok(MatchMethod::None),
            other => IdentifierKind::ALL
                .into_iter()
                .find(|k| k.as_str() == other)
                .map(MatchMethod::Identifier)
                .ok_or_else(|| format!("Unknown match method: '{other}'")),
        }
    }
}

/// One ranked candidate document for a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub document_id: String,
    pub document_number: String,
    pub confidence: ConfidenceLevel,
    /// Lower is closer. Only comparable within one strategy.
    pub score: f64,
    pub method: MatchMethod,
    pub reason: String,
    pub amount_delta: Money,
    pub is_partial_payment: bool,
    pub partial_percentage: Option<Decimal>,
}

/// The active association of a transaction to the document it pays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub transaction: TransactionKey,
    pub document_id: Option<String>,
    pub confidence: ConfidenceLevel,
    pub score: f64,
    pub method: MatchMethod,
    pub reason: String,
    pub is_partial_payment: bool,
    pub partial_percentage: Option<Decimal>,
    /// Confirmed matches are only ever replaced by a manual override.
    pub confirmed: bool,
}

impl MatchResult {
    pub fn from_candidate(transaction: TransactionKey, candidate: &Candidate, confirmed: bool) -> Self {
        MatchResult {
            transaction,
            document_id: Some(candidate.document_id.clone()),
            confidence: candidate.confidence,
            score: candidate.score,
            method: candidate.method,
            reason: candidate.reason.clone(),
            is_partial_payment: candidate.is_partial_payment,
            partial_percentage: candidate.partial_percentage,
            confirmed,
        }
    }

    /// Same document, method and confidence. Score and reason text are
    /// derived and may be recomputed.
    pub fn same_decision(&self, other: &MatchResult) -> bool {
        self.document_id == other.document_id
            && self.method == other.method
            && self.confidence == other.confidence
            && self.confirmed == other.confirmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn confidence_ordering() {
        assert!(ConfidenceLevel::High > ConfidenceLevel::Medium);
        assert!(ConfidenceLevel::Medium > ConfidenceLevel::Low);
    }

    #[test]
    fn confidence_parse() {
        assert_eq!(ConfidenceLevel::from_str("HIGH").unwrap(), ConfidenceLevel::High);
        assert!(ConfidenceLevel::from_str("certain").is_err());
    }

    #[test]
    fn match_method_roundtrip() {
        let methods = [
            MatchMethod::Identifier(IdentifierKind::InvoiceNumber),
            MatchMethod::Identifier(IdentifierKind::MarketplaceOrderId),
            MatchMethod::AmountDate,
            MatchMethod::Manual,
            MatchMethod::None,
        ];
        for m in methods {
            assert_eq!(MatchMethod::from_str(m.as_str()).unwrap(), m);
        }
    }

    #[test]
    fn only_identifier_methods_are_exact() {
        assert!(MatchMethod::Identifier(IdentifierKind::InternalOrderNumber).is_exact_identifier());
        assert!(!MatchMethod::AmountDate.is_exact_identifier());
        assert!(!MatchMethod::Manual.is_exact_identifier());
    }
}
