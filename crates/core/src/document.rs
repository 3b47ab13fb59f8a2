use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::money::Money;

/// An outstanding invoice or order awaiting payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub document_number: String,
    pub order_reference: Option<String>,
    pub gross_amount: Money,
    pub issued_at: NaiveDate,
    pub counterparty_name: String,
}

impl Document {
    pub fn new(
        id: impl Into<String>,
        document_number: impl Into<String>,
        gross_amount: Money,
        issued_at: NaiveDate,
    ) -> Self {
        Document {
            id: id.into(),
            document_number: document_number.into(),
            order_reference: None,
            gross_amount,
            issued_at,
            counterparty_name: String::new(),
        }
    }

    pub fn with_order_reference(mut self, reference: impl Into<String>) -> Self {
        self.order_reference = Some(reference.into());
        self
    }

    pub fn with_counterparty(mut self, name: impl Into<String>) -> Self {
        self.counterparty_name = name.into();
        self
    }

    /// Case-insensitive substring test against the document number and the
    /// order reference.
    pub fn references(&self, identifier: &str) -> bool {
        if identifier.is_empty() {
            return false;
        }
        let needle = identifier.to_lowercase();
        self.document_number.to_lowercase().contains(&needle)
            || self
                .order_reference
                .as_deref()
                .is_some_and(|r| r.to_lowercase().contains(&needle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> Document {
        Document::new(
            "D1",
            "RE2025-00042",
            Money::from_cents(11900),
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
        )
        .with_order_reference("AB100231")
    }

    #[test]
    fn references_document_number_case_insensitive() {
        assert!(doc().references("re2025-00042"));
        assert!(doc().references("RE2025-00042"));
    }

    #[test]
    fn references_order_reference() {
        assert!(doc().references("ab100231"));
    }

    #[test]
    fn references_substring() {
        let d = Document::new(
            "D2",
            "Rechnung RE2025-00042 / Teil 1",
            Money::from_cents(100),
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
        );
        assert!(d.references("RE2025-00042"));
    }

    #[test]
    fn empty_identifier_never_matches() {
        assert!(!doc().references(""));
    }

    #[test]
    fn unrelated_identifier() {
        assert!(!doc().references("RE2025-00043"));
    }
}
