use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use concordia_core::{ConfidenceLevel, SuggestionMethod, TransactionKey};
use serde::Serialize;
use uuid::Uuid;

use crate::ingest::MalformedRecord;
use crate::selector::{MatchOutcome, ReviewItem, Selection};

/// A transaction whose processing failed. Nothing was written for it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct TransactionFailure {
    pub transaction: TransactionKey,
    pub error: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    pub confirmed: usize,
    pub provisional: usize,
    pub review: usize,
    pub unmatched: usize,
}

impl OutcomeCounts {
    fn add(&mut self, outcome: MatchOutcome) {
        match outcome {
            MatchOutcome::Confirmed => self.confirmed += 1,
            MatchOutcome::Provisional => self.provisional += 1,
            MatchOutcome::Review => self.review += 1,
            MatchOutcome::Unmatched => self.unmatched += 1,
        }
    }
}

/// Everything about a run that depends only on the data. Counts describe
/// the resulting state of each transaction, so re-running over unchanged
/// data reproduces the same tally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchTally {
    /// Transactions the run was asked to process.
    pub total: usize,
    pub processed: usize,
    pub outcomes: OutcomeCounts,
    /// Keyed by match method name.
    pub methods: BTreeMap<String, usize>,
    pub confidence: BTreeMap<ConfidenceLevel, usize>,
    /// Transactions carrying an account suggestion, by method.
    pub suggestions: BTreeMap<SuggestionMethod, usize>,
    pub review_queue: usize,
    /// Feed records skipped because a required field was missing or invalid.
    pub malformed: usize,
    /// The skipped records, documents first, each in feed order.
    pub malformed_records: Vec<MalformedRecord>,
    pub errors: Vec<TransactionFailure>,
    /// Not started because the run was cancelled.
    pub skipped: usize,
    pub cancelled: bool,
}

impl BatchTally {
    pub fn record(&mut self, selection: &Selection, suggestion: Option<SuggestionMethod>) {
        self.processed += 1;
        self.outcomes.add(selection.outcome);
        *self.methods.entry(selection.method.as_str().to_string()).or_default() += 1;
        if let Some(level) = selection.confidence {
            *self.confidence.entry(level).or_default() += 1;
        }
        if let Some(method) = suggestion {
            *self.suggestions.entry(method).or_default() += 1;
        }
        if selection.review.is_some() {
            self.review_queue += 1;
        }
    }

    pub fn record_failure(&mut self, transaction: TransactionKey, error: impl ToString) {
        self.errors.push(TransactionFailure {
            transaction,
            error: error.to_string(),
        });
    }

    /// Partial success: some transactions failed but the batch completed.
    pub fn is_partial(&self) -> bool {
        !self.errors.is_empty() || self.cancelled
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub tally: BatchTally,
}

/// Summary plus the review queue, ordered by transaction key.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub summary: BatchSummary,
    pub review_queue: Vec<ReviewItem>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use concordia_core::{MatchMethod, Source};

    fn selection(outcome: MatchOutcome, method: MatchMethod, confidence: Option<ConfidenceLevel>) -> Selection {
        Selection {
            outcome,
            method,
            confidence,
            write: None,
            review: None,
        }
    }

    #[test]
    fn counts_by_outcome_method_and_confidence() {
        let mut tally = BatchTally::default();
        tally.record(
            &selection(MatchOutcome::Provisional, MatchMethod::AmountDate, Some(ConfidenceLevel::High)),
            Some(SuggestionMethod::Static),
        );
        tally.record(&selection(MatchOutcome::Unmatched, MatchMethod::None, None), None);

        assert_eq!(tally.processed, 2);
        assert_eq!(tally.outcomes.provisional, 1);
        assert_eq!(tally.outcomes.unmatched, 1);
        assert_eq!(tally.methods["amount_date"], 1);
        assert_eq!(tally.methods["none"], 1);
        assert_eq!(tally.confidence.get(&ConfidenceLevel::High), Some(&1));
        assert_eq!(tally.confidence.len(), 1);
        assert_eq!(tally.suggestions[&SuggestionMethod::Static], 1);
    }

    #[test]
    fn failures_make_the_run_partial() {
        let mut tally = BatchTally::default();
        assert!(!tally.is_partial());
        tally.record_failure(TransactionKey::new(Source::BankA, "T1"), "Store unavailable: down");
        assert!(tally.is_partial());
    }

    #[test]
    fn tally_serializes_with_string_keys() {
        let mut tally = BatchTally::default();
        tally.record(
            &selection(MatchOutcome::Confirmed, MatchMethod::Manual, Some(ConfidenceLevel::High)),
            Some(SuggestionMethod::Learned),
        );
        let json = serde_json::to_value(&tally).unwrap();
        assert_eq!(json["confidence"]["high"], 1);
        assert_eq!(json["suggestions"]["learned"], 1);
        assert_eq!(json["outcomes"]["confirmed"], 1);
    }
}
