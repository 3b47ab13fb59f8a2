use chrono::NaiveDate;
use concordia_core::{
    Candidate, ConfidenceLevel, MatchMethod, MatchResult, MatchWrite, Money, PersistenceGuard,
    Transaction, TransactionKey,
};
use serde::Serialize;

use crate::candidates::CandidateSet;

/// The resulting state of one transaction after selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchOutcome {
    /// Carries a confirmed match, either written now or already present.
    Confirmed,
    /// Carries an automatic match a human may still override.
    Provisional,
    /// Best candidate handed to a human; transaction not mutated.
    Review,
    Unmatched,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewReason {
    MediumConfidence,
    LowConfidence,
    NoCandidate,
    /// Several documents were named by identifiers in the text.
    AmbiguousIdentifier,
}

/// One entry of the review queue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewItem {
    pub transaction: TransactionKey,
    pub amount: Money,
    pub occurred_at: NaiveDate,
    pub free_text: String,
    /// `none` when nothing could be proposed.
    pub method: MatchMethod,
    pub candidates: Vec<Candidate>,
    pub reasons: Vec<ReviewReason>,
}

impl ReviewItem {
    fn new(txn: &Transaction, set: &CandidateSet, method: MatchMethod, reasons: Vec<ReviewReason>) -> Self {
        ReviewItem {
            transaction: txn.key(),
            amount: txn.amount,
            occurred_at: txn.occurred_at,
            free_text: txn.free_text.clone(),
            method,
            candidates: set.candidates.clone(),
            reasons,
        }
    }
}

/// What the selector decided for one transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub outcome: MatchOutcome,
    /// Method and confidence of the resulting state, for tallying.
    pub method: MatchMethod,
    pub confidence: Option<ConfidenceLevel>,
    /// `None` when nothing needs to be written.
    pub write: Option<MatchWrite>,
    pub review: Option<ReviewItem>,
}

impl Selection {
    fn settled(outcome: MatchOutcome, m: &MatchResult) -> Self {
        Selection {
            outcome,
            method: m.method,
            confidence: Some(m.confidence),
            write: None,
            review: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MatchSelector {
    auto_accept: ConfidenceLevel,
    guard: PersistenceGuard,
}

impl MatchSelector {
    pub fn new(auto_accept: ConfidenceLevel) -> Self {
        Self {
            auto_accept,
            guard: PersistenceGuard,
        }
    }

    pub fn select(&self, txn: &Transaction, set: &CandidateSet) -> Selection {
        if let Some(current) = txn.active_match.as_ref().filter(|m| m.confirmed) {
            return Selection::settled(MatchOutcome::Confirmed, current);
        }

        match set.best() {
            Some(best) if best.confidence >= self.auto_accept => self.accept(txn, set, best),
            Some(best) if best.confidence == ConfidenceLevel::Medium => Selection {
                outcome: MatchOutcome::Review,
                method: best.method,
                confidence: Some(best.confidence),
                write: None,
                review: Some(ReviewItem::new(
                    txn,
                    set,
                    best.method,
                    vec![ReviewReason::MediumConfidence],
                )),
            },
            best => {
                let reason = match best {
                    Some(_) => ReviewReason::LowConfidence,
                    None => ReviewReason::NoCandidate,
                };
                Selection {
                    outcome: MatchOutcome::Unmatched,
                    method: MatchMethod::None,
                    confidence: best.map(|b| b.confidence),
                    write: None,
                    review: Some(ReviewItem::new(txn, set, MatchMethod::None, vec![reason])),
                }
            }
        }
    }

    /// Exact-identifier hits are confirmed unless several documents were
    /// named; amount/date hits stay provisional.
    fn accept(&self, txn: &Transaction, set: &CandidateSet, best: &Candidate) -> Selection {
        let confirmed = best.method.is_exact_identifier() && !set.ambiguous;
        let result = MatchResult::from_candidate(txn.key(), best, confirmed);
        let outcome = if confirmed {
            MatchOutcome::Confirmed
        } else {
            MatchOutcome::Provisional
        };

        let unchanged = txn.active_match.as_ref() == Some(&result);
        let write = if unchanged {
            None
        } else {
            self.guard.admit(txn, result.clone())
        };
        let review = set.ambiguous.then(|| {
            ReviewItem::new(txn, set, best.method, vec![ReviewReason::AmbiguousIdentifier])
        });

        Selection {
            outcome,
            method: result.method,
            confidence: Some(result.confidence),
            write,
            review,
        }
    }
}
