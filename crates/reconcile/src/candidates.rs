use std::cmp::Ordering;
use std::collections::BTreeMap;

use concordia_core::{
    Candidate, ConfidenceLevel, ConfigError, DateRange, Document, MatchMethod, ReconcileConfig,
    Transaction,
};

use rust_decimal::Decimal;

use crate::extract::{ExtractedIdentifier, ReferenceExtractor};
use crate::scorer::AmountDateScorer;

/// Ranked candidates for one transaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateSet {
    pub candidates: Vec<Candidate>,
    /// More than one distinct document was hit by the exact tiers.
    pub ambiguous: bool,
}

impl CandidateSet {
    pub fn best(&self) -> Option<&Candidate> {
        self.candidates.first()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Runs the exact-identifier tiers and, only when those find nothing, the
/// amount/date tier.
#[derive(Debug, Clone)]
pub struct CandidateGenerator {
    extractor: ReferenceExtractor,
    scorer: AmountDateScorer,
    config: ReconcileConfig,
}

impl CandidateGenerator {
    pub fn new(config: &ReconcileConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            extractor: ReferenceExtractor::with_extra_patterns(&config.extra_identifier_patterns)?,
            scorer: AmountDateScorer::new(config),
            config: config.clone(),
        })
    }

    pub fn scorer(&self) -> &AmountDateScorer {
        &self.scorer
    }

    pub fn identifiers(&self, txn: &Transaction) -> Vec<ExtractedIdentifier> {
        self.extractor.extract(&txn.free_text)
    }

    /// Date window the amount/date tier searches for this transaction.
    pub fn window(&self, txn: &Transaction) -> DateRange {
        DateRange::around(txn.occurred_at, self.config.date_window_for(txn.source))
    }

    /// `documents` may be the full document set or any superset of the hits
    /// and the window; the tiers filter on their own.
    pub fn generate(&self, txn: &Transaction, documents: &[Document]) -> CandidateSet {
        let identifiers = self.identifiers(txn);
        let mut candidates = self.exact_tier(txn, &identifiers, documents);
        let ambiguous = candidates.len() > 1;

        if candidates.is_empty() {
            candidates = self.amount_date_tier(txn, documents);
        }

        candidates.sort_by(rank);
        candidates.truncate(self.config.max_candidates_per_transaction);
        CandidateSet { candidates, ambiguous }
    }

    fn exact_tier(
        &self,
        txn: &Transaction,
        identifiers: &[ExtractedIdentifier],
        documents: &[Document],
    ) -> Vec<Candidate> {
        // One candidate per document; the highest-priority identifier wins.
        let mut hits: BTreeMap<&str, (&Document, &ExtractedIdentifier)> = BTreeMap::new();
        for id in identifiers {
            for doc in documents.iter().filter(|d| d.references(&id.value)) {
                hits.entry(doc.id.as_str())
                    .and_modify(|hit| {
                        if id.priority > hit.1.priority {
                            hit.1 = id;
                        }
                    })
                    .or_insert((doc, id));
            }
        }

        hits.into_values()
            .map(|(doc, id)| {
                let score = self
                    .scorer
                    .score(txn.amount, doc.gross_amount, txn.occurred_at, doc.issued_at);
                let partial = self.scorer.partial_payment(txn.amount, doc.gross_amount);
                let mut reason = format!("{} {} found in free text", id.kind, id.value);
                if let Some(pct) = partial {
                    reason.push_str(&format!(", partial payment of {}%", percent(pct)));
                }
                Candidate {
                    document_id: doc.id.clone(),
                    document_number: doc.document_number.clone(),
                    confidence: ConfidenceLevel::High,
                    score,
                    method: MatchMethod::Identifier(id.kind),
                    reason,
                    amount_delta: txn.amount.abs().delta(doc.gross_amount),
                    is_partial_payment: partial.is_some(),
                    partial_percentage: partial,
                }
            })
            .collect()
    }

    fn amount_date_tier(&self, txn: &Transaction, documents: &[Document]) -> Vec<Candidate> {
        let window = self.window(txn);
        documents
            .iter()
            .filter(|doc| window.contains(doc.issued_at))
            .filter_map(|doc| {
                let a = self
                    .scorer
                    .assess(txn.amount, doc.gross_amount, txn.occurred_at, doc.issued_at)?;
                let reason = match a.partial_percentage {
                    Some(pct) => format!(
                        "partial payment of {}% of {}, {} day(s) apart",
                        percent(pct),
                        doc.gross_amount,
                        a.days_apart
                    ),
                    None => format!(
                        "amount off by {}, {} day(s) apart",
                        a.amount_delta, a.days_apart
                    ),
                };
                Some(Candidate {
                    document_id: doc.id.clone(),
                    document_number: doc.document_number.clone(),
                    confidence: a.confidence,
                    score: a.score,
                    method: MatchMethod::AmountDate,
                    reason,
                    amount_delta: a.amount_delta,
                    is_partial_payment: a.partial_percentage.is_some(),
                    partial_percentage: a.partial_percentage,
                })
            })
            .collect()
    }
}

fn percent(ratio: Decimal) -> Decimal {
    (ratio * Decimal::ONE_HUNDRED).round_dp(1).normalize()
}

/// `(confidence desc, score asc, amount delta asc, document id asc)`.
pub fn rank(a: &Candidate, b: &Candidate) -> Ordering {
    b.confidence
        .cmp(&a.confidence)
        .then(a.score.total_cmp(&b.score))
        .then(a.amount_delta.cmp(&b.amount_delta))
        .then_with(|| a.document_id.cmp(&b.document_id))
}
