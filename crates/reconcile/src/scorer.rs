use chrono::NaiveDate;
use concordia_core::{days_between, ConfidenceLevel, Money, ReconcileConfig, ScorerConfig};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Outcome of comparing one transaction against one document.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub score: f64,
    pub confidence: ConfidenceLevel,
    /// `| |txn| - doc |`
    pub amount_delta: Money,
    pub days_apart: i64,
    /// `|txn| / doc` when the payment is partial.
    pub partial_percentage: Option<Decimal>,
}

impl Assessment {
    pub fn is_partial_payment(&self) -> bool {
        self.partial_percentage.is_some()
    }
}

/// Weighted amount/date closeness. Lower is better; an exact amount on the
/// same day scores zero.
///
/// Amounts are compared by magnitude so that outgoing payments against
/// supplier documents score the same way as incoming ones.
#[derive(Debug, Clone)]
pub struct AmountDateScorer {
    weights: ScorerConfig,
    tolerance: Money,
    band_min: Decimal,
    band_max: Decimal,
}

impl AmountDateScorer {
    pub fn new(config: &ReconcileConfig) -> Self {
        Self {
            weights: config.scorer.clone(),
            tolerance: config.amount_tolerance_absolute,
            band_min: config.partial_payment_band_min,
            band_max: config.partial_payment_band_max,
        }
    }

    pub fn score(&self, txn_amount: Money, doc_amount: Money, txn_date: NaiveDate, doc_date: NaiveDate) -> f64 {
        let delta = txn_amount.abs().delta(doc_amount);
        self.weights.amount_delta_weight * to_f64(delta)
            + self.weights.date_delta_weight * days_between(txn_date, doc_date) as f64
    }

    pub fn confidence_for(&self, score: f64) -> ConfidenceLevel {
        if score < self.weights.high_threshold {
            ConfidenceLevel::High
        } else if score < self.weights.medium_threshold {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }

    /// `Some(|txn| / doc)` when `0 < |txn| < doc` and the ratio lies within
    /// the configured band, bounds inclusive.
    pub fn partial_payment(&self, txn_amount: Money, doc_amount: Money) -> Option<Decimal> {
        let paid = txn_amount.abs();
        if paid.is_zero() || paid >= doc_amount {
            return None;
        }
        let ratio = paid.ratio_of(doc_amount)?;
        (ratio >= self.band_min && ratio <= self.band_max).then_some(ratio)
    }

    /// Score and bucket a pair, or `None` when it fails the amount
    /// tolerance or the score cutoff.
    ///
    /// A partial payment bypasses the amount tolerance: its amount term is
    /// replaced by the partial penalty, which keeps it at `medium` or below.
    pub fn assess(
        &self,
        txn_amount: Money,
        doc_amount: Money,
        txn_date: NaiveDate,
        doc_date: NaiveDate,
    ) -> Option<Assessment> {
        let amount_delta = txn_amount.abs().delta(doc_amount);
        let days_apart = days_between(txn_date, doc_date);
        let date_term = self.weights.date_delta_weight * days_apart as f64;
        let partial_percentage = self.partial_payment(txn_amount, doc_amount);

        let score = match partial_percentage {
            Some(_) => self.weights.partial_payment_penalty + date_term,
            None if amount_delta > self.tolerance => return None,
            None => self.weights.amount_delta_weight * to_f64(amount_delta) + date_term,
        };
        if score > self.weights.max_score {
            return None;
        }

        let mut confidence = self.confidence_for(score);
        if partial_percentage.is_some() {
            confidence = confidence.min(ConfidenceLevel::Medium);
        }

        Some(Assessment {
            score,
            confidence,
            amount_delta,
            days_apart,
            partial_percentage,
        })
    }
}

fn to_f64(m: Money) -> f64 {
    m.as_decimal().to_f64().unwrap_or(f64::MAX)
}
