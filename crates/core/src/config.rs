use rust_decimal::prelude::dec;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::matching::{ConfidenceLevel, IdentifierKind};
use crate::money::Money;
use crate::transaction::Source;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Weights and thresholds for the amount/date closeness score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    /// Score per currency unit of amount deviation.
    pub amount_delta_weight: f64,
    /// Score per day between transaction and document dates.
    pub date_delta_weight: f64,
    /// Scores strictly below this are `high`.
    pub high_threshold: f64,
    /// Scores strictly below this (and not high) are `medium`.
    pub medium_threshold: f64,
    /// Candidates scoring above this are discarded unless partial.
    pub max_score: f64,
    /// Replaces the amount component for partial payments. Never below
    /// `high_threshold`, so partials cannot come out `high`.
    pub partial_payment_penalty: f64,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            amount_delta_weight: 1.0,
            date_delta_weight: 0.5,
            high_threshold: 1.0,
            medium_threshold: 5.0,
            max_score: 10.0,
            partial_payment_penalty: 2.0,
        }
    }
}

/// Extra identifier pattern registered on top of the built-in ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentifierPatternConfig {
    pub kind: IdentifierKind,
    pub pattern: String,
    #[serde(default)]
    pub priority: i32,
}

/// A known payee and the account its payments usually book to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payee {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub account_code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestionConfig {
    /// Minimum normalized similarity for a fuzzy payee hit.
    pub vendor_fuzzy_threshold: f32,
    pub payees: Vec<Payee>,
}

impl Default for SuggestionConfig {
    fn default() -> Self {
        Self {
            vendor_fuzzy_threshold: 0.85,
            payees: Vec::new(),
        }
    }
}

/// Widest accepted date window, about ten years either side.
pub const MAX_DATE_WINDOW_DAYS: i64 = 3660;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    pub default_date_window_days: i64,
    #[serde(with = "source_map")]
    pub date_window_days: BTreeMap<Source, i64>,
    pub amount_tolerance_absolute: Money,
    pub auto_accept_confidence: ConfidenceLevel,
    pub partial_payment_band_min: Decimal,
    pub partial_payment_band_max: Decimal,
    pub max_candidates_per_transaction: usize,
    pub max_workers: usize,
    pub scorer: ScorerConfig,
    pub extra_identifier_patterns: Vec<IdentifierPatternConfig>,
    pub suggestion: SuggestionConfig,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        let date_window_days = BTreeMap::from([
            (Source::BankA, 3),
            (Source::BankB, 3),
            (Source::ProcessorX, 1),
            (Source::ProcessorY, 1),
            (Source::MarketplaceZ, 2),
        ]);
        Self {
            default_date_window_days: 3,
            date_window_days,
            amount_tolerance_absolute: Money::from_cents(500),
            auto_accept_confidence: ConfidenceLevel::High,
            partial_payment_band_min: dec!(0.05),
            partial_payment_band_max: dec!(0.95),
            max_candidates_per_transaction: 3,
            max_workers: 4,
            scorer: ScorerConfig::default(),
            extra_identifier_patterns: Vec::new(),
            suggestion: SuggestionConfig::default(),
        }
    }
}

impl ReconcileConfig {
    pub fn from_toml(toml_content: &str) -> Result<Self, ConfigError> {
        let config: ReconcileConfig = toml::from_str(toml_content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn date_window_for(&self, source: Source) -> i64 {
        self.date_window_days
            .get(&source)
            .copied()
            .unwrap_or(self.default_date_window_days)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        let windows = || std::iter::once(&self.default_date_window_days).chain(self.date_window_days.values());
        if windows().any(|d| *d < 0) {
            return invalid("date windows must not be negative");
        }
        if windows().any(|d| *d > MAX_DATE_WINDOW_DAYS) {
            return invalid(&format!("date windows must not exceed {MAX_DATE_WINDOW_DAYS} days"));
        }
        if self.amount_tolerance_absolute.is_outflow() {
            return invalid("amount_tolerance_absolute must not be negative");
        }
        let (min, max) = (self.partial_payment_band_min, self.partial_payment_band_max);
        if min <= Decimal::ZERO || max >= Decimal::ONE || min > max {
            return invalid("partial payment band must satisfy 0 < min <= max < 1");
        }
        if self.max_candidates_per_transaction == 0 {
            return invalid("max_candidates_per_transaction must be at least 1");
        }
        if self.max_workers == 0 {
            return invalid("max_workers must be at least 1");
        }
        let s = &self.scorer;
        if s.amount_delta_weight < 0.0 || s.date_delta_weight < 0.0 {
            return invalid("scorer weights must not be negative");
        }
        if !(0.0 < s.high_threshold && s.high_threshold <= s.medium_threshold) {
            return invalid("scorer thresholds must satisfy 0 < high <= medium");
        }
        if s.partial_payment_penalty < s.high_threshold {
            return invalid("partial_payment_penalty must be at least high_threshold");
        }
        if !(0.0..=1.0).contains(&self.suggestion.vendor_fuzzy_threshold) {
            return invalid("vendor_fuzzy_threshold must be within 0..=1");
        }
        Ok(())
    }
}

/// TOML keys are plain strings, so per-source tables go through `Source::from_str`.
mod source_map {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    use crate::transaction::Source;

    pub fn serialize<S: Serializer>(map: &BTreeMap<Source, i64>, ser: S) -> Result<S::Ok, S::Error> {
        map.iter()
            .map(|(src, days)| (src.as_str(), *days))
            .collect::<BTreeMap<_, _>>()
            .serialize(ser)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<BTreeMap<Source, i64>, D::Error> {
        BTreeMap::<String, i64>::deserialize(de)?
            .into_iter()
            .map(|(key, days)| key.parse::<Source>().map(|src| (src, days)).map_err(D::Error::custom))
            .collect()
    }
}
