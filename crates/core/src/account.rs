use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::transaction::TransactionKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountType {
    Asset,
    Liability,
    Equity,
    Income,
    Expense,
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountType::Asset => write!(f, "Asset"),
            AccountType::Liability => write!(f, "Liability"),
            AccountType::Equity => write!(f, "Equity"),
            AccountType::Income => write!(f, "Income"),
            AccountType::Expense => write!(f, "Expense"),
        }
    }
}

/// Chart of accounts the suggestion tables point into (SKR03 numbering).
pub const DEFAULT_ACCOUNTS: &[(&str, &str, AccountType)] = &[
    ("1200", "Bank", AccountType::Asset),
    ("1360", "Geldtransit", AccountType::Asset),
    ("1400", "Forderungen aus Lieferungen und Leistungen", AccountType::Asset),
    ("1590", "Durchlaufende Posten", AccountType::Liability),
    ("4210", "Miete", AccountType::Expense),
    ("4240", "Gas, Strom, Wasser", AccountType::Expense),
    ("4360", "Versicherungen", AccountType::Expense),
    ("4500", "Fahrzeugkosten", AccountType::Expense),
    ("4600", "Werbekosten", AccountType::Expense),
    ("4910", "Porto", AccountType::Expense),
    ("4920", "Telefon", AccountType::Expense),
    ("4925", "Internetkosten", AccountType::Expense),
    ("4930", "Bürobedarf", AccountType::Expense),
    ("4950", "Rechts- und Beratungskosten", AccountType::Expense),
    ("4964", "Lizenzen und Software", AccountType::Expense),
    ("4970", "Nebenkosten des Geldverkehrs", AccountType::Expense),
    ("8400", "Erlöse 19% USt", AccountType::Income),
];

/// Label for an account code, or the code itself if it is not in the chart.
pub fn account_label(code: &str) -> String {
    DEFAULT_ACCOUNTS
        .iter()
        .find(|(c, _, _)| *c == code)
        .map(|(_, name, _)| name.to_string())
        .unwrap_or_else(|| code.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionMethod {
    Category,
    Static,
    Learned,
    Vendor,
}

impl fmt::Display for SuggestionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuggestionMethod::Category => write!(f, "category"),
            SuggestionMethod::Static => write!(f, "static"),
            SuggestionMethod::Learned => write!(f, "learned"),
            SuggestionMethod::Vendor => write!(f, "vendor"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSuggestion {
    pub transaction: TransactionKey,
    pub account_code: String,
    pub account_label: String,
    /// 0.0–1.0
    pub confidence: f32,
    pub method: SuggestionMethod,
    pub reason: String,
    /// Pattern of the learned rule behind a `learned` suggestion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
}

impl AccountSuggestion {
    pub fn new(
        transaction: TransactionKey,
        account_code: &str,
        confidence: f32,
        method: SuggestionMethod,
        reason: impl Into<String>,
    ) -> Self {
        AccountSuggestion {
            transaction,
            account_code: account_code.to_string(),
            account_label: account_label(account_code),
            confidence: confidence.clamp(0.0, 1.0),
            method,
            reason: reason.into(),
            rule: None,
        }
    }

    pub fn with_rule(mut self, pattern: impl Into<String>) -> Self {
        self.rule = Some(pattern.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleOrigin {
    Manual,
    Auto,
}

impl fmt::Display for RuleOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleOrigin::Manual => write!(f, "manual"),
            RuleOrigin::Auto => write!(f, "auto"),
        }
    }
}

impl std::str::FromStr for RuleOrigin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(RuleOrigin::Manual),
            "auto" => Ok(RuleOrigin::Auto),
            other => Err(format!("Unknown rule origin: '{other}'")),
        }
    }
}

/// How a learned rule's pattern is compared against a transaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub enum RuleMatchType {
    #[default]
    Contains,
    Exact,
    Regex,
    Fuzzy {
        threshold: f32,
    },
}

impl fmt::Display for RuleMatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleMatchType::Contains => write!(f, "contains"),
            RuleMatchType::Exact => write!(f, "exact"),
            RuleMatchType::Regex => write!(f, "regex"),
            RuleMatchType::Fuzzy { threshold } => write!(f, "fuzzy:{threshold}"),
        }
    }
}

impl std::str::FromStr for RuleMatchType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "contains" => Ok(RuleMatchType::Contains),
            "exact" => Ok(RuleMatchType::Exact),
            "regex" => Ok(RuleMatchType::Regex),
            s if s.starts_with("fuzzy:") => {
                let threshold = s[6..]
                    .parse::<f32>()
                    .map_err(|_| "Invalid fuzzy threshold".to_string())?;
                Ok(RuleMatchType::Fuzzy { threshold })
            }
            other => Err(format!("Unknown match type: '{other}'")),
        }
    }
}

/// A pattern-to-account mapping learned from a human decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedRule {
    pub pattern: String,
    pub match_type: RuleMatchType,
    pub account_code: String,
    pub confidence: f32,
    pub usage_count: u32,
    pub origin: RuleOrigin,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// What a confirmation did to the rule keyed by its pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleChange {
    Created,
    Reinforced,
    Corrected,
}

impl LearnedRule {
    pub const INITIAL_CONFIDENCE: f32 = 0.75;
    pub const MAX_CONFIDENCE: f32 = 0.99;
    const CONFIRM_STEP: f32 = 0.2;
    const USE_STEP: f32 = 0.05;

    pub fn new(
        pattern: &str,
        account_code: &str,
        origin: RuleOrigin,
        now: DateTime<Utc>,
    ) -> Self {
        LearnedRule {
            pattern: pattern.to_string(),
            match_type: RuleMatchType::Contains,
            account_code: account_code.to_string(),
            confidence: Self::INITIAL_CONFIDENCE,
            usage_count: 1,
            origin,
            active: true,
            created_at: now,
            last_used_at: Some(now),
        }
    }

    /// Apply a human confirmation for `account_code` to an existing rule.
    /// The same account reinforces it; a different one re-points it and
    /// resets its confidence. Either way the rule is reactivated.
    pub fn confirm(&mut self, account_code: &str, origin: RuleOrigin, now: DateTime<Utc>) -> RuleChange {
        self.usage_count = self.usage_count.saturating_add(1);
        self.last_used_at = Some(now);
        self.active = true;
        if origin == RuleOrigin::Manual {
            self.origin = RuleOrigin::Manual;
        }

        if self.account_code == account_code {
            self.confidence = step_towards_max(self.confidence, Self::CONFIRM_STEP);
            RuleChange::Reinforced
        } else {
            self.account_code = account_code.to_string();
            self.confidence = Self::INITIAL_CONFIDENCE;
            RuleChange::Corrected
        }
    }

    /// Record that the rule produced a suggestion.
    pub fn record_use(&mut self, now: DateTime<Utc>) {
        self.usage_count = self.usage_count.saturating_add(1);
        self.last_used_at = Some(now);
        self.confidence = step_towards_max(self.confidence, Self::USE_STEP);
    }
}

fn step_towards_max(confidence: f32, step: f32) -> f32 {
    (confidence + (1.0 - confidence) * step).min(LearnedRule::MAX_CONFIDENCE)
}
