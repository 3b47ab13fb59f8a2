//! Ledger-account suggestions, independent of document matching.
//!
//! The cascade is an ordered list of [`SuggestionStrategy`] objects; the
//! first one that produces a suggestion wins.

use std::sync::Arc;

use async_trait::async_trait;
use concordia_core::{
    AccountSuggestion, LearnedRule, LearningStore, Payee, ReconcileConfig, Source, StoreError,
    SuggestionMethod, Transaction,
};
use tracing::debug;

use crate::learning::CompiledRule;
use crate::util::{normalize, similarity};

pub const CATEGORY_CONFIDENCE: f32 = 0.95;
pub const KEYWORD_CONFIDENCE: f32 = 0.8;
pub const VENDOR_CONFIDENCE: f32 = 0.7;

#[async_trait]
pub trait SuggestionStrategy: Send + Sync {
    fn method(&self) -> SuggestionMethod;

    async fn attempt(&self, txn: &Transaction) -> Result<Option<AccountSuggestion>, StoreError>;
}

// ── Category table ───────────────────────────────────────────────────────────

/// Source-provided fee and movement types and the account they book to.
pub const CATEGORY_ACCOUNTS: &[(Source, &str, &str)] = &[
    (Source::ProcessorX, "fee", "4970"),
    (Source::ProcessorX, "dispute_fee", "4970"),
    (Source::ProcessorX, "charge", "1360"),
    (Source::ProcessorX, "payout", "1360"),
    (Source::ProcessorY, "transaction_fee", "4970"),
    (Source::ProcessorY, "currency_conversion", "4970"),
    (Source::ProcessorY, "payment_received", "1360"),
    (Source::ProcessorY, "withdrawal", "1360"),
    (Source::MarketplaceZ, "commission", "4970"),
    (Source::MarketplaceZ, "shipping_fee", "4910"),
    (Source::MarketplaceZ, "advertising", "4600"),
    (Source::MarketplaceZ, "principal", "8400"),
];

pub struct CategoryStrategy {
    table: &'static [(Source, &'static str, &'static str)],
}

impl Default for CategoryStrategy {
    fn default() -> Self {
        Self { table: CATEGORY_ACCOUNTS }
    }
}

#[async_trait]
impl SuggestionStrategy for CategoryStrategy {
    fn method(&self) -> SuggestionMethod {
        SuggestionMethod::Category
    }

    async fn attempt(&self, txn: &Transaction) -> Result<Option<AccountSuggestion>, StoreError> {
        let Some(category) = txn.category.as_deref() else {
            return Ok(None);
        };
        let category = category.trim().to_lowercase();
        Ok(self
            .table
            .iter()
            .find(|(source, cat, _)| *source == txn.source && *cat == category)
            .map(|(_, cat, code)| {
                AccountSuggestion::new(
                    txn.key(),
                    code,
                    CATEGORY_CONFIDENCE,
                    SuggestionMethod::Category,
                    format!("{} category '{cat}'", txn.source),
                )
            }))
    }
}

// ── Static keyword table ─────────────────────────────────────────────────────

pub struct KeywordSet {
    pub name: &'static str,
    pub keywords: &'static [&'static str],
    pub account_code: &'static str,
}

/// Ordered; the first set with a keyword in the transaction text wins.
pub const KEYWORD_SETS: &[KeywordSet] = &[
    KeywordSet {
        name: "telecom",
        keywords: &["telekom", "vodafone", "telefonica", "mobilfunk", "telefon"],
        account_code: "4920",
    },
    KeywordSet {
        name: "internet",
        keywords: &["internet", "dsl", "glasfaser", "hosting", "domain"],
        account_code: "4925",
    },
    KeywordSet {
        name: "rent",
        keywords: &["miete", "pacht"],
        account_code: "4210",
    },
    KeywordSet {
        name: "energy",
        keywords: &["strom", "energie", "wasser", "fernwärme", "fernwaerme"],
        account_code: "4240",
    },
    KeywordSet {
        name: "insurance",
        keywords: &["versicherung", "allianz", "haftpflicht"],
        account_code: "4360",
    },
    KeywordSet {
        name: "postage",
        keywords: &["porto", "deutsche post", "dhl", "briefmarke"],
        account_code: "4910",
    },
    KeywordSet {
        name: "bank fees",
        keywords: &["kontoführung", "kontofuehrung", "kontoentgelt"],
        account_code: "4970",
    },
    KeywordSet {
        name: "software",
        keywords: &["github", "adobe", "microsoft", "atlassian", "jetbrains"],
        account_code: "4964",
    },
    KeywordSet {
        name: "vehicle",
        keywords: &["tankstelle"],
        account_code: "4500",
    },
];

pub struct KeywordStrategy {
    sets: &'static [KeywordSet],
}

impl Default for KeywordStrategy {
    fn default() -> Self {
        Self { sets: KEYWORD_SETS }
    }
}

#[async_trait]
impl SuggestionStrategy for KeywordStrategy {
    fn method(&self) -> SuggestionMethod {
        SuggestionMethod::Static
    }

    async fn attempt(&self, txn: &Transaction) -> Result<Option<AccountSuggestion>, StoreError> {
        let text = txn.search_text().to_lowercase();
        Ok(self.sets.iter().find_map(|set| {
            let keyword = set.keywords.iter().find(|k| text.contains(*k))?;
            Some(AccountSuggestion::new(
                txn.key(),
                set.account_code,
                KEYWORD_CONFIDENCE,
                SuggestionMethod::Static,
                format!("keyword '{keyword}' ({})", set.name),
            ))
        }))
    }
}

// ── Learned rules ────────────────────────────────────────────────────────────

pub struct LearnedRuleStrategy<L: ?Sized> {
    store: Arc<L>,
}

impl<L: LearningStore + ?Sized> LearnedRuleStrategy<L> {
    pub fn new(store: Arc<L>) -> Self {
        Self { store }
    }
}

/// Highest confidence, then most used, then pattern order.
fn best_rule<'a>(rules: impl Iterator<Item = &'a LearnedRule>) -> Option<&'a LearnedRule> {
    rules.min_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then(b.usage_count.cmp(&a.usage_count))
            .then_with(|| a.pattern.cmp(&b.pattern))
    })
}

#[async_trait]
impl<L: LearningStore + ?Sized> SuggestionStrategy for LearnedRuleStrategy<L> {
    fn method(&self) -> SuggestionMethod {
        SuggestionMethod::Learned
    }

    async fn attempt(&self, txn: &Transaction) -> Result<Option<AccountSuggestion>, StoreError> {
        let rules = self.store.active_rules().await?;
        let compiled: Vec<CompiledRule> = rules.into_iter().map(CompiledRule::new).collect();
        let matching = compiled.iter().filter(|c| c.matches(txn)).map(|c| &c.rule);
        let Some(rule) = best_rule(matching) else {
            return Ok(None);
        };

        // Matching is read-only; the pipeline counts the use once the
        // suggestion is stored.
        Ok(Some(
            AccountSuggestion::new(
                txn.key(),
                &rule.account_code,
                rule.confidence,
                SuggestionMethod::Learned,
                format!("learned rule '{}' (used {} times)", rule.pattern, rule.usage_count),
            )
            .with_rule(&rule.pattern),
        ))
    }
}

// ── Payee registry ───────────────────────────────────────────────────────────

pub struct VendorStrategy {
    payees: Vec<Payee>,
    threshold: f32,
}

impl VendorStrategy {
    pub fn new(payees: Vec<Payee>, threshold: f32) -> Self {
        Self { payees, threshold }
    }
}

#[async_trait]
impl SuggestionStrategy for VendorStrategy {
    fn method(&self) -> SuggestionMethod {
        SuggestionMethod::Vendor
    }

    async fn attempt(&self, txn: &Transaction) -> Result<Option<AccountSuggestion>, StoreError> {
        let name = normalize(&txn.counterparty.name);
        if name.is_empty() {
            return Ok(None);
        }

        let mut best: Option<(&Payee, f32)> = None;
        for payee in &self.payees {
            let score = std::iter::once(&payee.name)
                .chain(payee.aliases.iter())
                .map(|candidate| similarity(&name, candidate))
                .fold(0.0_f32, f32::max);
            if score >= self.threshold && best.map_or(true, |(_, s)| score > s) {
                best = Some((payee, score));
            }
        }

        Ok(best.map(|(payee, score)| {
            let reason = if score >= 1.0 {
                format!("known payee '{}'", payee.name)
            } else {
                format!("payee '{}' ({:.0}% similar)", payee.name, score * 100.0)
            };
            AccountSuggestion::new(
                txn.key(),
                &payee.account_code,
                VENDOR_CONFIDENCE * score,
                SuggestionMethod::Vendor,
                reason,
            )
        }))
    }
}

// ── Engine ───────────────────────────────────────────────────────────────────

pub struct AccountSuggestionEngine {
    strategies: Vec<Box<dyn SuggestionStrategy>>,
}

impl AccountSuggestionEngine {
    pub fn new(strategies: Vec<Box<dyn SuggestionStrategy>>) -> Self {
        Self { strategies }
    }

    /// Category, static keywords, learned rules, payee registry.
    pub fn standard<L>(config: &ReconcileConfig, learning: Arc<L>) -> Self
    where
        L: LearningStore + 'static,
    {
        Self::new(vec![
            Box::new(CategoryStrategy::default()),
            Box::new(KeywordStrategy::default()),
            Box::new(LearnedRuleStrategy::new(learning)),
            Box::new(VendorStrategy::new(
                config.suggestion.payees.clone(),
                config.suggestion.vendor_fuzzy_threshold,
            )),
        ])
    }

    pub fn methods(&self) -> Vec<SuggestionMethod> {
        self.strategies.iter().map(|s| s.method()).collect()
    }

    /// First hit wins. `None` routes the transaction to manual classification.
    pub async fn suggest(&self, txn: &Transaction) -> Result<Option<AccountSuggestion>, StoreError> {
        for strategy in &self.strategies {
            if let Some(suggestion) = strategy.attempt(txn).await? {
                debug!(
                    transaction = %txn.key(),
                    method = %suggestion.method,
                    account = %suggestion.account_code,
                    "Account suggested"
                );
                return Ok(Some(suggestion));
            }
        }
        Ok(None)
    }
}
