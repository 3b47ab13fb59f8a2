//! The feedback loop: human account decisions become learned rules.

use chrono::{DateTime, Utc};
use concordia_core::{
    LearnedRule, LearningStore, RuleChange, RuleMatchType, RuleOrigin, StoreError, Transaction,
};
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use tracing::info;

use crate::util::{normalize, similarity};

/// Words taken from the free text when there is no counterparty name.
const FREE_TEXT_PATTERN_WORDS: usize = 3;

/// The pattern a confirmation for `txn` is learned under: the normalized
/// counterparty name, or else the leading digit-free words of the free text.
pub fn pattern_for(txn: &Transaction) -> Option<String> {
    let name = normalize(&txn.counterparty.name);
    if !name.is_empty() {
        return Some(name);
    }
    let words: Vec<&str> = txn
        .free_text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty() && !w.chars().any(|c| c.is_ascii_digit()))
        .take(FREE_TEXT_PATTERN_WORDS)
        .collect();
    let pattern = normalize(&words.join(" "));
    (!pattern.is_empty()).then_some(pattern)
}

/// A rule paired with its precompiled regex (if applicable).
pub struct CompiledRule {
    pub rule: LearnedRule,
    compiled_regex: Option<Regex>,
}

impl CompiledRule {
    pub fn new(rule: LearnedRule) -> Self {
        let compiled_regex = if let RuleMatchType::Regex = &rule.match_type {
            RegexBuilder::new(&rule.pattern).case_insensitive(true).build().ok()
        } else {
            None
        };
        Self { rule, compiled_regex }
    }

    pub fn matches(&self, txn: &Transaction) -> bool {
        let pattern = normalize(&self.rule.pattern);
        if pattern.is_empty() && self.compiled_regex.is_none() {
            return false;
        }
        let text = normalize(&txn.search_text());
        let name = normalize(&txn.counterparty.name);

        match &self.rule.match_type {
            RuleMatchType::Contains => contains_words(&text, &pattern),
            RuleMatchType::Exact => name == pattern || text == pattern,
            RuleMatchType::Regex => self
                .compiled_regex
                .as_ref()
                .is_some_and(|re| re.is_match(&txn.search_text())),
            RuleMatchType::Fuzzy { threshold } => {
                !name.is_empty() && similarity(&name, &pattern) >= *threshold
            }
        }
    }
}

/// Whole-word containment on normalized text, so "post" does not hit "postbank".
fn contains_words(text: &str, pattern: &str) -> bool {
    format!(" {text} ").contains(&format!(" {pattern} "))
}

/// What a confirmation did to the learning store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LearnedOutcome {
    pub change: RuleChange,
    pub rule: LearnedRule,
}

/// Write or update the rule for `txn`'s pattern. `None` when no pattern can
/// be derived from the transaction.
pub async fn learn_from_confirmation<L>(
    store: &L,
    txn: &Transaction,
    account_code: &str,
    origin: RuleOrigin,
    now: DateTime<Utc>,
) -> Result<Option<LearnedOutcome>, StoreError>
where
    L: LearningStore + ?Sized,
{
    let Some(pattern) = pattern_for(txn) else {
        return Ok(None);
    };
    let (change, rule) = store
        .record_confirmation(&pattern, account_code, origin, now)
        .await?;
    info!(
        pattern = %rule.pattern,
        account = %rule.account_code,
        usage = rule.usage_count,
        ?change,
        "Learned rule updated"
    );
    Ok(Some(LearnedOutcome { change, rule }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use concordia_core::{Counterparty, InMemoryLearningStore, Money, Source};

    fn txn(counterparty: &str, text: &str) -> Transaction {
        Transaction::new(
            Source::BankB,
            "T1",
            Money::from_cents(-12000),
            NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            text,
        )
        .with_counterparty(Counterparty::named(counterparty))
    }

    fn rule(pattern: &str, match_type: RuleMatchType) -> CompiledRule {
        let mut r = LearnedRule::new(pattern, "4950", RuleOrigin::Manual, Utc::now());
        r.match_type = match_type;
        CompiledRule::new(r)
    }

    #[test]
    fn pattern_prefers_counterparty() {
        assert_eq!(
            pattern_for(&txn("Kanzlei Schmidt & Partner", "RG 2025/17")).as_deref(),
            Some("kanzlei schmidt partner")
        );
    }

    #[test]
    fn pattern_falls_back_to_free_text_words() {
        assert_eq!(
            pattern_for(&txn("", "SEPA Lastschrift 123456 Beitrag IHK Berlin")).as_deref(),
            Some("sepa lastschrift beitrag")
        );
        assert_eq!(pattern_for(&txn("", "12345 / 2025")), None);
    }

    #[test]
    fn contains_is_word_bounded() {
        let r = rule("post", RuleMatchType::Contains);
        assert!(r.matches(&txn("Deutsche Post AG", "")));
        assert!(!r.matches(&txn("Postbank", "")));
    }

    #[test]
    fn exact_compares_counterparty() {
        let r = rule("kanzlei schmidt", RuleMatchType::Exact);
        assert!(r.matches(&txn("Kanzlei Schmidt", "Honorar")));
        assert!(!r.matches(&txn("Kanzlei Schmidt Partner", "Honorar")));
    }

    #[test]
    fn regex_is_case_insensitive() {
        let r = rule(r"^kanzlei\s+\w+", RuleMatchType::Regex);
        assert!(r.matches(&txn("KANZLEI Meyer", "")));
        assert!(!r.matches(&txn("Steuerbüro Meyer", "")));
    }

    #[test]
    fn invalid_regex_never_matches() {
        assert!(!rule("(", RuleMatchType::Regex).matches(&txn("(", "(")));
    }

    #[test]
    fn fuzzy_tolerates_typos() {
        let r = rule("kanzlei schmidt", RuleMatchType::Fuzzy { threshold: 0.85 });
        assert!(r.matches(&txn("Kanzlei Schmitt", "")));
        assert!(!r.matches(&txn("Stadtwerke", "")));
    }

    #[tokio::test]
    async fn confirmation_creates_then_reinforces() {
        let store = InMemoryLearningStore::new();
        let t = txn("Kanzlei Schmidt", "Honorar");

        let first = learn_from_confirmation(&store, &t, "4950", RuleOrigin::Manual, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.change, RuleChange::Created);

        let second = learn_from_confirmation(&store, &t, "4950", RuleOrigin::Auto, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.change, RuleChange::Reinforced);
        assert_eq!(second.rule.usage_count, 2);
        assert_eq!(store.all_rules().len(), 1);
    }

    #[tokio::test]
    async fn no_pattern_learns_nothing() {
        let store = InMemoryLearningStore::new();
        let t = txn("", "0815");
        let outcome = learn_from_confirmation(&store, &t, "4950", RuleOrigin::Manual, Utc::now())
            .await
            .unwrap();
        assert!(outcome.is_none());
        assert!(store.all_rules().is_empty());
    }
}
