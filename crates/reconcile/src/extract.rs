use std::sync::OnceLock;

use concordia_core::{ConfigError, IdentifierKind, IdentifierPatternConfig};
use regex::Regex;
use serde::Serialize;

// ── Compiled regex cache ─────────────────────────────────────────────────────

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

// Literal prefix AB followed by the order sequence.
re!(re_internal_order, r"(?i)\b(AB\d{5,8})\b");
// RE + four-digit year, dash, running number: RE2025-00042.
re!(re_invoice_number, r"(?i)\b(RE(?:19|20)\d{2}-\d{3,6})\b");
// 3-7-7 digit groups as used by the marketplace.
re!(re_marketplace_order, r"\b(\d{3}-\d{7}-\d{7})\b");

/// One registry entry.
#[derive(Debug, Clone)]
pub struct IdentifierPattern {
    pub kind: IdentifierKind,
    pub regex: Regex,
    /// Higher wins when one document is hit through several kinds.
    pub priority: i32,
}

/// An identifier found in free text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedIdentifier {
    pub kind: IdentifierKind,
    pub value: String,
    pub priority: i32,
    /// Byte offset in the source text.
    pub position: usize,
}

/// Registry of `(kind, pattern, priority)` entries. Adding a kind or a
/// pattern variant is a registry change, not a change at any call site.
#[derive(Debug, Clone)]
pub struct ReferenceExtractor {
    patterns: Vec<IdentifierPattern>,
}

impl Default for ReferenceExtractor {
    fn default() -> Self {
        Self {
            patterns: vec![
                IdentifierPattern {
                    kind: IdentifierKind::InvoiceNumber,
                    regex: re_invoice_number().clone(),
                    priority: 30,
                },
                IdentifierPattern {
                    kind: IdentifierKind::InternalOrderNumber,
                    regex: re_internal_order().clone(),
                    priority: 20,
                },
                IdentifierPattern {
                    kind: IdentifierKind::MarketplaceOrderId,
                    regex: re_marketplace_order().clone(),
                    priority: 10,
                },
            ],
        }
    }
}

impl ReferenceExtractor {
    /// Built-in patterns plus the configured extras.
    pub fn with_extra_patterns(extra: &[IdentifierPatternConfig]) -> Result<Self, ConfigError> {
        let mut extractor = Self::default();
        for p in extra {
            let regex = Regex::new(&p.pattern)
                .map_err(|e| ConfigError::Invalid(format!("identifier pattern '{}': {e}", p.pattern)))?;
            extractor.register(IdentifierPattern {
                kind: p.kind,
                regex,
                priority: p.priority,
            });
        }
        Ok(extractor)
    }

    pub fn register(&mut self, pattern: IdentifierPattern) {
        self.patterns.push(pattern);
    }

    pub fn patterns(&self) -> &[IdentifierPattern] {
        &self.patterns
    }

    /// Every identifier of every kind found in `text`, in text order, each
    /// `(kind, value)` at most once. Never fails; no match yields an empty list.
    pub fn extract(&self, text: &str) -> Vec<ExtractedIdentifier> {
        let mut found: Vec<ExtractedIdentifier> = self
            .patterns
            .iter()
            .flat_map(|p| {
                p.regex.captures_iter(text).filter_map(move |caps| {
                    let m = caps.get(1).or_else(|| caps.get(0))?;
                    let value = m.as_str().trim().to_uppercase();
                    (!value.is_empty()).then(|| ExtractedIdentifier {
                        kind: p.kind,
                        value,
                        priority: p.priority,
                        position: m.start(),
                    })
                })
            })
            .collect();

        found.sort_by(|a, b| {
            a.position
                .cmp(&b.position)
                .then(b.priority.cmp(&a.priority))
        });

        let mut seen = std::collections::HashSet::new();
        found.retain(|id| seen.insert((id.kind, id.value.clone())));
        found
    }
}
