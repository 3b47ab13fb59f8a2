//! The single gate every match write passes through.
//!
//! A [`MatchWrite`] can only be built here, and stores accept nothing else
//! for match mutations. Automatic writes are refused for transactions whose
//! active match is confirmed; only [`PersistenceGuard::manual_override`]
//! may replace one.

use serde::Serialize;

use crate::matching::{MatchMethod, MatchResult};
use crate::transaction::{Transaction, TransactionKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteKind {
    /// Written by the selector. Refused over a confirmed match.
    Automatic,
    /// A human accepted a provisional match or a review suggestion.
    Confirmation,
    /// A human replaced whatever was there.
    Override,
}

impl WriteKind {
    /// Whether a write of this kind may land on a transaction whose active
    /// match is already confirmed.
    pub fn may_replace_confirmed(self) -> bool {
        matches!(self, WriteKind::Override)
    }
}

/// An admitted match mutation. Fields are private so that no code path can
/// fabricate one without going through the guard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchWrite {
    kind: WriteKind,
    result: MatchResult,
}

impl MatchWrite {
    pub fn kind(&self) -> WriteKind {
        self.kind
    }

    pub fn result(&self) -> &MatchResult {
        &self.result
    }

    pub fn transaction(&self) -> &TransactionKey {
        &self.result.transaction
    }

    /// Whether the target transaction, in its current stored state, may
    /// receive this write.
    pub fn permitted_on(&self, current: &Transaction) -> bool {
        !current.is_match_confirmed() || self.kind.may_replace_confirmed()
    }

    /// Apply to an in-memory transaction. Returns `false` and leaves the
    /// transaction untouched when the write is not permitted on it.
    pub fn apply_to(&self, txn: &mut Transaction) -> bool {
        if txn.key() != self.result.transaction || !self.permitted_on(txn) {
            return false;
        }
        txn.active_match = Some(self.result.clone());
        true
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PersistenceGuard;

impl PersistenceGuard {
    /// Admit an automatic write, or `None` if the transaction already carries
    /// a confirmed match.
    pub fn admit(&self, current: &Transaction, result: MatchResult) -> Option<MatchWrite> {
        if current.is_match_confirmed() || result.transaction != current.key() {
            return None;
        }
        Some(MatchWrite { kind: WriteKind::Automatic, result })
    }

    /// A human accepts `result` for a transaction that has no confirmed
    /// match yet. The written match is always confirmed.
    pub fn confirm(&self, current: &Transaction, mut result: MatchResult) -> Option<MatchWrite> {
        if current.is_match_confirmed() || result.transaction != current.key() {
            return None;
        }
        result.confirmed = true;
        Some(MatchWrite { kind: WriteKind::Confirmation, result })
    }

    /// Explicit manual override; the only path that replaces a confirmed match.
    pub fn manual_override(
        &self,
        current: &Transaction,
        document_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> MatchWrite {
        let result = MatchResult {
            transaction: current.key(),
            document_id: Some(document_id.into()),
            confidence: crate::ConfidenceLevel::High,
            score: 0.0,
            method: MatchMethod::Manual,
            reason: reason.into(),
            is_partial_payment: false,
            partial_percentage: None,
            confirmed: true,
        };
        MatchWrite { kind: WriteKind::Override, result }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::ConfidenceLevel;
    use crate::money::Money;
    use crate::transaction::Source;
    use chrono::NaiveDate;

    fn txn() -> Transaction {
        Transaction::new(
            Source::BankA,
            "T1",
            Money::from_cents(11900),
            NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            "",
        )
    }

    fn result(doc: &str, confirmed: bool) -> MatchResult {
        MatchResult {
            transaction: txn().key(),
            document_id: Some(doc.to_string()),
            confidence: ConfidenceLevel::High,
            score: 0.0,
            method: MatchMethod::AmountDate,
            reason: "test".to_string(),
            is_partial_payment: false,
            partial_percentage: None,
            confirmed,
        }
    }

    fn confirmed_txn() -> Transaction {
        let mut t = txn();
        t.active_match = Some(result("D1", true));
        t
    }

    #[test]
    fn admits_on_unmatched() {
        let mut t = txn();
        let write = PersistenceGuard.admit(&t, result("D1", false)).unwrap();
        assert!(write.apply_to(&mut t));
        assert_eq!(t.active_match.unwrap().document_id.as_deref(), Some("D1"));
    }

    #[test]
    fn admits_over_provisional() {
        let mut t = txn();
        t.active_match = Some(result("D1", false));
        assert!(PersistenceGuard.admit(&t, result("D2", false)).is_some());
    }

    #[test]
    fn refuses_over_confirmed() {
        let t = confirmed_txn();
        assert!(PersistenceGuard.admit(&t, result("D2", false)).is_none());
        assert!(PersistenceGuard.admit(&t, result("D2", true)).is_none());
        assert!(PersistenceGuard.confirm(&t, result("D2", false)).is_none());
    }

    #[test]
    fn refuses_result_for_other_transaction() {
        let mut r = result("D1", false);
        r.transaction = TransactionKey::new(Source::BankB, "T1");
        assert!(PersistenceGuard.admit(&txn(), r).is_none());
    }

    #[test]
    fn stale_automatic_write_is_not_applied_after_confirmation() {
        let mut t = txn();
        let write = PersistenceGuard.admit(&t, result("D2", false)).unwrap();
        t.active_match = Some(result("D1", true));
        assert!(!write.apply_to(&mut t));
        assert_eq!(t.active_match.unwrap().document_id.as_deref(), Some("D1"));
    }

    #[test]
    fn confirm_marks_confirmed() {
        let write = PersistenceGuard.confirm(&txn(), result("D1", false)).unwrap();
        assert!(write.result().confirmed);
        assert_eq!(write.kind(), WriteKind::Confirmation);
    }

    #[test]
    fn override_replaces_confirmed() {
        let mut t = confirmed_txn();
        let write = PersistenceGuard.manual_override(&t, "D9", "wrong customer");
        assert!(write.apply_to(&mut t));
        let m = t.active_match.unwrap();
        assert_eq!(m.document_id.as_deref(), Some("D9"));
        assert_eq!(m.method, MatchMethod::Manual);
        assert!(m.confirmed);
    }
}
