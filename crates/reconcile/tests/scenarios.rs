mod common;

use common::*;
use concordia_core::{
    ConfidenceLevel, IdentifierKind, MatchMethod, ReconcileConfig, SuggestionMethod,
    TransactionFilter,
};
use concordia_reconcile::{cancel_token, MatchOutcome, ReviewReason, KEYWORD_SETS};
use rust_decimal::prelude::dec;

#[tokio::test]
async fn scenario_a_invoice_number_in_free_text() {
    let p = pipeline(ReconcileConfig::default());
    let txn = bank_txn("A1", 11900, 10, "Invoice REF RE2025-00042");
    seed(&p, &[txn.clone()], &[invoice("D42", "RE2025-00042", 11900, 1)]).await;

    let report = p.run(&TransactionFilter::default(), &cancel_token()).await.unwrap();
    assert_eq!(report.summary.tally.outcomes.confirmed, 1);
    assert!(report.review_queue.is_empty());

    let m = stored(&p, &txn).await.active_match.unwrap();
    assert_eq!(m.document_id.as_deref(), Some("D42"));
    assert_eq!(m.confidence, ConfidenceLevel::High);
    assert_eq!(m.method, MatchMethod::Identifier(IdentifierKind::InvoiceNumber));
    assert!(m.confirmed);
    assert!(!m.is_partial_payment);
}

#[tokio::test]
async fn scenario_b_half_payment_goes_to_review() {
    let p = pipeline(ReconcileConfig::default());
    let txn = bank_txn("B1", 5000, 10, "");
    seed(&p, &[txn.clone()], &[invoice("D1", "RE2025-00077", 10000, 9)]).await;

    let report = p.run(&TransactionFilter::default(), &cancel_token()).await.unwrap();
    assert_eq!(report.summary.tally.outcomes.review, 1);

    let item = &report.review_queue[0];
    assert_eq!(item.transaction, txn.key());
    assert_eq!(item.reasons, vec![ReviewReason::MediumConfidence]);
    let candidate = &item.candidates[0];
    assert_eq!(candidate.document_id, "D1");
    assert!(candidate.is_partial_payment);
    assert_eq!(candidate.partial_percentage, Some(dec!(0.5)));
    assert_eq!(candidate.confidence, ConfidenceLevel::Medium);

    assert!(stored(&p, &txn).await.active_match.is_none());
}

#[tokio::test]
async fn scenario_c_confirmed_match_survives_better_document() {
    let p = pipeline(ReconcileConfig::default());
    let txn = bank_txn("C1", 10000, 10, "");
    seed(&p, &[txn.clone()], &[invoice("D1", "RE2025-00001", 10000, 8)]).await;
    p.confirm_match(&txn.key(), "D1").await.unwrap();

    // D2 is an exact amount on the same day.
    seed(&p, &[], &[invoice("D2", "RE2025-00002", 10000, 10)]).await;
    let report = p.run(&TransactionFilter::default(), &cancel_token()).await.unwrap();

    assert_eq!(report.summary.tally.outcomes.confirmed, 1);
    let m = stored(&p, &txn).await.active_match.unwrap();
    assert_eq!(m.document_id.as_deref(), Some("D1"));
    assert!(m.confirmed);
}

#[tokio::test]
async fn scenario_d_energy_keyword_not_counterparty() {
    assert!(KEYWORD_SETS
        .iter()
        .flat_map(|s| s.keywords.iter())
        .all(|k| !k.contains("stadtwerke")));

    let p = pipeline(ReconcileConfig::default());
    let txn = paid_by(bank_txn("D1", -8450, 10, "Stromrechnung"), "Stadtwerke Musterstadt");
    assert!(txn.category.is_none());
    seed(&p, &[txn.clone()], &[]).await;

    let report = p.run(&TransactionFilter::default(), &cancel_token()).await.unwrap();
    assert_eq!(report.summary.tally.suggestions[&SuggestionMethod::Static], 1);

    let s = stored(&p, &txn).await.suggestion.unwrap();
    assert_eq!(s.method, SuggestionMethod::Static);
    assert_eq!(s.account_code, "4240");
    assert_eq!(s.account_label, "Gas, Strom, Wasser");
}

#[tokio::test]
async fn processor_fee_uses_category_table() {
    let p = pipeline(ReconcileConfig::default());
    let txn = concordia_core::Transaction::new(
        concordia_core::Source::ProcessorX,
        "txn_1",
        eur(-175),
        march(10),
        "Processing fee",
    )
    .with_category("fee");
    seed(&p, &[txn.clone()], &[]).await;
    p.process_transaction(&txn.key()).await.unwrap();

    let s = stored(&p, &txn).await.suggestion.unwrap();
    assert_eq!(s.method, SuggestionMethod::Category);
    assert_eq!(s.account_code, "4970");
}

#[tokio::test]
async fn fuzzy_high_match_is_provisional() {
    let p = pipeline(ReconcileConfig::default());
    let txn = bank_txn("F1", 24990, 10, "Zahlung Kunde");
    seed(&p, &[txn.clone()], &[invoice("D1", "RE2025-00120", 24990, 10)]).await;

    let report = p.run(&TransactionFilter::default(), &cancel_token()).await.unwrap();
    assert_eq!(report.summary.tally.outcomes.provisional, 1);
    assert_eq!(report.summary.tally.methods["amount_date"], 1);

    let m = stored(&p, &txn).await.active_match.unwrap();
    assert_eq!(m.method, MatchMethod::AmountDate);
    assert!(!m.confirmed);

    // A human can still confirm it.
    let confirmed = p.confirm_match(&txn.key(), "D1").await.unwrap();
    assert!(confirmed.confirmed);
    assert_eq!(confirmed.method, MatchMethod::AmountDate);
}

#[tokio::test]
async fn nothing_to_match_is_unmatched_with_method_none() {
    let p = pipeline(ReconcileConfig::default());
    let txn = bank_txn("U1", 777, 10, "Bargeldeinzahlung");
    seed(&p, &[txn.clone()], &[invoice("D1", "RE2025-00001", 50000, 10)]).await;

    let report = p.run(&TransactionFilter::default(), &cancel_token()).await.unwrap();
    assert_eq!(report.summary.tally.outcomes.unmatched, 1);
    let item = &report.review_queue[0];
    assert_eq!(item.method, MatchMethod::None);
    assert_eq!(item.reasons, vec![ReviewReason::NoCandidate]);
}

#[tokio::test]
async fn ambiguous_identifier_is_resolved_and_still_reviewed() {
    let p = pipeline(ReconcileConfig::default());
    let txn = bank_txn("M1", 11900, 10, "AB100231");
    seed(
        &p,
        &[txn.clone()],
        &[
            invoice("D2", "RE2025-00002", 11900, 10).with_order_reference("AB100231"),
            invoice("D1", "RE2025-00001", 11900, 10).with_order_reference("AB100231"),
        ],
    )
    .await;

    let first = p.run(&TransactionFilter::default(), &cancel_token()).await.unwrap();
    assert_eq!(first.review_queue.len(), 1);
    assert_eq!(first.review_queue[0].reasons, vec![ReviewReason::AmbiguousIdentifier]);
    let m = stored(&p, &txn).await.active_match.unwrap();
    assert_eq!(m.document_id.as_deref(), Some("D1"));
    assert!(!m.confirmed);

    // Same resolution and still surfaced on every run.
    let second = p.run(&TransactionFilter::default(), &cancel_token()).await.unwrap();
    assert_eq!(second.review_queue, first.review_queue);
    assert_eq!(second.summary.tally, first.summary.tally);
    assert_eq!(first.summary.tally.outcomes.provisional, 1);
}

#[test]
fn outcome_names_are_stable() {
    assert_eq!(serde_json::to_string(&MatchOutcome::Review).unwrap(), "\"review\"");
}
