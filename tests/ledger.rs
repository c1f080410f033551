//! Ledger reconciliation, balance and history endpoints

mod common;

use common::*;
use ledger::{ConfirmationOutcome, PaymentConfirmation};

fn confirmation(question: &Question, answer: &Answer, billing_id: &str) -> PaymentConfirmation {
    PaymentConfirmation {
        provider: PaymentProvider::AbacatePay,
        gateway_charge_id: billing_id.to_string(),
        question_id: Some(question.id.clone()),
        answer_id: Some(answer.id.clone()),
        amount_cents: Some(question.reward_cents),
    }
}

// ============ Exactly-once crediting ============

#[test]
fn test_concurrent_confirmations_credit_once() {
    let (pool, _dir) = test_pool();
    let (question, answer) = create_test_pair(&pool.get().unwrap(), 10000);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let pool = pool.clone();
            let confirmation = confirmation(&question, &answer, "bill_concurrent");
            std::thread::spawn(move || {
                let mut conn = pool.get().unwrap();
                ledger::apply_payment_confirmation(&mut conn, &confirmation).unwrap()
            })
        })
        .collect();

    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let credited = outcomes
        .iter()
        .filter(|o| matches!(o, ConfirmationOutcome::Credited { .. }))
        .count();
    let duplicates = outcomes
        .iter()
        .filter(|o| matches!(o, ConfirmationOutcome::AlreadyProcessed))
        .count();
    assert_eq!(credited, 1);
    assert_eq!(duplicates, 7);

    let conn = pool.get().unwrap();
    assert_eq!(balance_of(&conn, RESPONDENT).available_cents, 8500);
    assert_eq!(transactions_of(&conn, RESPONDENT).len(), 1);
    let credit = queries::get_credit_for_answer(&conn, &answer.id).unwrap().unwrap();
    assert_eq!(credit.net_cents, 8500);
}

#[test]
fn test_existing_credit_blocks_second_credit_after_flag_reset() {
    let (pool, _dir) = test_pool();
    let mut conn = pool.get().unwrap();
    let (question, answer) = create_test_pair(&conn, 10000);
    let event = confirmation(&question, &answer, "bill_once");

    let outcome = ledger::apply_payment_confirmation(&mut conn, &event).unwrap();
    assert!(matches!(outcome, ConfirmationOutcome::Credited { .. }));

    conn.execute(
        "UPDATE respostas SET payment_confirmed = 0, status = 'pending' WHERE id = ?1",
        [&answer.id],
    )
    .unwrap();

    let outcome = ledger::apply_payment_confirmation(&mut conn, &event).unwrap();
    assert!(matches!(outcome, ConfirmationOutcome::AlreadyProcessed));
    assert_eq!(balance_of(&conn, RESPONDENT).available_cents, 8500);
    assert_eq!(transactions_of(&conn, RESPONDENT).len(), 1);

    // Rolled back: the flag stays as it was found
    let stored = queries::get_answer_by_id(&conn, &answer.id).unwrap().unwrap();
    assert!(!stored.payment_confirmed);
}

#[test]
fn test_local_charge_wins_over_metadata() {
    let (pool, _dir) = test_pool();
    let conn = pool.get().unwrap();
    let (question, answer) = create_test_pair(&conn, 10000);
    let (decoy_question, decoy_answer) = create_test_pair(&conn, 10000);
    create_test_charge(&conn, &question, &answer, PaymentMethod::Pix, "bill_local");

    // Metadata points at another answer; the charge record decides
    let mut conn = pool.get().unwrap();
    let outcome = ledger::apply_payment_confirmation(
        &mut conn,
        &confirmation(&decoy_question, &decoy_answer, "bill_local"),
    )
    .unwrap();

    match outcome {
        ConfirmationOutcome::Credited { question_id, .. } => assert_eq!(question_id, question.id),
        other => panic!("expected credit, got {:?}", other),
    }
    let decoy = queries::get_answer_by_id(&conn, &decoy_answer.id).unwrap().unwrap();
    assert!(!decoy.payment_confirmed);
}

#[test]
fn test_answer_of_another_question_is_unmatched() {
    let (pool, _dir) = test_pool();
    let mut conn = pool.get().unwrap();
    let (question, _) = create_test_pair(&conn, 10000);
    let (_, other_answer) = create_test_pair(&conn, 10000);

    let outcome = ledger::apply_payment_confirmation(
        &mut conn,
        &confirmation(&question, &other_answer, "bill_mixed"),
    )
    .unwrap();
    assert!(matches!(outcome, ConfirmationOutcome::Unmatched));
    assert_eq!(balance_of(&conn, RESPONDENT).available_cents, 0);
}

#[test]
fn test_amount_mismatch_still_credits_reward() {
    let (pool, _dir) = test_pool();
    let mut conn = pool.get().unwrap();
    let (question, answer) = create_test_pair(&conn, 10000);
    let mut event = confirmation(&question, &answer, "bill_short");
    event.amount_cents = Some(9000);

    let outcome = ledger::apply_payment_confirmation(&mut conn, &event).unwrap();
    let ConfirmationOutcome::Credited { split, .. } = outcome else {
        panic!("expected credit");
    };
    assert_eq!(split.gross, 10000);
    assert_eq!(split.net, 8500);
}

#[test]
fn test_second_answer_cannot_be_paid_after_first() {
    let (pool, _dir) = test_pool();
    let mut conn = pool.get().unwrap();
    let (question, first) = create_test_pair(&conn, 10000);
    let second = create_test_answer(&conn, &question.id, OTHER_USER);

    let outcome = ledger::apply_payment_confirmation(
        &mut conn,
        &confirmation(&question, &first, "bill_first"),
    )
    .unwrap();
    assert!(matches!(outcome, ConfirmationOutcome::Credited { .. }));

    let outcome = ledger::apply_payment_confirmation(
        &mut conn,
        &confirmation(&question, &second, "bill_second"),
    )
    .unwrap();
    assert!(matches!(outcome, ConfirmationOutcome::QuestionNotOpen));
    assert_eq!(balance_of(&conn, OTHER_USER).available_cents, 0);
}

#[test]
fn test_balance_invariant_holds_across_operations() {
    let (pool, _dir) = test_pool();
    let conn = pool.get().unwrap();
    fund_balance(&conn, RESPONDENT, 10000);
    assert!(queries::try_debit_balance(&conn, RESPONDENT, 3000).unwrap());
    assert!(!queries::try_debit_balance(&conn, RESPONDENT, 7001).unwrap());
    assert!(queries::refund_debit(&conn, RESPONDENT, 1000).unwrap());

    let balance = balance_of(&conn, RESPONDENT);
    assert_eq!(balance.available_cents, 8000);
    assert_eq!(
        balance.available_cents,
        balance.earned_cents - balance.withdrawn_cents
    );
}

#[test]
fn test_reset_balance_keeps_history() {
    let (pool, _dir) = test_pool();
    let mut conn = pool.get().unwrap();
    let (question, answer) = create_test_pair(&conn, 10000);
    ledger::apply_payment_confirmation(&mut conn, &confirmation(&question, &answer, "bill_r"))
        .unwrap();

    assert!(ledger::reset_balance(&conn, RESPONDENT).unwrap());
    assert!(queries::get_balance(&conn, RESPONDENT).unwrap().is_none());
    assert_eq!(transactions_of(&conn, RESPONDENT).len(), 1);
    assert!(!ledger::reset_balance(&conn, RESPONDENT).unwrap());
}

// ============ GET /saldo, GET /transacoes ============

#[tokio::test]
async fn test_balance_defaults_to_zero() {
    let app = TestApp::new();

    let (status, body) = app.get("/saldo", RESPONDENT).await;
    assert_eq!(status, 200);
    assert_eq!(body["usuarioId"], RESPONDENT);
    assert_eq!(body["disponivel"], 0.0);
    assert_eq!(body["totalRecebido"], 0.0);
    assert_eq!(body["totalSacado"], 0.0);
}

#[tokio::test]
async fn test_balance_reports_reais() {
    let app = TestApp::new();
    fund_balance(&app.conn(), RESPONDENT, 8550);

    let (status, body) = app.get("/saldo", RESPONDENT).await;
    assert_eq!(status, 200);
    assert_eq!(body["disponivel"], 85.5);
}

#[tokio::test]
async fn test_transactions_are_paginated_newest_first() {
    let app = TestApp::new();
    {
        let mut conn = app.conn();
        for i in 0..3 {
            let (question, answer) = create_test_pair(&conn, 1000 * (i + 1));
            ledger::apply_payment_confirmation(
                &mut conn,
                &confirmation(&question, &answer, &format!("bill_{}", i)),
            )
            .unwrap();
        }
    }

    let (status, body) = app.get("/transacoes?limit=2", RESPONDENT).await;
    assert_eq!(status, 200);
    assert_eq!(body["total"], 3);
    assert_eq!(body["limit"], 2);
    assert_eq!(body["hasMore"], true);
    let data = body["data"].as_array().unwrap();
    assert_eq!(data.len(), 2);
    assert_eq!(data[0]["valorBruto"], 30.0, "newest first");
    assert_eq!(data[0]["tipo"], "credit");
    assert_eq!(data[0]["taxaPercentual"], 15.0);

    let (_, body) = app.get("/transacoes?limit=2&offset=2", RESPONDENT).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["hasMore"], false);

    let (_, body) = app.get("/transacoes", OTHER_USER).await;
    assert_eq!(body["total"], 0, "only the caller's entries");
}

#[tokio::test]
async fn test_transactions_reject_bad_query() {
    let app = TestApp::new();
    let (status, _) = app.get("/transacoes?limit=abc", RESPONDENT).await;
    assert_eq!(status, 400);
}
