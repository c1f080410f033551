//! Webhook authentication and reconciliation

mod common;

use common::*;
use serde_json::json;

// ============ Authentication ============

#[tokio::test]
async fn test_stripe_bad_signature_is_rejected_without_mutation() {
    let app = TestApp::new();
    let conn = app.conn();
    let (question, answer) = create_test_pair(&conn, 10000);
    create_test_charge(&conn, &question, &answer, PaymentMethod::Cartao, "cs_test_1");
    let payload = stripe_checkout_completed("cs_test_1", &question, &answer);

    let forged = vec![("stripe-signature", stripe_signature(&payload, "whsec_wrong"))];
    let (status, _) = app.webhook("/webhook/stripe", &forged, &payload).await;
    assert_eq!(status, 401);

    let (status, _) = app.webhook("/webhook/stripe", &[], &payload).await;
    assert_eq!(status, 401, "missing header");

    let garbage = vec![("stripe-signature", "not-a-signature".to_string())];
    let (status, _) = app.webhook("/webhook/stripe", &garbage, &payload).await;
    assert_eq!(status, 401, "malformed header");

    assert_eq!(balance_of(&conn, RESPONDENT).available_cents, 0);
    let answer = queries::get_answer_by_id(&conn, &answer.id).unwrap().unwrap();
    assert!(!answer.payment_confirmed);
}

#[tokio::test]
async fn test_stripe_stale_signature_is_rejected() {
    let app = TestApp::new();
    let payload = json!({"type": "checkout.session.completed", "data": {"object": {}}}).to_string();
    let old = chrono::Utc::now().timestamp() - 600;
    let sig = hmac_hex(STRIPE_WEBHOOK_SECRET, format!("{}.{}", old, payload).as_bytes());
    let headers = vec![("stripe-signature", format!("t={},v1={}", old, sig))];

    let (status, _) = app.webhook("/webhook/stripe", &headers, &payload).await;
    assert_eq!(status, 401);
}

#[tokio::test]
async fn test_abacatepay_bad_hmac_is_rejected_without_mutation() {
    let app = TestApp::new();
    let conn = app.conn();
    let (question, answer) = create_test_pair(&conn, 10000);
    let payload = abacatepay_billing_paid("bill_1", &question, &answer);

    let headers = vec![("x-webhook-signature", hmac_hex("wrong_secret", payload.as_bytes()))];
    let (status, _) = app.webhook("/webhook/abacatepay", &headers, &payload).await;
    assert_eq!(status, 401);

    let headers = vec![("x-webhook-secret", "wrong_secret".to_string())];
    let (status, _) = app.webhook("/webhook/abacatepay", &headers, &payload).await;
    assert_eq!(status, 401);

    assert_eq!(balance_of(&conn, RESPONDENT).available_cents, 0);
    assert!(transactions_of(&conn, RESPONDENT).is_empty());
}

#[tokio::test]
async fn test_abacatepay_shared_secret_is_accepted() {
    let app = TestApp::new();
    let conn = app.conn();
    let (question, answer) = create_test_pair(&conn, 10000);
    let payload = abacatepay_billing_paid("bill_1", &question, &answer);

    let headers = vec![("x-webhook-secret", ABACATEPAY_WEBHOOK_SECRET.to_string())];
    let (status, body) = app.webhook("/webhook/abacatepay", &headers, &payload).await;
    assert_eq!(status, 200);
    assert_eq!(body["received"], true);
    assert_eq!(balance_of(&conn, RESPONDENT).available_cents, 8500);
}

#[tokio::test]
async fn test_signed_but_malformed_payload_is_bad_request() {
    let app = TestApp::new();
    let payload = "{not json";
    let (status, _) = app
        .webhook("/webhook/abacatepay", &abacatepay_headers(payload), payload)
        .await;
    assert_eq!(status, 400);
}

// ============ Payment confirmation ============

#[tokio::test]
async fn test_stripe_checkout_completed_credits_respondent() {
    let app = TestApp::new();
    let conn = app.conn();
    let (question, answer) = create_test_pair(&conn, 10000);
    let charge = create_test_charge(&conn, &question, &answer, PaymentMethod::Cartao, "cs_test_1");
    let payload = stripe_checkout_completed("cs_test_1", &question, &answer);

    let (status, body) = app
        .webhook("/webhook/stripe", &stripe_headers(&payload), &payload)
        .await;
    assert_eq!(status, 200, "body: {body}");
    assert_eq!(body["received"], true);

    let balance = balance_of(&conn, RESPONDENT);
    assert_eq!(balance.available_cents, 8500);
    assert_eq!(balance.earned_cents, 8500);

    let txns = transactions_of(&conn, RESPONDENT);
    assert_eq!(txns.len(), 1);
    assert_eq!(txns[0].kind, TransactionKind::Credit);
    assert_eq!(txns[0].status, TransactionStatus::Completed);
    assert_eq!(txns[0].gross_cents, 10000);
    assert_eq!(txns[0].fee_cents, 1500);
    assert_eq!(txns[0].net_cents, 8500);
    assert_eq!(txns[0].fee_bps, 1500);
    assert_eq!(txns[0].answer_id.as_deref(), Some(answer.id.as_str()));

    let charge = queries::get_charge_by_id(&conn, &charge.id).unwrap().unwrap();
    assert_eq!(charge.status, ChargeStatus::Paid);
}

#[tokio::test]
async fn test_duplicate_deliveries_credit_once() {
    let app = TestApp::new();
    let conn = app.conn();
    let (question, answer) = create_test_pair(&conn, 10000);
    let payload = abacatepay_billing_paid("bill_dup", &question, &answer);

    for _ in 0..3 {
        let (status, _) = app
            .webhook("/webhook/abacatepay", &abacatepay_headers(&payload), &payload)
            .await;
        assert_eq!(status, 200);
    }

    assert_eq!(balance_of(&conn, RESPONDENT).available_cents, 8500);
    assert_eq!(transactions_of(&conn, RESPONDENT).len(), 1);

    settle().await;
    let received = app
        .notifier
        .kinds()
        .into_iter()
        .filter(|k| *k == NotificationKind::PaymentReceived)
        .count();
    assert_eq!(received, 1, "one notification per credit");
}

#[tokio::test]
async fn test_webhook_and_verify_race_credits_once() {
    let app = TestApp::new();
    let conn = app.conn();
    let (question, answer) = create_test_pair(&conn, 10000);
    create_test_charge(&conn, &question, &answer, PaymentMethod::Pix, "bill_race");
    app.abacatepay.set_status(ChargeStatus::Paid);

    let payload = abacatepay_billing_paid("bill_race", &question, &answer);
    let (status, _) = app
        .webhook("/webhook/abacatepay", &abacatepay_headers(&payload), &payload)
        .await;
    assert_eq!(status, 200);

    let (status, body) = app
        .post_json(
            "/pagamento/verificar",
            ASKER,
            json!({ "perguntaId": question.id, "respostaId": answer.id }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "paid");

    assert_eq!(balance_of(&conn, RESPONDENT).available_cents, 8500);
    assert_eq!(transactions_of(&conn, RESPONDENT).len(), 1);
}

#[tokio::test]
async fn test_payment_for_closed_question_is_not_credited() {
    let app = TestApp::new();
    let conn = app.conn();
    let (question, answer) = create_test_pair(&conn, 10000);
    assert!(queries::close_question(&conn, &question.id).unwrap());
    let payload = abacatepay_billing_paid("bill_late", &question, &answer);

    let (status, _) = app
        .webhook("/webhook/abacatepay", &abacatepay_headers(&payload), &payload)
        .await;
    assert_eq!(status, 200, "acknowledged so the gateway stops retrying");

    assert_eq!(balance_of(&conn, RESPONDENT).available_cents, 0);
    let answer = queries::get_answer_by_id(&conn, &answer.id).unwrap().unwrap();
    assert!(!answer.payment_confirmed, "answer claim rolled back");
}

#[tokio::test]
async fn test_unmatched_payment_is_acknowledged() {
    let app = TestApp::new();
    let payload = json!({
        "event": "billing.paid",
        "data": { "billing": { "id": "bill_orphan", "metadata": {} } }
    })
    .to_string();

    let (status, _) = app
        .webhook("/webhook/abacatepay", &abacatepay_headers(&payload), &payload)
        .await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn test_expired_checkout_marks_charge_failed() {
    let app = TestApp::new();
    let conn = app.conn();
    let (question, answer) = create_test_pair(&conn, 10000);
    let charge = create_test_charge(&conn, &question, &answer, PaymentMethod::Cartao, "cs_exp");
    let payload = json!({
        "type": "checkout.session.expired",
        "data": { "object": { "id": "cs_exp", "mode": "payment", "status": "expired" } }
    })
    .to_string();

    let (status, _) = app
        .webhook("/webhook/stripe", &stripe_headers(&payload), &payload)
        .await;
    assert_eq!(status, 200);

    let charge = queries::get_charge_by_id(&conn, &charge.id).unwrap().unwrap();
    assert_eq!(charge.status, ChargeStatus::Failed);
    let question = queries::get_question_by_id(&conn, &question.id).unwrap().unwrap();
    assert_eq!(question.status, QuestionStatus::Open);
}

// ============ Subscriptions and fee tiers ============

fn subscription_completed(user_id: &str, subscription_id: &str) -> String {
    json!({
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": "cs_sub_1",
                "mode": "subscription",
                "status": "complete",
                "payment_status": "paid",
                "client_reference_id": user_id,
                "subscription": subscription_id,
                "metadata": { "usuarioId": user_id }
            }
        }
    })
    .to_string()
}

async fn pay_answer(app: &TestApp, billing_id: &str) {
    let conn = app.conn();
    let (question, answer) = create_test_pair(&conn, 10000);
    let payload = abacatepay_billing_paid(billing_id, &question, &answer);
    let (status, _) = app
        .webhook("/webhook/abacatepay", &abacatepay_headers(&payload), &payload)
        .await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn test_subscription_switches_fee_tier() {
    let app = TestApp::new();

    let payload = subscription_completed(RESPONDENT, "sub_123");
    let (status, _) = app
        .webhook("/webhook/stripe", &stripe_headers(&payload), &payload)
        .await;
    assert_eq!(status, 200);
    assert!(queries::is_premium(&app.conn(), RESPONDENT).unwrap());

    pay_answer(&app, "bill_premium").await;
    assert_eq!(balance_of(&app.conn(), RESPONDENT).available_cents, 9500, "5% fee");

    let payload = json!({
        "type": "customer.subscription.deleted",
        "data": { "object": { "id": "sub_123", "status": "canceled" } }
    })
    .to_string();
    let (status, _) = app
        .webhook("/webhook/stripe", &stripe_headers(&payload), &payload)
        .await;
    assert_eq!(status, 200);
    assert!(!queries::is_premium(&app.conn(), RESPONDENT).unwrap());

    pay_answer(&app, "bill_standard").await;
    assert_eq!(
        balance_of(&app.conn(), RESPONDENT).available_cents,
        9500 + 8500,
        "back to 15%, earlier credit untouched"
    );

    let txns = transactions_of(&app.conn(), RESPONDENT);
    let mut rates: Vec<i64> = txns.iter().map(|t| t.fee_bps).collect();
    rates.sort();
    assert_eq!(rates, vec![500, 1500]);
}

#[tokio::test]
async fn test_subscription_payment_failure_drops_tier() {
    let app = TestApp::new();
    make_premium(&app.conn(), RESPONDENT, "sub_456");

    let payload = json!({
        "type": "invoice.payment_failed",
        "data": { "object": {
            "id": "in_1",
            "parent": { "subscription_details": { "subscription": "sub_456" } }
        } }
    })
    .to_string();
    let (status, _) = app
        .webhook("/webhook/stripe", &stripe_headers(&payload), &payload)
        .await;
    assert_eq!(status, 200);

    let sub = queries::get_subscription(&app.conn(), RESPONDENT).unwrap().unwrap();
    assert_eq!(sub.status, SubscriptionStatus::PaymentFailed);
    assert!(!sub.is_premium());
}

#[tokio::test]
async fn test_ignored_event_type_is_acknowledged() {
    let app = TestApp::new();
    let payload = json!({
        "type": "customer.created",
        "data": { "object": { "id": "cus_1" } }
    })
    .to_string();

    let (status, body) = app
        .webhook("/webhook/stripe", &stripe_headers(&payload), &payload)
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["received"], true);
}
