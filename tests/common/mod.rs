//! Test utilities and fixtures for QuestionGo integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Request, Response, header},
};
use rusqlite::Connection;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

pub use questiongo::auth::{IdentityVerifier, VerifiedUser};
pub use questiongo::config::{AbacatePayConfig, StripeConfig};
pub use questiongo::db::{AppState, DbPool, create_pool, init_db, queries};
pub use questiongo::email::{Notification, NotificationKind, Notifier};
pub use questiongo::error::{AppError, Result};
pub use questiongo::handlers;
pub use questiongo::ledger;
pub use questiongo::models::*;
pub use questiongo::payments::{
    AbacatePayGateway, ChargeRequest, CreatedCharge, CreatedPayout, GatewayEvent, Gateways,
    PaymentGateway, PaymentProvider, PayoutRequest, StripeGateway, SubscriptionRequest,
};

pub const STRIPE_WEBHOOK_SECRET: &str = "whsec_test123secret456";
pub const ABACATEPAY_WEBHOOK_SECRET: &str = "abacate_hook_secret";

pub const ASKER: &str = "uid_asker";
pub const RESPONDENT: &str = "uid_respondent";
pub const OTHER_USER: &str = "uid_other";

// ============ Identity ============

/// Accepts `Bearer <uid>` for a fixed set of uids.
pub struct StaticIdentityVerifier {
    users: HashMap<String, VerifiedUser>,
}

impl StaticIdentityVerifier {
    pub fn new(uids: &[&str]) -> Self {
        let users = uids
            .iter()
            .map(|uid| {
                (
                    uid.to_string(),
                    VerifiedUser {
                        uid: uid.to_string(),
                        email: Some(format!("{}@example.com", uid)),
                        name: Some(format!("User {}", uid)),
                    },
                )
            })
            .collect();
        Self { users }
    }
}

#[async_trait]
impl IdentityVerifier for StaticIdentityVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedUser> {
        self.users
            .get(token)
            .cloned()
            .ok_or_else(|| AppError::TokenValidation("unknown test token".into()))
    }
}

// ============ Gateways ============

/// Gateway double. Outbound calls are recorded instead of sent; webhook
/// verification and parsing go through the real provider implementation.
pub struct MockGateway {
    webhooks: Arc<dyn PaymentGateway>,
    pub charges: Mutex<Vec<ChargeRequest>>,
    pub payouts: Mutex<Vec<PayoutRequest>>,
    pub subscriptions: Mutex<Vec<SubscriptionRequest>>,
    pub status: Mutex<ChargeStatus>,
    pub fail_charges: Mutex<bool>,
    pub fail_payouts: Mutex<bool>,
}

impl MockGateway {
    pub fn stripe() -> Arc<Self> {
        Arc::new(Self::wrapping(Arc::new(StripeGateway::new(&stripe_config()))))
    }

    pub fn abacatepay() -> Arc<Self> {
        Arc::new(Self::wrapping(Arc::new(AbacatePayGateway::new(
            &abacatepay_config(),
        ))))
    }

    fn wrapping(webhooks: Arc<dyn PaymentGateway>) -> Self {
        Self {
            webhooks,
            charges: Mutex::new(Vec::new()),
            payouts: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
            status: Mutex::new(ChargeStatus::Pending),
            fail_charges: Mutex::new(false),
            fail_payouts: Mutex::new(false),
        }
    }

    pub fn set_status(&self, status: ChargeStatus) {
        *self.status.lock().unwrap() = status;
    }

    pub fn fail_payouts(&self) {
        *self.fail_payouts.lock().unwrap() = true;
    }

    pub fn fail_charges(&self) {
        *self.fail_charges.lock().unwrap() = true;
    }

    pub fn charge_count(&self) -> usize {
        self.charges.lock().unwrap().len()
    }

    pub fn payout_count(&self) -> usize {
        self.payouts.lock().unwrap().len()
    }

    /// Gateway ID handed out for the n-th charge (1-based).
    pub fn charge_id(&self, n: usize) -> String {
        format!("{}_charge_{}", self.kind().as_ref(), n)
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    fn kind(&self) -> PaymentProvider {
        self.webhooks.kind()
    }

    async fn create_charge(&self, request: &ChargeRequest) -> Result<CreatedCharge> {
        if *self.fail_charges.lock().unwrap() {
            return Err(AppError::Gateway("charge refused".into()));
        }
        let mut charges = self.charges.lock().unwrap();
        charges.push(request.clone());
        let id = format!("{}_charge_{}", self.kind().as_ref(), charges.len());
        Ok(CreatedCharge {
            url: format!("https://pay.example.com/{}", id),
            gateway_charge_id: id,
        })
    }

    async fn create_subscription(&self, request: &SubscriptionRequest) -> Result<CreatedCharge> {
        self.subscriptions.lock().unwrap().push(request.clone());
        Ok(CreatedCharge {
            gateway_charge_id: "cs_sub_1".into(),
            url: "https://pay.example.com/cs_sub_1".into(),
        })
    }

    async fn create_payout(&self, request: &PayoutRequest) -> Result<CreatedPayout> {
        if *self.fail_payouts.lock().unwrap() {
            return Err(AppError::Gateway("payout refused".into()));
        }
        let mut payouts = self.payouts.lock().unwrap();
        payouts.push(request.clone());
        Ok(CreatedPayout {
            payout_id: format!("payout_{}", payouts.len()),
        })
    }

    async fn verify_status(&self, _gateway_charge_id: &str) -> Result<ChargeStatus> {
        Ok(*self.status.lock().unwrap())
    }

    fn verify_webhook(&self, headers: &HeaderMap, body: &[u8]) -> Result<bool> {
        self.webhooks.verify_webhook(headers, body)
    }

    fn parse_webhook(&self, body: &[u8]) -> Result<GatewayEvent> {
        self.webhooks.parse_webhook(body)
    }
}

pub fn stripe_config() -> StripeConfig {
    StripeConfig {
        secret_key: "sk_test_xxx".into(),
        webhook_secret: STRIPE_WEBHOOK_SECRET.into(),
        premium_price_id: Some("price_premium".into()),
        // Never contacted: outbound calls go through MockGateway
        api_base: "http://127.0.0.1:9".into(),
    }
}

pub fn abacatepay_config() -> AbacatePayConfig {
    AbacatePayConfig {
        api_key: "abc_test_xxx".into(),
        webhook_secret: ABACATEPAY_WEBHOOK_SECRET.into(),
        api_base: "http://127.0.0.1:9".into(),
    }
}

// ============ Notifications ============

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn kinds(&self) -> Vec<NotificationKind> {
        self.sent.lock().unwrap().iter().map(|n| n.kind).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// Always fails; flows must succeed regardless.
pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn send(&self, _notification: &Notification) -> Result<()> {
        Err(AppError::Internal("mail provider down".into()))
    }
}

// ============ App ============

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub stripe: Arc<MockGateway>,
    pub abacatepay: Arc<MockGateway>,
    pub notifier: Arc<RecordingNotifier>,
    _dir: TempDir,
}

/// File-backed pool so every pooled connection sees the same database.
pub fn test_pool() -> (DbPool, TempDir) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("questiongo-test.db");
    let pool = create_pool(path.to_str().unwrap()).unwrap();
    {
        let conn = pool.get().unwrap();
        init_db(&conn).unwrap();
    }
    (pool, dir)
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_notifier_and_limits(Arc::new(RecordingNotifier::default()), None)
    }

    pub fn with_notifier_and_limits(
        notifier: Arc<RecordingNotifier>,
        limits: Option<&questiongo::rate_limit::RateLimiters>,
    ) -> Self {
        let (pool, dir) = test_pool();
        let stripe = MockGateway::stripe();
        let abacatepay = MockGateway::abacatepay();

        let state = AppState {
            db: pool,
            base_url: "http://localhost:3000".to_string(),
            identity: Some(Arc::new(StaticIdentityVerifier::new(&[
                ASKER, RESPONDENT, OTHER_USER,
            ]))),
            gateways: Gateways {
                stripe: Some(stripe.clone() as Arc<dyn PaymentGateway>),
                abacatepay: Some(abacatepay.clone() as Arc<dyn PaymentGateway>),
            },
            notifier: notifier.clone(),
        };

        let app = handlers::router(limits).with_state(state.clone());

        Self {
            app,
            state,
            stripe,
            abacatepay,
            notifier,
            _dir: dir,
        }
    }

    pub fn conn(&self) -> r2d2::PooledConnection<r2d2_sqlite::SqliteConnectionManager> {
        self.state.db.get().unwrap()
    }

    pub async fn request(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }

    pub async fn post_json(&self, uri: &str, token: &str, body: Value) -> (u16, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = self.request(request).await;
        split_response(response).await
    }

    pub async fn get(&self, uri: &str, token: &str) -> (u16, Value) {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();
        let response = self.request(request).await;
        split_response(response).await
    }

    /// Deliver a raw webhook body with the given headers.
    pub async fn webhook(&self, uri: &str, headers: &[(&str, String)], body: &str) -> (u16, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        for (name, value) in headers {
            builder = builder.header(*name, value);
        }
        let response = self.request(builder.body(Body::from(body.to_string())).unwrap()).await;
        split_response(response).await
    }
}

pub async fn split_response(response: Response<Body>) -> (u16, Value) {
    let status = response.status().as_u16();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

// ============ Fixtures ============

pub fn create_test_question(conn: &Connection, owner_id: &str, reward_cents: i64) -> Question {
    queries::create_question(
        conn,
        owner_id,
        &CreateQuestion {
            texto: "Como funciona o PIX?".to_string(),
            valor: reward_cents,
        },
    )
    .expect("Failed to create test question")
}

pub fn create_test_answer(conn: &Connection, question_id: &str, author_id: &str) -> Answer {
    queries::create_answer(
        conn,
        question_id,
        author_id,
        &CreateAnswer {
            texto: "Transferência instantânea via Banco Central.".to_string(),
        },
    )
    .expect("Failed to create test answer")
}

/// Question owned by ASKER with one answer by RESPONDENT.
pub fn create_test_pair(conn: &Connection, reward_cents: i64) -> (Question, Answer) {
    create_test_user(conn, ASKER);
    create_test_user(conn, RESPONDENT);
    let question = create_test_question(conn, ASKER, reward_cents);
    let answer = create_test_answer(conn, &question.id, RESPONDENT);
    (question, answer)
}

pub fn create_test_user(conn: &Connection, uid: &str) {
    let email = format!("{}@example.com", uid);
    queries::upsert_user(conn, uid, Some(email.as_str()), None)
        .expect("Failed to create test user");
}

pub fn create_test_charge(
    conn: &Connection,
    question: &Question,
    answer: &Answer,
    method: PaymentMethod,
    gateway_charge_id: &str,
) -> Charge {
    let charge = queries::create_charge(
        conn,
        &CreateCharge {
            question_id: question.id.clone(),
            answer_id: answer.id.clone(),
            payer_id: question.owner_id.clone(),
            method,
            amount_cents: question.reward_cents,
        },
    )
    .expect("Failed to create test charge");
    queries::set_charge_gateway_ref(
        conn,
        &charge.id,
        gateway_charge_id,
        &format!("https://pay.example.com/{}", gateway_charge_id),
    )
    .expect("Failed to set gateway ref");
    queries::get_charge_by_id(conn, &charge.id).unwrap().unwrap()
}

pub fn fund_balance(conn: &Connection, user_id: &str, cents: i64) {
    queries::credit_balance(conn, user_id, cents).expect("Failed to fund balance");
}

pub fn make_premium(conn: &Connection, user_id: &str, subscription_id: &str) {
    queries::upsert_active_subscription(conn, user_id, "premium", subscription_id)
        .expect("Failed to create subscription");
}

pub fn balance_of(conn: &Connection, user_id: &str) -> Balance {
    queries::get_balance(conn, user_id)
        .unwrap()
        .unwrap_or_else(|| Balance::empty(user_id))
}

pub fn transactions_of(conn: &Connection, user_id: &str) -> Vec<Transaction> {
    queries::list_transactions_for_user_paginated(conn, user_id, 100, 0)
        .unwrap()
        .0
}

// ============ Webhook signatures ============

pub fn hmac_hex(secret: &str, payload: &[u8]) -> String {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// `stripe-signature` header value for `payload`, signed now.
pub fn stripe_signature(payload: &str, secret: &str) -> String {
    let timestamp = chrono::Utc::now().timestamp().to_string();
    let signature = hmac_hex(secret, format!("{}.{}", timestamp, payload).as_bytes());
    format!("t={},v1={}", timestamp, signature)
}

pub fn stripe_headers(payload: &str) -> Vec<(&'static str, String)> {
    vec![("stripe-signature", stripe_signature(payload, STRIPE_WEBHOOK_SECRET))]
}

pub fn abacatepay_headers(payload: &str) -> Vec<(&'static str, String)> {
    vec![(
        "x-webhook-signature",
        hmac_hex(ABACATEPAY_WEBHOOK_SECRET, payload.as_bytes()),
    )]
}

pub fn stripe_checkout_completed(session_id: &str, question: &Question, answer: &Answer) -> String {
    serde_json::json!({
        "id": "evt_test_1",
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": session_id,
                "mode": "payment",
                "status": "complete",
                "payment_status": "paid",
                "amount_total": question.reward_cents,
                "metadata": {
                    "perguntaId": question.id,
                    "respostaId": answer.id,
                }
            }
        }
    })
    .to_string()
}

pub fn abacatepay_billing_paid(billing_id: &str, question: &Question, answer: &Answer) -> String {
    serde_json::json!({
        "event": "billing.paid",
        "devMode": true,
        "data": {
            "billing": {
                "id": billing_id,
                "status": "PAID",
                "paidAmount": question.reward_cents,
                "metadata": {
                    "perguntaId": question.id,
                    "respostaId": answer.id,
                }
            }
        }
    })
    .to_string()
}

/// Wait for spawned notification tasks.
pub async fn settle() {
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
}
