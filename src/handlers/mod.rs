pub mod ledger;
pub mod payments;
pub mod questions;
pub mod subscriptions;
pub mod webhooks;
pub mod withdrawals;

use axum::{
    Json, Router,
    routing::{get, post},
};
use serde::Serialize;

use crate::db::AppState;
use crate::rate_limit::{RateLimitLayer, RateLimiters};

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

fn limited(router: Router<AppState>, layer: Option<&RateLimitLayer>) -> Router<AppState> {
    match layer {
        Some(layer) => router.layer(layer.clone()),
        None => router,
    }
}

/// Full API. `limits` is None in tests that exercise handlers directly.
pub fn router(limits: Option<&RateLimiters>) -> Router<AppState> {
    // Endpoints that call a payment gateway
    let strict = Router::new()
        .route("/pagamento", post(payments::create_payment))
        .route("/pagamento/verificar", post(payments::verify_payment))
        .route("/saque", post(withdrawals::request_withdrawal))
        .route("/assinatura", post(subscriptions::create_subscription));

    let standard = Router::new()
        .route("/perguntas", post(questions::create_question))
        .route(
            "/perguntas/{id}/respostas",
            post(questions::create_answer).get(questions::list_answers),
        )
        .route("/perguntas/{id}/fechar", post(questions::close_question))
        .route("/saldo", get(ledger::get_balance))
        .route("/transacoes", get(ledger::list_transactions));

    let relaxed = Router::new().route("/health", get(health));

    Router::new()
        .merge(limited(strict, limits.map(|l| &l.strict)))
        .merge(limited(standard, limits.map(|l| &l.standard)))
        .merge(limited(relaxed, limits.map(|l| &l.relaxed)))
        // Authenticated by signature, never rate limited
        .merge(webhooks::router())
}
