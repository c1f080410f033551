pub mod common;

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::Response,
    routing::post,
};

use crate::db::AppState;
use crate::payments::PaymentProvider;

use common::handle_webhook;

pub async fn handle_stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    handle_webhook(&state, PaymentProvider::Stripe, headers, body).await
}

pub async fn handle_abacatepay_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    handle_webhook(&state, PaymentProvider::AbacatePay, headers, body).await
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/webhook/stripe", post(handle_stripe_webhook))
        .route("/webhook/abacatepay", post(handle_abacatepay_webhook))
}
