//! POST /assinatura - premium plan checkout.

use axum::{extract::State, response::Json};
use serde::Serialize;

use crate::auth::AuthUser;
use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::payments::{PaymentProvider, SubscriptionRequest};

#[derive(Debug, Serialize)]
pub struct SubscriptionCheckoutResponse {
    pub url: String,
}

pub async fn create_subscription(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<SubscriptionCheckoutResponse>> {
    {
        let conn = state.db.get()?;
        if queries::is_premium(&conn, user.id())? {
            return Err(AppError::Conflict("Subscription already active".into()));
        }
    }

    let gateway = state.gateways.get(PaymentProvider::Stripe)?;
    let checkout = gateway
        .create_subscription(&SubscriptionRequest {
            user_id: user.id().to_string(),
            email: user.0.email.clone(),
            success_url: format!("{}/premium?assinatura=sucesso", state.base_url),
            cancel_url: format!("{}/premium?assinatura=cancelada", state.base_url),
        })
        .await?;

    tracing::info!(user_id = %user.id(), session = %checkout.gateway_charge_id, "Subscription checkout created");
    Ok(Json(SubscriptionCheckoutResponse { url: checkout.url }))
}
