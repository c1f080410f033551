//! Shared webhook pipeline: authenticate, normalize, apply.
//!
//! Every provider goes through the same steps. Signature checks run on the
//! raw body before anything is parsed, and nothing is written unless the
//! delivery authenticated.

use axum::{
    Json,
    body::Bytes,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::db::AppState;
use crate::handlers::payments::notify_credited;
use crate::ledger::{
    self, ConfirmationOutcome, PaymentConfirmation, SubscriptionChange, WithdrawalOutcome,
};
use crate::payments::{GatewayEvent, PaymentProvider};

/// Result type for webhook operations that stop early.
pub type WebhookResult = (StatusCode, &'static str);

#[derive(Serialize)]
struct Received {
    received: bool,
}

fn db_error(e: impl std::fmt::Display) -> WebhookResult {
    tracing::error!("Webhook DB error: {}", e);
    (StatusCode::INTERNAL_SERVER_ERROR, "Database error")
}

/// Verify, normalize and apply one delivery from `provider`.
///
/// Duplicate deliveries are acknowledged with 200 so the gateway stops
/// retrying; only storage failures ask for a retry.
pub async fn handle_webhook(
    state: &AppState,
    provider: PaymentProvider,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match process(state, provider, &headers, &body) {
        Ok(()) => Json(Received { received: true }).into_response(),
        Err(e) => e.into_response(),
    }
}

fn process(
    state: &AppState,
    provider: PaymentProvider,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(), WebhookResult> {
    let gateway = state.gateways.get(provider).map_err(|_| {
        tracing::warn!("Webhook for unconfigured gateway {}", provider.as_ref());
        (StatusCode::SERVICE_UNAVAILABLE, "Gateway not configured")
    })?;

    match gateway.verify_webhook(headers, body) {
        Ok(true) => {}
        Ok(false) => {
            tracing::warn!("Rejected {} webhook: invalid signature", provider.as_ref());
            return Err((StatusCode::UNAUTHORIZED, "Invalid signature"));
        }
        Err(e) => {
            tracing::warn!("Rejected {} webhook: {}", provider.as_ref(), e);
            return Err((StatusCode::UNAUTHORIZED, "Invalid signature"));
        }
    }

    let event = gateway.parse_webhook(body).map_err(|e| {
        tracing::warn!("Unparseable {} webhook: {}", provider.as_ref(), e);
        (StatusCode::BAD_REQUEST, "Invalid payload")
    })?;

    apply_event(state, provider, event)
}

fn apply_event(
    state: &AppState,
    provider: PaymentProvider,
    event: GatewayEvent,
) -> Result<(), WebhookResult> {
    let mut conn = state.db.get().map_err(db_error)?;

    match event {
        GatewayEvent::PaymentConfirmed {
            charge_id,
            question_id,
            answer_id,
            amount_cents,
        } => {
            let outcome = ledger::apply_payment_confirmation(
                &mut conn,
                &PaymentConfirmation {
                    provider,
                    gateway_charge_id: charge_id.clone(),
                    question_id,
                    answer_id,
                    amount_cents,
                },
            )
            .map_err(db_error)?;

            match &outcome {
                ConfirmationOutcome::Credited { transaction, .. } => {
                    tracing::info!(
                        gateway = provider.as_ref(),
                        charge_id = %charge_id,
                        transaction_id = %transaction.id,
                        "Payment credited"
                    );
                    notify_credited(state, &conn, &outcome);
                }
                ConfirmationOutcome::AlreadyProcessed => {
                    tracing::info!(charge_id = %charge_id, "Payment already processed");
                }
                ConfirmationOutcome::QuestionNotOpen => {
                    tracing::error!(
                        charge_id = %charge_id,
                        "Paid charge for a question that is no longer open; refund manually"
                    );
                }
                ConfirmationOutcome::Unmatched => {
                    tracing::warn!(charge_id = %charge_id, "Payment matched no question/answer");
                }
            }
        }
        GatewayEvent::PaymentFailed { charge_id } => {
            let updated = ledger::record_charge_failure(&conn, provider, &charge_id)
                .map_err(db_error)?;
            tracing::info!(charge_id = %charge_id, updated, "Charge failed");
        }
        GatewayEvent::PayoutCompleted {
            payout_id,
            external_id,
        } => match ledger::confirm_withdrawal(&mut conn, &payout_id, external_id.as_deref())
            .map_err(db_error)?
        {
            WithdrawalOutcome::Completed(txn) => {
                tracing::info!(payout_id = %payout_id, transaction_id = %txn.id, "Withdrawal completed");
            }
            WithdrawalOutcome::AlreadyProcessed => {
                tracing::info!(payout_id = %payout_id, "Withdrawal already processed");
            }
            WithdrawalOutcome::Unknown => {
                tracing::warn!(payout_id = %payout_id, "Payout matched no withdrawal");
            }
        },
        GatewayEvent::SubscriptionActivated {
            user_id,
            subscription_id,
            plan,
        } => {
            ledger::apply_subscription_change(
                &conn,
                &SubscriptionChange::Activated {
                    user_id,
                    subscription_id,
                    plan,
                },
            )
            .map_err(db_error)?;
        }
        GatewayEvent::SubscriptionCanceled { subscription_id } => {
            ledger::apply_subscription_change(
                &conn,
                &SubscriptionChange::Canceled { subscription_id },
            )
            .map_err(db_error)?;
        }
        GatewayEvent::SubscriptionPaymentFailed { subscription_id } => {
            ledger::apply_subscription_change(
                &conn,
                &SubscriptionChange::PaymentFailed { subscription_id },
            )
            .map_err(db_error)?;
        }
        GatewayEvent::Ignored => {
            tracing::debug!("Ignored {} webhook event", provider.as_ref());
        }
    }

    Ok(())
}
