use std::collections::HashMap;

use async_trait::async_trait;
use axum::http::HeaderMap;
use reqwest::Client;
use serde::Deserialize;

use super::{
    ChargeRequest, CreatedCharge, GatewayEvent, PaymentGateway, PaymentProvider,
    SubscriptionRequest, metadata,
};
use crate::config::StripeConfig;
use crate::crypto::{constant_time_eq, hmac_sha256_hex};
use crate::error::{AppError, Result};
use crate::models::ChargeStatus;

/// Plan name recorded for Stripe premium subscriptions.
pub const PREMIUM_PLAN: &str = "premium";

#[derive(Debug, Deserialize)]
struct CheckoutSessionResponse {
    id: String,
    url: Option<String>,
    status: Option<String>,
    payment_status: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StripeGateway {
    client: Client,
    secret_key: String,
    webhook_secret: String,
    premium_price_id: Option<String>,
    api_base: String,
}

impl StripeGateway {
    pub fn new(config: &StripeConfig) -> Self {
        Self {
            client: Client::new(),
            secret_key: config.secret_key.clone(),
            webhook_secret: config.webhook_secret.clone(),
            premium_price_id: config.premium_price_id.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
        }
    }

    async fn create_checkout_session(
        &self,
        idempotency_key: &str,
        form: &[(&str, String)],
    ) -> Result<CheckoutSessionResponse> {
        let response = self
            .client
            .post(format!("{}/checkout/sessions", self.api_base))
            .basic_auth(&self.secret_key, None::<&str>)
            .header("Idempotency-Key", idempotency_key)
            .form(form)
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("Stripe API error: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Gateway(format!(
                "Stripe API error ({}): {}",
                status, error_text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Gateway(format!("Failed to parse Stripe response: {}", e)))
    }

    /// Maximum age of a webhook timestamp before it's rejected (in seconds).
    const WEBHOOK_TIMESTAMP_TOLERANCE_SECS: i64 = 300;

    /// Verify a `t=timestamp,v1=signature` header. Several `v1` entries may be
    /// present while a secret is being rolled; any match is accepted.
    pub fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> Result<bool> {
        let mut timestamp = None;
        let mut candidates = Vec::new();

        for part in signature.split(',') {
            let part = part.trim();
            if let Some(t) = part.strip_prefix("t=") {
                timestamp = Some(t);
            } else if let Some(s) = part.strip_prefix("v1=") {
                candidates.push(s);
            }
        }

        let (Some(timestamp_str), false) = (timestamp, candidates.is_empty()) else {
            tracing::debug!("Stripe webhook rejected: malformed signature header");
            return Ok(false);
        };

        let Ok(timestamp) = timestamp_str.parse::<i64>() else {
            tracing::debug!("Stripe webhook rejected: invalid timestamp in signature");
            return Ok(false);
        };

        let Some(age) = chrono::Utc::now().timestamp().checked_sub(timestamp) else {
            tracing::debug!("Stripe webhook rejected: timestamp out of range");
            return Ok(false);
        };
        if age > Self::WEBHOOK_TIMESTAMP_TOLERANCE_SECS {
            tracing::warn!(
                "Stripe webhook rejected: timestamp too old (age={}s, max={}s)",
                age,
                Self::WEBHOOK_TIMESTAMP_TOLERANCE_SECS
            );
            return Ok(false);
        }

        // Clock skew tolerance for timestamps from the future
        if age < -60 {
            tracing::warn!("Stripe webhook rejected: timestamp in the future (age={}s)", age);
            return Ok(false);
        }

        let mut signed_payload = Vec::with_capacity(timestamp_str.len() + 1 + payload.len());
        signed_payload.extend_from_slice(timestamp_str.as_bytes());
        signed_payload.push(b'.');
        signed_payload.extend_from_slice(payload);

        let expected = hmac_sha256_hex(self.webhook_secret.as_bytes(), &signed_payload)?;

        Ok(candidates
            .iter()
            .any(|sig| constant_time_eq(expected.as_bytes(), sig.as_bytes())))
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    fn kind(&self) -> PaymentProvider {
        PaymentProvider::Stripe
    }

    async fn create_charge(&self, request: &ChargeRequest) -> Result<CreatedCharge> {
        let mut form: Vec<(&str, String)> = vec![
            ("mode", "payment".into()),
            ("success_url", request.success_url.clone()),
            ("cancel_url", request.cancel_url.clone()),
            ("payment_method_types[0]", "card".into()),
            ("client_reference_id", request.charge_id.clone()),
            ("line_items[0][quantity]", "1".into()),
            ("line_items[0][price_data][currency]", "brl".into()),
            (
                "line_items[0][price_data][unit_amount]",
                request.amount_cents.to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]",
                request.description.clone(),
            ),
            ("metadata[perguntaId]", request.question_id.clone()),
            ("metadata[respostaId]", request.answer_id.clone()),
            ("metadata[respondenteId]", request.respondent_id.clone()),
            ("metadata[cobrancaId]", request.charge_id.clone()),
        ];
        if let Some(email) = &request.payer_email {
            form.push(("customer_email", email.clone()));
        }

        let session = self.create_checkout_session(&request.charge_id, &form).await?;
        let url = session
            .url
            .ok_or_else(|| AppError::Gateway("Stripe session has no checkout URL".into()))?;

        Ok(CreatedCharge {
            gateway_charge_id: session.id,
            url,
        })
    }

    async fn create_subscription(&self, request: &SubscriptionRequest) -> Result<CreatedCharge> {
        let price_id = self.premium_price_id.as_ref().ok_or_else(|| {
            AppError::ServiceUnavailable("STRIPE_PREMIUM_PRICE_ID not configured".into())
        })?;

        let mut form: Vec<(&str, String)> = vec![
            ("mode", "subscription".into()),
            ("success_url", request.success_url.clone()),
            ("cancel_url", request.cancel_url.clone()),
            ("client_reference_id", request.user_id.clone()),
            ("line_items[0][price]", price_id.clone()),
            ("line_items[0][quantity]", "1".into()),
            ("metadata[usuarioId]", request.user_id.clone()),
            ("subscription_data[metadata][usuarioId]", request.user_id.clone()),
        ];
        if let Some(email) = &request.email {
            form.push(("customer_email", email.clone()));
        }

        // One open checkout per user per hour
        let idempotency_key = format!(
            "sub_{}_{}",
            request.user_id,
            chrono::Utc::now().timestamp() / 3600
        );
        let session = self.create_checkout_session(&idempotency_key, &form).await?;
        let url = session
            .url
            .ok_or_else(|| AppError::Gateway("Stripe session has no checkout URL".into()))?;

        Ok(CreatedCharge {
            gateway_charge_id: session.id,
            url,
        })
    }

    async fn verify_status(&self, gateway_charge_id: &str) -> Result<ChargeStatus> {
        let response = self
            .client
            .get(format!(
                "{}/checkout/sessions/{}",
                self.api_base, gateway_charge_id
            ))
            .basic_auth(&self.secret_key, None::<&str>)
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("Stripe API error: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Gateway(format!(
                "Stripe API error ({}): {}",
                status, error_text
            )));
        }

        let session: CheckoutSessionResponse = response
            .json()
            .await
            .map_err(|e| AppError::Gateway(format!("Failed to parse Stripe response: {}", e)))?;

        Ok(session_status(
            session.status.as_deref(),
            session.payment_status.as_deref(),
        ))
    }

    fn verify_webhook(&self, headers: &HeaderMap, body: &[u8]) -> Result<bool> {
        let Some(signature) = headers
            .get("stripe-signature")
            .and_then(|v| v.to_str().ok())
        else {
            return Ok(false);
        };
        self.verify_webhook_signature(body, signature)
    }

    fn parse_webhook(&self, body: &[u8]) -> Result<GatewayEvent> {
        let event: StripeWebhookEvent = serde_json::from_slice(body)
            .map_err(|e| AppError::BadRequest(format!("Invalid Stripe event: {}", e)))?;
        event.normalize()
    }
}

fn session_status(status: Option<&str>, payment_status: Option<&str>) -> ChargeStatus {
    match (status, payment_status) {
        (_, Some("paid" | "no_payment_required")) => ChargeStatus::Paid,
        (Some("expired"), _) => ChargeStatus::Failed,
        _ => ChargeStatus::Pending,
    }
}

/// Generic Stripe webhook event - object is parsed based on event_type
#[derive(Debug, Deserialize)]
pub struct StripeWebhookEvent {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

// ============ checkout.session.* ============

#[derive(Debug, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: String,
    pub mode: Option<String>, // "payment" or "subscription"
    pub status: Option<String>,
    pub payment_status: Option<String>,
    pub amount_total: Option<i64>,
    pub client_reference_id: Option<String>,
    pub subscription: Option<String>, // Present for subscription mode
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

// ============ invoice.payment_failed ============

#[derive(Debug, Deserialize)]
pub struct StripeInvoice {
    pub id: String,
    pub subscription: Option<String>,
    /// Newer API versions nest the subscription under `parent`
    pub parent: Option<serde_json::Value>,
}

impl StripeInvoice {
    fn subscription_id(&self) -> Option<String> {
        self.subscription.clone().or_else(|| {
            self.parent
                .as_ref()?
                .get("subscription_details")?
                .get("subscription")?
                .as_str()
                .map(str::to_string)
        })
    }
}

// ============ customer.subscription.deleted ============

#[derive(Debug, Deserialize)]
pub struct StripeSubscription {
    pub id: String,
    pub status: Option<String>,
}

fn parse_object<T: serde::de::DeserializeOwned>(object: serde_json::Value) -> Result<T> {
    serde_json::from_value(object)
        .map_err(|e| AppError::BadRequest(format!("Invalid Stripe event object: {}", e)))
}

impl StripeWebhookEvent {
    pub fn normalize(self) -> Result<GatewayEvent> {
        match self.event_type.as_str() {
            "checkout.session.completed" => {
                let session: StripeCheckoutSession = parse_object(self.data.object)?;
                Ok(checkout_completed(session))
            }
            "checkout.session.expired" => {
                let session: StripeCheckoutSession = parse_object(self.data.object)?;
                if session.mode.as_deref() == Some("subscription") {
                    return Ok(GatewayEvent::Ignored);
                }
                Ok(GatewayEvent::PaymentFailed {
                    charge_id: session.id,
                })
            }
            "customer.subscription.deleted" => {
                let sub: StripeSubscription = parse_object(self.data.object)?;
                Ok(GatewayEvent::SubscriptionCanceled {
                    subscription_id: sub.id,
                })
            }
            "invoice.payment_failed" => {
                let invoice: StripeInvoice = parse_object(self.data.object)?;
                match invoice.subscription_id() {
                    Some(subscription_id) => {
                        Ok(GatewayEvent::SubscriptionPaymentFailed { subscription_id })
                    }
                    None => {
                        tracing::debug!("Invoice {} has no subscription, ignoring", invoice.id);
                        Ok(GatewayEvent::Ignored)
                    }
                }
            }
            other => {
                tracing::debug!("Ignoring Stripe event type: {}", other);
                Ok(GatewayEvent::Ignored)
            }
        }
    }
}

fn checkout_completed(session: StripeCheckoutSession) -> GatewayEvent {
    if session.mode.as_deref() == Some("subscription") {
        let user_id = session
            .metadata
            .get(metadata::USER_ID)
            .cloned()
            .or(session.client_reference_id);
        return match (user_id, session.subscription) {
            (Some(user_id), Some(subscription_id)) => GatewayEvent::SubscriptionActivated {
                user_id,
                subscription_id,
                plan: PREMIUM_PLAN.to_string(),
            },
            _ => {
                tracing::warn!(
                    "Subscription checkout {} missing user or subscription id",
                    session.id
                );
                GatewayEvent::Ignored
            }
        };
    }

    // Async payment methods complete the session before the money arrives
    if session_status(session.status.as_deref(), session.payment_status.as_deref())
        != ChargeStatus::Paid
    {
        tracing::info!(
            "Checkout {} completed but not paid yet (payment_status={:?})",
            session.id,
            session.payment_status
        );
        return GatewayEvent::Ignored;
    }

    GatewayEvent::PaymentConfirmed {
        charge_id: session.id,
        question_id: session.metadata.get(metadata::QUESTION_ID).cloned(),
        answer_id: session.metadata.get(metadata::ANSWER_ID).cloned(),
        amount_cents: session.amount_total,
    }
}
