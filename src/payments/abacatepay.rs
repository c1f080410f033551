use async_trait::async_trait;
use axum::http::HeaderMap;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    ChargeRequest, CreatedCharge, CreatedPayout, GatewayEvent, PaymentGateway, PaymentProvider,
    PayoutRequest, PixKeyType, json_str, metadata,
};
use crate::config::AbacatePayConfig;
use crate::crypto::{constant_time_eq, verify_hmac_hex};
use crate::error::{AppError, Result};
use crate::models::ChargeStatus;

/// Header carrying the hex HMAC-SHA256 of the raw body.
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";
/// Header carrying the shared webhook secret (legacy deliveries).
pub const SECRET_HEADER: &str = "x-webhook-secret";

// ============ API requests ============

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateBillingRequest<'a> {
    frequency: &'static str,
    methods: [&'static str; 1],
    products: [BillingProduct<'a>; 1],
    return_url: &'a str,
    completion_url: &'a str,
    metadata: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BillingProduct<'a> {
    external_id: &'a str,
    name: &'a str,
    quantity: u32,
    price: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateWithdrawRequest<'a> {
    external_id: &'a str,
    method: &'static str,
    amount: i64,
    pix: PixDestination<'a>,
    description: &'a str,
}

#[derive(Debug, Serialize)]
struct PixDestination<'a> {
    #[serde(rename = "type")]
    key_type: PixKeyType,
    key: &'a str,
}

// ============ API responses ============

/// Every AbacatePay response wraps its payload as `{ data, error }`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Billing {
    id: String,
    url: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Withdraw {
    id: String,
}

#[derive(Debug, Clone)]
pub struct AbacatePayGateway {
    client: Client,
    api_key: String,
    webhook_secret: String,
    api_base: String,
}

impl AbacatePayGateway {
    pub fn new(config: &AbacatePayConfig) -> Self {
        Self {
            client: Client::new(),
            api_key: config.api_key.clone(),
            webhook_secret: config.webhook_secret.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
        }
    }

    async fn read_envelope<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Gateway(format!(
                "AbacatePay API error ({}): {}",
                status, error_text
            )));
        }

        let envelope: Envelope<T> = response.json().await.map_err(|e| {
            AppError::Gateway(format!("Failed to parse AbacatePay response: {}", e))
        })?;

        match (envelope.data, envelope.error) {
            (_, Some(error)) if !error.is_null() => Err(AppError::Gateway(format!(
                "AbacatePay API error: {}",
                error
            ))),
            (Some(data), _) => Ok(data),
            (None, _) => Err(AppError::Gateway("AbacatePay response has no data".into())),
        }
    }

    async fn post<B: Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let response = self
            .client
            .post(format!("{}{}", self.api_base, path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("AbacatePay API error: {}", e)))?;
        Self::read_envelope(response).await
    }
}

fn billing_status(status: Option<&str>) -> ChargeStatus {
    match status.map(|s| s.to_ascii_uppercase()).as_deref() {
        Some("PAID") => ChargeStatus::Paid,
        Some("EXPIRED" | "CANCELLED" | "REFUNDED") => ChargeStatus::Failed,
        _ => ChargeStatus::Pending,
    }
}

#[async_trait]
impl PaymentGateway for AbacatePayGateway {
    fn kind(&self) -> PaymentProvider {
        PaymentProvider::AbacatePay
    }

    async fn create_charge(&self, request: &ChargeRequest) -> Result<CreatedCharge> {
        let body = CreateBillingRequest {
            frequency: "ONE_TIME",
            methods: ["PIX"],
            products: [BillingProduct {
                external_id: &request.charge_id,
                name: &request.description,
                quantity: 1,
                price: request.amount_cents,
            }],
            return_url: &request.cancel_url,
            completion_url: &request.success_url,
            metadata: serde_json::json!({
                (metadata::QUESTION_ID): request.question_id,
                (metadata::ANSWER_ID): request.answer_id,
                (metadata::RESPONDENT_ID): request.respondent_id,
                (metadata::CHARGE_ID): request.charge_id,
            }),
        };

        let billing: Billing = self.post("/billing/create", &body).await?;
        let url = billing
            .url
            .ok_or_else(|| AppError::Gateway("AbacatePay billing has no URL".into()))?;

        Ok(CreatedCharge {
            gateway_charge_id: billing.id,
            url,
        })
    }

    async fn create_payout(&self, request: &PayoutRequest) -> Result<CreatedPayout> {
        let body = CreateWithdrawRequest {
            external_id: &request.external_id,
            method: "PIX",
            amount: request.amount_cents,
            pix: PixDestination {
                key_type: request.pix_key_type,
                key: &request.pix_key,
            },
            description: &request.description,
        };

        let withdraw: Withdraw = self.post("/withdraw/create", &body).await?;
        Ok(CreatedPayout {
            payout_id: withdraw.id,
        })
    }

    async fn verify_status(&self, gateway_charge_id: &str) -> Result<ChargeStatus> {
        let response = self
            .client
            .get(format!("{}/billing/list", self.api_base))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("AbacatePay API error: {}", e)))?;

        let billings: Vec<Billing> = Self::read_envelope(response).await?;
        let status = billings
            .iter()
            .find(|b| b.id == gateway_charge_id)
            .map(|b| billing_status(b.status.as_deref()));

        match status {
            Some(status) => Ok(status),
            None => {
                tracing::warn!("AbacatePay billing {} not found", gateway_charge_id);
                Ok(ChargeStatus::Pending)
            }
        }
    }

    fn verify_webhook(&self, headers: &HeaderMap, body: &[u8]) -> Result<bool> {
        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

        if let Some(signature) = header(SIGNATURE_HEADER) {
            return verify_hmac_hex(self.webhook_secret.as_bytes(), body, signature);
        }
        if let Some(secret) = header(SECRET_HEADER) {
            return Ok(constant_time_eq(
                self.webhook_secret.as_bytes(),
                secret.as_bytes(),
            ));
        }
        Ok(false)
    }

    fn parse_webhook(&self, body: &[u8]) -> Result<GatewayEvent> {
        let event: AbacatePayWebhookEvent = serde_json::from_slice(body)
            .map_err(|e| AppError::BadRequest(format!("Invalid AbacatePay event: {}", e)))?;
        Ok(event.normalize())
    }
}

/// Webhook envelope: `{ "event": "billing.paid", "data": { ... } }`
#[derive(Debug, Deserialize)]
pub struct AbacatePayWebhookEvent {
    pub event: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default, rename = "devMode")]
    pub dev_mode: bool,
}

impl AbacatePayWebhookEvent {
    pub fn normalize(self) -> GatewayEvent {
        if self.dev_mode {
            tracing::debug!("AbacatePay dev mode event: {}", self.event);
        }

        match self.event.as_str() {
            "billing.paid" => self.payment_confirmed("billing"),
            "pix.paid" => self.payment_confirmed("pixQrCode"),
            "withdraw.paid" => {
                let withdraw = self
                    .data
                    .get("withdraw")
                    .or_else(|| self.data.get("transaction"))
                    .unwrap_or(&self.data);
                match json_str(withdraw, "id") {
                    Some(payout_id) => GatewayEvent::PayoutCompleted {
                        payout_id,
                        external_id: json_str(withdraw, "externalId"),
                    },
                    None => {
                        tracing::warn!("AbacatePay withdraw.paid without id");
                        GatewayEvent::Ignored
                    }
                }
            }
            other => {
                tracing::debug!("Ignoring AbacatePay event type: {}", other);
                GatewayEvent::Ignored
            }
        }
    }

    fn payment_confirmed(&self, object_key: &str) -> GatewayEvent {
        let object = self.data.get(object_key).unwrap_or(&self.data);
        let Some(charge_id) = json_str(object, "id") else {
            tracing::warn!("AbacatePay {} without id", self.event);
            return GatewayEvent::Ignored;
        };

        let meta = object.get("metadata").unwrap_or(&Value::Null);
        let amount_cents = object
            .get("paidAmount")
            .or_else(|| object.get("amount"))
            .and_then(Value::as_i64);

        GatewayEvent::PaymentConfirmed {
            charge_id,
            question_id: json_str(meta, metadata::QUESTION_ID),
            answer_id: json_str(meta, metadata::ANSWER_ID),
            amount_cents,
        }
    }
}
