//! Payment gateways behind one normalized capability.
//!
//! Handlers and the ledger only see [`PaymentGateway`] and [`GatewayEvent`];
//! each provider module owns its native request and webhook shapes.

mod abacatepay;
mod stripe;

pub use abacatepay::AbacatePayGateway;
pub use stripe::StripeGateway;

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use crate::config::Config;
use crate::error::{AppError, Result, msg};
use crate::models::ChargeStatus;

/// Metadata keys attached to gateway charges and echoed back in webhooks.
pub mod metadata {
    pub const QUESTION_ID: &str = "perguntaId";
    pub const ANSWER_ID: &str = "respostaId";
    pub const RESPONDENT_ID: &str = "respondenteId";
    pub const CHARGE_ID: &str = "cobrancaId";
    pub const USER_ID: &str = "usuarioId";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PaymentProvider {
    /// Cards and premium subscriptions
    Stripe,
    /// PIX charges and payouts
    AbacatePay,
}

/// A one-off charge for an answer.
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    /// Our charge ID; sent as the gateway idempotency key
    pub charge_id: String,
    pub question_id: String,
    pub answer_id: String,
    pub respondent_id: String,
    pub payer_email: Option<String>,
    pub amount_cents: i64,
    pub description: String,
    pub success_url: String,
    pub cancel_url: String,
}

/// A premium plan subscription checkout.
#[derive(Debug, Clone)]
pub struct SubscriptionRequest {
    pub user_id: String,
    pub email: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone)]
pub struct CreatedCharge {
    pub gateway_charge_id: String,
    /// Hosted checkout page the payer is redirected to
    pub url: String,
}

/// PIX key types accepted for payouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum PixKeyType {
    Cpf,
    Cnpj,
    Email,
    Phone,
    Random,
}

/// Transfer of a user's funds to their bank account.
#[derive(Debug, Clone)]
pub struct PayoutRequest {
    /// Our debit transaction ID, echoed back on confirmation
    pub external_id: String,
    /// Amount that reaches the user (after the withdrawal fee)
    pub amount_cents: i64,
    pub pix_key: String,
    pub pix_key_type: PixKeyType,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct CreatedPayout {
    pub payout_id: String,
}

/// Provider-agnostic webhook event.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    /// A charge was paid. Metadata may be missing on some gateways; the
    /// ledger falls back to the local charge record.
    PaymentConfirmed {
        charge_id: String,
        question_id: Option<String>,
        answer_id: Option<String>,
        amount_cents: Option<i64>,
    },
    /// A charge expired or was refused
    PaymentFailed { charge_id: String },
    /// A withdrawal reached the user's account
    PayoutCompleted {
        payout_id: String,
        external_id: Option<String>,
    },
    SubscriptionActivated {
        user_id: String,
        subscription_id: String,
        plan: String,
    },
    SubscriptionCanceled { subscription_id: String },
    SubscriptionPaymentFailed { subscription_id: String },
    /// Event type not relevant to the ledger
    Ignored,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn kind(&self) -> PaymentProvider;

    async fn create_charge(&self, request: &ChargeRequest) -> Result<CreatedCharge>;

    async fn create_subscription(&self, _request: &SubscriptionRequest) -> Result<CreatedCharge> {
        Err(AppError::ServiceUnavailable(format!(
            "{} does not sell subscriptions",
            self.kind().as_ref()
        )))
    }

    async fn create_payout(&self, _request: &PayoutRequest) -> Result<CreatedPayout> {
        Err(AppError::ServiceUnavailable(msg::PAYOUT_UNSUPPORTED.into()))
    }

    /// Current state of a charge at the gateway.
    async fn verify_status(&self, gateway_charge_id: &str) -> Result<ChargeStatus>;

    /// Authenticate a webhook delivery. Must run before `parse_webhook`.
    fn verify_webhook(&self, headers: &HeaderMap, body: &[u8]) -> Result<bool>;

    fn parse_webhook(&self, body: &[u8]) -> Result<GatewayEvent>;
}

/// Configured gateways. A missing entry means the provider is unavailable.
#[derive(Clone, Default)]
pub struct Gateways {
    pub stripe: Option<Arc<dyn PaymentGateway>>,
    pub abacatepay: Option<Arc<dyn PaymentGateway>>,
}

impl Gateways {
    pub fn from_config(config: &Config) -> Self {
        Self {
            stripe: config
                .stripe
                .as_ref()
                .map(|c| Arc::new(StripeGateway::new(c)) as Arc<dyn PaymentGateway>),
            abacatepay: config
                .abacatepay
                .as_ref()
                .map(|c| Arc::new(AbacatePayGateway::new(c)) as Arc<dyn PaymentGateway>),
        }
    }

    pub fn get(&self, provider: PaymentProvider) -> Result<Arc<dyn PaymentGateway>> {
        let gateway = match provider {
            PaymentProvider::Stripe => self.stripe.as_ref(),
            PaymentProvider::AbacatePay => self.abacatepay.as_ref(),
        };
        gateway.cloned().ok_or_else(|| {
            AppError::ServiceUnavailable(format!(
                "{}: {}",
                msg::GATEWAY_UNAVAILABLE,
                provider.as_ref()
            ))
        })
    }

    /// Gateway used for withdrawals (PIX transfers).
    pub fn payouts(&self) -> Result<Arc<dyn PaymentGateway>> {
        self.get(PaymentProvider::AbacatePay)
    }
}

/// Read a string from a JSON object, treating empty strings as absent.
pub(crate) fn json_str(value: &serde_json::Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
