use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use crate::payments::PaymentProvider;
use crate::util::reais;

/// How the asker pays: card via Stripe, PIX via AbacatePay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PaymentMethod {
    Cartao,
    Pix,
}

impl PaymentMethod {
    pub fn provider(&self) -> PaymentProvider {
        match self {
            Self::Cartao => PaymentProvider::Stripe,
            Self::Pix => PaymentProvider::AbacatePay,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChargeStatus {
    Pending,
    Paid,
    Failed,
}

/// A charge created at a gateway for one answer. Our ID doubles as the
/// gateway idempotency key, so verification never needs metadata scans.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Charge {
    pub id: String,
    #[serde(rename = "perguntaId")]
    pub question_id: String,
    #[serde(rename = "respostaId")]
    pub answer_id: String,
    #[serde(rename = "pagadorId")]
    pub payer_id: String,
    pub gateway: PaymentProvider,
    #[serde(rename = "metodo")]
    pub method: PaymentMethod,
    #[serde(rename = "valor", with = "reais")]
    pub amount_cents: i64,
    #[serde(rename = "billingId")]
    pub gateway_charge_id: Option<String>,
    pub url: Option<String>,
    pub status: ChargeStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

pub struct CreateCharge {
    pub question_id: String,
    pub answer_id: String,
    pub payer_id: String,
    pub method: PaymentMethod,
    pub amount_cents: i64,
}
