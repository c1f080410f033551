use serde::Serialize;
use strum::{AsRefStr, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Canceled,
    PaymentFailed,
}

/// Premium tier subscription. Only `Active` grants the reduced fee.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    #[serde(rename = "usuarioId")]
    pub user_id: String,
    pub status: SubscriptionStatus,
    #[serde(rename = "plano")]
    pub plan: String,
    /// Gateway subscription ID (sub_xxx)
    #[serde(rename = "assinaturaExternaId")]
    pub external_id: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Subscription {
    pub fn is_premium(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }
}
