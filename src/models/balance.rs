use serde::Serialize;

use crate::util::reais;

/// A user's ledger totals. `available = earned - withdrawn` at every
/// committed state; in-flight withdrawals are already counted in `withdrawn`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    #[serde(rename = "usuarioId")]
    pub user_id: String,
    #[serde(rename = "disponivel", with = "reais")]
    pub available_cents: i64,
    #[serde(rename = "totalRecebido", with = "reais")]
    pub earned_cents: i64,
    #[serde(rename = "totalSacado", with = "reais")]
    pub withdrawn_cents: i64,
    pub updated_at: i64,
}

impl Balance {
    /// Zero balance for users that were never credited.
    pub fn empty(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            available_cents: 0,
            earned_cents: 0,
            withdrawn_cents: 0,
            updated_at: 0,
        }
    }
}
