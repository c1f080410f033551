//! Prefixed ID generation for QuestionGo entities.
//!
//! Users are identified by the identity provider's uid; everything created
//! by this service gets a `qg_` prefixed ID so it never collides with
//! gateway IDs (Stripe's `cs_`, `sub_`, AbacatePay's `bill_`, ...).
//!
//! Format: `qg_{entity}_{uuid_simple}` (32 hex chars, no hyphens)

use uuid::Uuid;

const ALL_PREFIXES: &[&str] = &["qg_perg_", "qg_resp_", "qg_txn_", "qg_cob_"];

/// Cheap format check to reject garbage before hitting the database.
pub fn is_valid_prefixed_id(s: &str) -> bool {
    let Some(prefix) = ALL_PREFIXES.iter().find(|p| s.starts_with(*p)) else {
        return false;
    };

    let hex_part = &s[prefix.len()..];
    hex_part.len() == 32 && hex_part.chars().all(|c| c.is_ascii_hexdigit())
}

#[derive(Debug, Clone, Copy)]
pub enum EntityType {
    Question,
    Answer,
    Transaction,
    Charge,
}

impl EntityType {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Question => "qg_perg",
            Self::Answer => "qg_resp",
            Self::Transaction => "qg_txn",
            Self::Charge => "qg_cob",
        }
    }

    pub fn gen_id(&self) -> String {
        format!("{}_{}", self.prefix(), Uuid::new_v4().as_simple())
    }
}
