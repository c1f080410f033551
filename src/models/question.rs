use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use crate::util::reais;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum QuestionStatus {
    Open,
    Answered,
    Closed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    #[serde(rename = "usuarioId")]
    pub owner_id: String,
    #[serde(rename = "texto")]
    pub text: String,
    /// Reward paid for the accepted answer, in cents
    #[serde(rename = "valor", with = "reais")]
    pub reward_cents: i64,
    pub status: QuestionStatus,
    #[serde(rename = "respostaAceitaId")]
    pub accepted_answer_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Question {
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.owner_id == user_id
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateQuestion {
    pub texto: String,
    #[serde(with = "reais")]
    pub valor: i64,
}
