use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AnswerStatus {
    Pending,
    Accepted,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub id: String,
    #[serde(rename = "perguntaId")]
    pub question_id: String,
    #[serde(rename = "usuarioId")]
    pub author_id: String,
    #[serde(rename = "texto")]
    pub text: String,
    pub status: AnswerStatus,
    #[serde(rename = "pagamentoConfirmado")]
    pub payment_confirmed: bool,
    /// Set by the external moderation service; stored as-is.
    #[serde(rename = "verificada")]
    pub verified: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateAnswer {
    pub texto: String,
}
