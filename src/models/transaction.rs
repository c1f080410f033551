use serde::{Serialize, Serializer};
use strum::{AsRefStr, EnumString};

use crate::util::{reais, reais_opt};

/// Direction of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransactionKind {
    /// Answer payout credited to the respondent
    Credit,
    /// Withdrawal to the user's bank account
    Debit,
}

/// Credits are born completed. Debits start pending and move to completed
/// when the payout gateway confirms, or to failed when the payout could not
/// be created (the debit is then compensated).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

/// Append-only ledger entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    #[serde(rename = "usuarioId")]
    pub user_id: String,
    #[serde(rename = "tipo")]
    pub kind: TransactionKind,

    // Amounts (cents)
    #[serde(rename = "valorBruto", with = "reais")]
    pub gross_cents: i64,
    /// Amount after the platform fee
    #[serde(rename = "valor", with = "reais")]
    pub net_cents: i64,
    #[serde(rename = "taxa", with = "reais")]
    pub fee_cents: i64,
    /// Fee rate in basis points (1500 = 15%)
    #[serde(rename = "taxaPercentual", serialize_with = "bps_as_percent")]
    pub fee_bps: i64,

    // Links
    #[serde(rename = "perguntaId")]
    pub question_id: Option<String>,
    #[serde(rename = "respostaId")]
    pub answer_id: Option<String>,
    /// Payout ID assigned by the gateway (debits only)
    pub gateway_id: Option<String>,

    pub status: TransactionStatus,
    pub created_at: i64,
}

impl Transaction {
    pub fn fee_percent(&self) -> f64 {
        self.fee_bps as f64 / 100.0
    }
}

fn bps_as_percent<S: Serializer>(bps: &i64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(*bps as f64 / 100.0)
}

/// Data required to append a ledger entry.
#[derive(Debug, Clone)]
pub struct CreateTransaction {
    pub user_id: String,
    pub kind: TransactionKind,
    pub gross_cents: i64,
    pub net_cents: i64,
    pub fee_cents: i64,
    pub fee_bps: i64,
    pub question_id: Option<String>,
    pub answer_id: Option<String>,
    pub gateway_id: Option<String>,
    pub status: TransactionStatus,
}

/// Withdrawal view returned by POST /saque.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalReceipt {
    pub id: String,
    pub status: TransactionStatus,
    #[serde(with = "reais")]
    pub valor_bruto: i64,
    #[serde(with = "reais")]
    pub valor_liquido: i64,
    #[serde(with = "reais")]
    pub taxa: i64,
    pub taxa_percentual: f64,
    pub gateway_id: Option<String>,
    #[serde(with = "reais_opt", skip_serializing_if = "Option::is_none")]
    pub saldo_disponivel: Option<i64>,
    pub created_at: i64,
}

impl From<&Transaction> for WithdrawalReceipt {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: tx.id.clone(),
            status: tx.status,
            valor_bruto: tx.gross_cents,
            valor_liquido: tx.net_cents,
            taxa: tx.fee_cents,
            taxa_percentual: tx.fee_percent(),
            gateway_id: tx.gateway_id.clone(),
            saldo_disponivel: None,
            created_at: tx.created_at,
        }
    }
}
