//! POST /saque

use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::db::{AppState, queries};
use crate::email::{Notification, spawn_notification};
use crate::error::{AppError, Result, msg};
use crate::extractors::Json as JsonBody;
use crate::ledger::{self, WithdrawalRequest};
use crate::models::WithdrawalReceipt;
use crate::payments::PixKeyType;
use crate::util::reais;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalBody {
    pub usuario_id: String,
    #[serde(with = "reais")]
    pub valor: i64,
    pub chave_pix: String,
    pub tipo_chave: String,
}

#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    pub data: T,
}

pub async fn request_withdrawal(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(body): JsonBody<WithdrawalBody>,
) -> Result<Json<DataResponse<WithdrawalReceipt>>> {
    if body.usuario_id != user.id() {
        return Err(AppError::Forbidden);
    }
    if body.valor <= 0 {
        return Err(AppError::BadRequest(msg::AMOUNT_MUST_BE_POSITIVE.into()));
    }
    let pix_key = body.chave_pix.trim();
    if pix_key.is_empty() {
        return Err(AppError::BadRequest("chavePix is required".into()));
    }
    let pix_key_type: PixKeyType = body
        .tipo_chave
        .trim()
        .to_uppercase()
        .parse()
        .map_err(|_| AppError::BadRequest(msg::INVALID_PIX_KEY_TYPE.into()))?;

    let gateway = state.gateways.payouts()?;

    let debit = ledger::request_withdrawal(
        &state.db,
        gateway.as_ref(),
        &WithdrawalRequest {
            user_id: user.id().to_string(),
            amount_cents: body.valor,
            pix_key: pix_key.to_string(),
            pix_key_type,
        },
    )
    .await?;

    let conn = state.db.get()?;
    let mut receipt = WithdrawalReceipt::from(&debit);
    receipt.saldo_disponivel = queries::get_balance(&conn, user.id())?.map(|b| b.available_cents);

    if let Some(email) = user.0.email.as_deref() {
        spawn_notification(
            state.notifier.clone(),
            Notification::withdrawal_requested(email, debit.net_cents),
        );
    }

    Ok(Json(DataResponse { data: receipt }))
}
