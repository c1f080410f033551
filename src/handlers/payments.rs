//! POST /pagamento and POST /pagamento/verificar.

use axum::{extract::State, response::Json};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::db::{AppState, queries};
use crate::email::{Notification, spawn_notification};
use crate::error::{AppError, OptionExt, Result, msg};
use crate::extractors::Json as JsonBody;
use crate::id::is_valid_prefixed_id;
use crate::ledger::{self, ConfirmationOutcome, PaymentConfirmation};
use crate::models::{
    Answer, Charge, ChargeStatus, CreateCharge, PaymentMethod, Question, QuestionStatus,
};
use crate::payments::{ChargeRequest, PaymentProvider};
use crate::util::reais;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub pergunta_id: String,
    pub resposta_id: String,
    #[serde(with = "reais")]
    pub valor: i64,
    pub metodo_pagamento: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponse {
    pub url: String,
    pub gateway: PaymentProvider,
    pub metodo: PaymentMethod,
    pub cobranca_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentRequest {
    pub pergunta_id: String,
    pub resposta_id: String,
    pub billing_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifyStatus {
    Paid,
    Pending,
    Failed,
}

#[derive(Debug, Serialize)]
pub struct VerifyPaymentResponse {
    pub status: VerifyStatus,
    pub message: &'static str,
}

impl VerifyPaymentResponse {
    fn paid() -> Json<Self> {
        Json(Self {
            status: VerifyStatus::Paid,
            message: "Payment confirmed",
        })
    }

    fn pending() -> Json<Self> {
        Json(Self {
            status: VerifyStatus::Pending,
            message: "Payment not confirmed yet",
        })
    }

    fn failed() -> Json<Self> {
        Json(Self {
            status: VerifyStatus::Failed,
            message: "Payment failed or expired; start a new payment",
        })
    }
}

/// Load a question the caller owns. Missing and foreign questions both
/// answer 403 so existence is never revealed.
pub(crate) fn owned_question(conn: &Connection, question_id: &str, user_id: &str) -> Result<Question> {
    if !is_valid_prefixed_id(question_id) {
        return Err(AppError::Forbidden);
    }
    let question = queries::get_question_by_id(conn, question_id)?.or_forbidden()?;
    if !question.is_owned_by(user_id) {
        return Err(AppError::Forbidden);
    }
    Ok(question)
}

fn answer_of(conn: &Connection, question: &Question, answer_id: &str) -> Result<Answer> {
    let answer = if is_valid_prefixed_id(answer_id) {
        queries::get_answer_by_id(conn, answer_id)?
    } else {
        None
    };
    answer
        .filter(|a| a.question_id == question.id)
        .or_not_found(msg::ANSWER_NOT_FOUND)
}

pub async fn create_payment(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(req): JsonBody<PaymentRequest>,
) -> Result<Json<PaymentResponse>> {
    if req.valor <= 0 {
        return Err(AppError::BadRequest(msg::AMOUNT_MUST_BE_POSITIVE.into()));
    }
    let method: PaymentMethod = req
        .metodo_pagamento
        .trim()
        .to_lowercase()
        .parse()
        .map_err(|_| AppError::BadRequest(msg::INVALID_PAYMENT_METHOD.into()))?;

    let (question, answer, charge) = {
        let conn = state.db.get()?;
        let question = owned_question(&conn, &req.pergunta_id, user.id())?;
        let answer = answer_of(&conn, &question, &req.resposta_id)?;

        if answer.payment_confirmed {
            return Err(AppError::Conflict(msg::ANSWER_ALREADY_PAID.into()));
        }
        if question.status != QuestionStatus::Open {
            return Err(AppError::Conflict(msg::QUESTION_NOT_OPEN.into()));
        }
        if req.valor != question.reward_cents {
            return Err(AppError::BadRequest(msg::AMOUNT_MISMATCH.into()));
        }

        // Fail before recording anything if the provider is down
        state.gateways.get(method.provider())?;

        let charge = queries::create_charge(
            &conn,
            &CreateCharge {
                question_id: question.id.clone(),
                answer_id: answer.id.clone(),
                payer_id: user.id().to_string(),
                method,
                amount_cents: question.reward_cents,
            },
        )?;
        (question, answer, charge)
    };

    let gateway = state.gateways.get(method.provider())?;
    let return_url = format!("{}/pergunta/{}", state.base_url, question.id);
    let created = gateway
        .create_charge(&ChargeRequest {
            charge_id: charge.id.clone(),
            question_id: question.id.clone(),
            answer_id: answer.id.clone(),
            respondent_id: answer.author_id.clone(),
            payer_email: user.0.email.clone(),
            amount_cents: charge.amount_cents,
            description: format!("Resposta para a pergunta {}", question.id),
            success_url: format!("{}?pagamento=sucesso&respostaId={}", return_url, answer.id),
            cancel_url: format!("{}?pagamento=cancelado", return_url),
        })
        .await;

    let conn = state.db.get()?;
    let created = match created {
        Ok(created) => created,
        Err(e) => {
            queries::set_charge_status(&conn, &charge.id, ChargeStatus::Failed)?;
            return Err(e);
        }
    };
    queries::set_charge_gateway_ref(&conn, &charge.id, &created.gateway_charge_id, &created.url)?;

    tracing::info!(
        charge_id = %charge.id,
        gateway_charge_id = %created.gateway_charge_id,
        gateway = charge.gateway.as_ref(),
        "Charge created"
    );

    Ok(Json(PaymentResponse {
        url: created.url,
        gateway: charge.gateway,
        metodo: method,
        cobranca_id: charge.id,
    }))
}

/// Find the charge to verify: the one named by `billingId`, or the most
/// recent one created for the answer.
fn charge_to_verify(
    conn: &Connection,
    answer: &Answer,
    billing_id: Option<&str>,
) -> Result<Charge> {
    let charge = match billing_id.map(str::trim).filter(|b| !b.is_empty()) {
        Some(billing_id) => {
            let mut found = None;
            for provider in [PaymentProvider::Stripe, PaymentProvider::AbacatePay] {
                found = queries::get_charge_by_gateway_charge_id(conn, provider, billing_id)?;
                if found.is_some() {
                    break;
                }
            }
            found
        }
        None => queries::get_latest_charge_for_answer(conn, &answer.question_id, &answer.id)?,
    };
    charge
        .filter(|c| c.answer_id == answer.id)
        .or_not_found(msg::CHARGE_NOT_FOUND)
}

pub async fn verify_payment(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(req): JsonBody<VerifyPaymentRequest>,
) -> Result<Json<VerifyPaymentResponse>> {
    let charge = {
        let conn = state.db.get()?;
        let question = owned_question(&conn, &req.pergunta_id, user.id())?;
        let answer = answer_of(&conn, &question, &req.resposta_id)?;
        if answer.payment_confirmed {
            return Ok(VerifyPaymentResponse::paid());
        }
        charge_to_verify(&conn, &answer, req.billing_id.as_deref())?
    };

    let Some(gateway_charge_id) = charge.gateway_charge_id.clone() else {
        // Creation never reached the gateway
        return Ok(VerifyPaymentResponse::failed());
    };

    let gateway = state.gateways.get(charge.gateway)?;
    let status = gateway.verify_status(&gateway_charge_id).await?;

    let mut conn = state.db.get()?;
    match status {
        ChargeStatus::Pending => Ok(VerifyPaymentResponse::pending()),
        ChargeStatus::Failed => {
            ledger::record_charge_failure(&conn, charge.gateway, &gateway_charge_id)?;
            Ok(VerifyPaymentResponse::failed())
        }
        ChargeStatus::Paid => {
            let outcome = ledger::apply_payment_confirmation(
                &mut conn,
                &PaymentConfirmation {
                    provider: charge.gateway,
                    gateway_charge_id,
                    question_id: Some(charge.question_id.clone()),
                    answer_id: Some(charge.answer_id.clone()),
                    amount_cents: None,
                },
            )?;
            match outcome {
                ConfirmationOutcome::Credited { .. } => {
                    notify_credited(&state, &conn, &outcome);
                    Ok(VerifyPaymentResponse::paid())
                }
                ConfirmationOutcome::AlreadyProcessed => Ok(VerifyPaymentResponse::paid()),
                ConfirmationOutcome::QuestionNotOpen => {
                    Err(AppError::Conflict(msg::QUESTION_NOT_OPEN.into()))
                }
                ConfirmationOutcome::Unmatched => Err(AppError::Internal(format!(
                    "Verified charge {} did not match its answer",
                    charge.id
                ))),
            }
        }
    }
}

/// Tell both parties about a credited payment. Never fails the caller.
pub(crate) fn notify_credited(state: &AppState, conn: &Connection, outcome: &ConfirmationOutcome) {
    let ConfirmationOutcome::Credited {
        transaction,
        split,
        asker_id,
        respondent_id,
        ..
    } = outcome
    else {
        return;
    };

    let email_of = |user_id: &str| match queries::get_user_by_id(conn, user_id) {
        Ok(user) => user.and_then(|u| u.email),
        Err(e) => {
            tracing::warn!("Could not load user for notification: {}", e);
            None
        }
    };

    if let Some(to) = email_of(asker_id) {
        spawn_notification(
            state.notifier.clone(),
            Notification::payment_sent(&to, split.gross),
        );
    }
    if let Some(to) = email_of(respondent_id) {
        spawn_notification(
            state.notifier.clone(),
            Notification::payment_received(&to, transaction.net_cents, split.rate.percent()),
        );
    }
}
