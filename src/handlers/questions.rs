//! Question and answer lifecycle up to payment.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};

use crate::auth::AuthUser;
use crate::db::{AppState, queries};
use crate::error::{AppError, OptionExt, Result, msg};
use crate::extractors::Json as JsonBody;
use crate::id::is_valid_prefixed_id;
use crate::models::{Answer, CreateAnswer, CreateQuestion, Question, QuestionStatus};

use super::payments::owned_question;

pub async fn create_question(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(input): JsonBody<CreateQuestion>,
) -> Result<(StatusCode, Json<Question>)> {
    if input.texto.trim().is_empty() {
        return Err(AppError::BadRequest("texto is required".into()));
    }
    if input.valor <= 0 {
        return Err(AppError::BadRequest(msg::AMOUNT_MUST_BE_POSITIVE.into()));
    }

    let conn = state.db.get()?;
    let question = queries::create_question(&conn, user.id(), &input)?;
    tracing::info!(question_id = %question.id, reward = question.reward_cents, "Question created");

    Ok((StatusCode::CREATED, Json(question)))
}

pub async fn create_answer(
    State(state): State<AppState>,
    user: AuthUser,
    Path(question_id): Path<String>,
    JsonBody(input): JsonBody<CreateAnswer>,
) -> Result<(StatusCode, Json<Answer>)> {
    if input.texto.trim().is_empty() {
        return Err(AppError::BadRequest("texto is required".into()));
    }

    let conn = state.db.get()?;
    let question = if is_valid_prefixed_id(&question_id) {
        queries::get_question_by_id(&conn, &question_id)?
    } else {
        None
    }
    .or_not_found(msg::QUESTION_NOT_FOUND)?;

    if question.is_owned_by(user.id()) {
        return Err(AppError::BadRequest(msg::OWN_QUESTION_ANSWER.into()));
    }
    if question.status != QuestionStatus::Open {
        return Err(AppError::Conflict(msg::QUESTION_NOT_OPEN.into()));
    }

    let answer = queries::create_answer(&conn, &question.id, user.id(), &input)?;
    tracing::info!(question_id = %question.id, answer_id = %answer.id, "Answer submitted");

    Ok((StatusCode::CREATED, Json(answer)))
}

/// Close a question that was never paid for.
pub async fn close_question(
    State(state): State<AppState>,
    user: AuthUser,
    Path(question_id): Path<String>,
) -> Result<Json<Question>> {
    let conn = state.db.get()?;
    let question = owned_question(&conn, &question_id, user.id())?;

    if !queries::close_question(&conn, &question.id)? {
        return Err(AppError::Conflict(msg::QUESTION_NOT_OPEN.into()));
    }

    let question = queries::get_question_by_id(&conn, &question.id)?
        .or_not_found(msg::QUESTION_NOT_FOUND)?;
    tracing::info!(question_id = %question.id, "Question closed");
    Ok(Json(question))
}

/// Answers submitted to a question, oldest first.
pub async fn list_answers(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(question_id): Path<String>,
) -> Result<Json<Vec<Answer>>> {
    let conn = state.db.get()?;
    let question = if is_valid_prefixed_id(&question_id) {
        queries::get_question_by_id(&conn, &question_id)?
    } else {
        None
    }
    .or_not_found(msg::QUESTION_NOT_FOUND)?;

    Ok(Json(queries::list_answers_for_question(&conn, &question.id)?))
}
