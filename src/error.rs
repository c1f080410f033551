use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Shared user-facing messages.
pub mod msg {
    pub const NOT_PERMITTED: &str = "Not permitted";
    pub const QUESTION_NOT_FOUND: &str = "Question not found";
    pub const ANSWER_NOT_FOUND: &str = "Answer not found";
    pub const CHARGE_NOT_FOUND: &str = "No charge found for this answer";
    pub const ANSWER_ALREADY_PAID: &str = "Answer has already been paid";
    pub const QUESTION_NOT_OPEN: &str = "Question is not open";
    pub const INSUFFICIENT_BALANCE: &str = "Insufficient balance";
    pub const AMOUNT_MUST_BE_POSITIVE: &str = "valor must be greater than zero";
    pub const AMOUNT_OUT_OF_RANGE: &str = "valor must be a finite number up to 1000000.00";
    pub const AMOUNT_MISMATCH: &str = "valor does not match the question reward";
    pub const INVALID_PAYMENT_METHOD: &str = "metodoPagamento must be 'cartao' or 'pix'";
    pub const INVALID_PIX_KEY_TYPE: &str =
        "tipoChave must be one of CPF, CNPJ, EMAIL, PHONE, RANDOM";
    pub const GATEWAY_FAILURE: &str = "Payment provider unavailable, please try again later";
    pub const GATEWAY_UNAVAILABLE: &str = "Payment provider not configured";
    pub const AUTH_UNAVAILABLE: &str = "Authentication not configured";
    pub const INVALID_WEBHOOK_SECRET: &str = "Invalid webhook secret";
    pub const OWN_QUESTION_ANSWER: &str = "You cannot answer your own question";
    pub const PAYOUT_UNSUPPORTED: &str = "Payouts are not supported by this provider";
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Token validation failed: {0}")]
    TokenValidation(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl From<axum::extract::rejection::JsonRejection> for AppError {
    fn from(rejection: axum::extract::rejection::JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "Not found", Some(msg.clone())),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "Bad request", Some(msg.clone())),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized", None),
            AppError::Forbidden => (
                StatusCode::FORBIDDEN,
                "Forbidden",
                Some(msg::NOT_PERMITTED.to_string()),
            ),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "Conflict", Some(msg.clone())),
            AppError::ServiceUnavailable(msg) => {
                tracing::error!("Service unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, "Service unavailable", None)
            }
            AppError::Gateway(msg) => {
                tracing::error!("Gateway error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error",
                    Some(msg::GATEWAY_FAILURE.to_string()),
                )
            }
            AppError::TokenValidation(msg) => {
                tracing::debug!("Token rejected: {}", msg);
                (StatusCode::UNAUTHORIZED, "Unauthorized", None)
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
            AppError::Json(e) => {
                tracing::error!("JSON error: {}", e);
                (StatusCode::BAD_REQUEST, "Invalid JSON", Some(e.to_string()))
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Converts a missing lookup into the matching error.
pub trait OptionExt<T> {
    fn or_not_found(self, msg: &str) -> Result<T>;
    fn or_forbidden(self) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn or_not_found(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| AppError::NotFound(msg.to_string()))
    }

    fn or_forbidden(self) -> Result<T> {
        self.ok_or(AppError::Forbidden)
    }
}
