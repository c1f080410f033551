//! Bearer token authentication.

mod firebase;
mod jwks;

pub use firebase::FirebaseVerifier;
pub use jwks::JwksCache;

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::header::AUTHORIZATION, http::request::Parts};

use crate::db::{AppState, queries};
use crate::error::{AppError, Result, msg};

/// Identity extracted from a verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedUser {
    pub uid: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<VerifiedUser>;
}

/// Authenticated caller. Rejects with 401 on any token problem and with 503
/// when no verifier is configured.
#[derive(Debug, Clone)]
pub struct AuthUser(pub VerifiedUser);

impl AuthUser {
    pub fn id(&self) -> &str {
        &self.0.uid
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let verifier = state
            .identity
            .clone()
            .ok_or_else(|| AppError::ServiceUnavailable(msg::AUTH_UNAVAILABLE.into()))?;

        let token = bearer_token(parts).ok_or(AppError::Unauthorized)?;

        let user = match verifier.verify(token).await {
            Ok(user) => user,
            Err(AppError::ServiceUnavailable(e)) => return Err(AppError::ServiceUnavailable(e)),
            Err(e) => {
                tracing::debug!("Token rejected: {}", e);
                return Err(AppError::Unauthorized);
            }
        };

        let conn = state.db.get()?;
        queries::upsert_user(&conn, &user.uid, user.email.as_deref(), user.name.as_deref())?;

        Ok(AuthUser(user))
    }
}
