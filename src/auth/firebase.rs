//! Firebase ID token verification.

use std::collections::HashSet;

use async_trait::async_trait;
use jwt_simple::algorithms::RSAPublicKeyLike;
use jwt_simple::prelude::{Token, VerificationOptions};
use serde::{Deserialize, Serialize};

use super::jwks::JwksCache;
use super::{IdentityVerifier, VerifiedUser};
use crate::error::{AppError, Result};

/// Google's public keys for Firebase ID tokens, in JWKS form.
pub const FIREBASE_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

/// Claims beyond the registered ones. `sub` is read from the registered claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FirebaseClaims {
    email: Option<String>,
    name: Option<String>,
}

pub struct FirebaseVerifier {
    project_id: String,
    issuer: String,
    jwks: JwksCache,
}

impl FirebaseVerifier {
    pub fn new(project_id: &str) -> Self {
        Self::with_jwks_url(project_id, FIREBASE_JWKS_URL)
    }

    pub fn with_jwks_url(project_id: &str, jwks_url: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            issuer: format!("https://securetoken.google.com/{}", project_id),
            jwks: JwksCache::new(jwks_url),
        }
    }
}

#[async_trait]
impl IdentityVerifier for FirebaseVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedUser> {
        let metadata = Token::decode_metadata(token)
            .map_err(|e| AppError::TokenValidation(format!("Invalid token format: {}", e)))?;

        if metadata.algorithm() != "RS256" {
            return Err(AppError::TokenValidation(format!(
                "Unexpected algorithm: {}",
                metadata.algorithm()
            )));
        }
        let kid = metadata
            .key_id()
            .ok_or_else(|| AppError::TokenValidation("Missing key ID".to_string()))?;

        let public_key = self.jwks.get_key(kid).await?;

        let options = VerificationOptions {
            allowed_issuers: Some(HashSet::from([self.issuer.clone()])),
            allowed_audiences: Some(HashSet::from([self.project_id.clone()])),
            ..Default::default()
        };

        let claims = public_key
            .verify_token::<FirebaseClaims>(token, Some(options))
            .map_err(|e| AppError::TokenValidation(format!("Token verification failed: {}", e)))?;

        let uid = claims
            .subject
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::TokenValidation("Missing 'sub' claim".to_string()))?;

        Ok(VerifiedUser {
            uid,
            email: claims.custom.email,
            name: claims.custom.name,
        })
    }
}
