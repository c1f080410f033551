//! JWKS (JSON Web Key Set) fetching and caching.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jwt_simple::prelude::*;
use serde::Deserialize;

use crate::error::{AppError, Result};

/// Cache duration for JWKS keys (1 hour)
const CACHE_DURATION: Duration = Duration::from_secs(3600);

struct CachedJwks {
    /// Map from key ID (kid) to public key
    keys: HashMap<String, RS256PublicKey>,
    fetched_at: Instant,
}

impl CachedJwks {
    fn is_stale(&self) -> bool {
        self.fetched_at.elapsed() > CACHE_DURATION
    }
}

/// RS256 keys of one issuer, refreshed at most once per hour unless a token
/// names a key we haven't seen (keys rotate).
pub struct JwksCache {
    url: String,
    cache: RwLock<Option<CachedJwks>>,
    client: reqwest::Client,
}

impl JwksCache {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            cache: RwLock::new(None),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Get the public key for a key ID, fetching the JWKS if needed.
    pub async fn get_key(&self, kid: &str) -> Result<RS256PublicKey> {
        {
            let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
            if let Some(cached) = cache.as_ref()
                && !cached.is_stale()
                && let Some(key) = cached.keys.get(kid)
            {
                return Ok(key.clone());
            }
        }

        let keys = self.fetch_jwks().await?;
        let key = keys.get(kid).cloned();

        {
            let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
            *cache = Some(CachedJwks {
                keys,
                fetched_at: Instant::now(),
            });
        }

        key.ok_or_else(|| AppError::TokenValidation(format!("Key ID '{}' not found in JWKS", kid)))
    }

    async fn fetch_jwks(&self) -> Result<HashMap<String, RS256PublicKey>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| AppError::ServiceUnavailable(format!("JWKS request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::ServiceUnavailable(format!(
                "HTTP {} from JWKS endpoint",
                response.status()
            )));
        }

        let jwks: JwksResponse = response.json().await.map_err(|e| {
            AppError::ServiceUnavailable(format!("Failed to parse JWKS JSON: {}", e))
        })?;

        let keys = parse_jwks(jwks);
        if keys.is_empty() {
            return Err(AppError::ServiceUnavailable(
                "No valid RS256 keys found in JWKS".to_string(),
            ));
        }
        Ok(keys)
    }
}

#[derive(Debug, Deserialize)]
struct JwksResponse {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kty: String,
    kid: Option<String>,
    alg: Option<String>,
    /// RSA modulus (base64url encoded)
    #[serde(default)]
    n: String,
    /// RSA exponent (base64url encoded)
    #[serde(default)]
    e: String,
}

fn parse_jwks(jwks: JwksResponse) -> HashMap<String, RS256PublicKey> {
    let mut keys = HashMap::new();
    for jwk in jwks.keys {
        if jwk.kty != "RSA" || jwk.alg.as_deref().is_some_and(|alg| alg != "RS256") {
            continue;
        }
        let Some(kid) = jwk.kid else { continue };

        match parse_rsa_public_key(&jwk.n, &jwk.e) {
            Ok(key) => {
                keys.insert(kid, key);
            }
            Err(e) => tracing::warn!("Failed to parse JWK with kid '{}': {}", kid, e),
        }
    }
    keys
}

fn parse_rsa_public_key(n_b64: &str, e_b64: &str) -> std::result::Result<RS256PublicKey, String> {
    let n = URL_SAFE_NO_PAD
        .decode(n_b64)
        .map_err(|e| format!("Invalid base64url for 'n': {}", e))?;
    let e = URL_SAFE_NO_PAD
        .decode(e_b64)
        .map_err(|e| format!("Invalid base64url for 'e': {}", e))?;
    RS256PublicKey::from_components(&n, &e).map_err(|e| format!("Invalid RSA key: {}", e))
}
