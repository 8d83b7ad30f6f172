//! JWKS client for an external identity provider.
//!
//! Fetches the provider's published key set and caches it with a TTL.
//!
//! # Security
//!
//! - Every fetch is bounded by the configured HTTP timeout
//! - An unknown `kid` forces at most one refresh per
//!   [`MIN_FORCED_REFRESH_INTERVAL`], so forged `kid`s cannot turn the
//!   provider into a request amplifier
//! - Only `OKP`/Ed25519 (`EdDSA`) and `RSA` (`RS256`) keys are usable

use crate::errors::AuthError;
use crate::observability::metrics;
use common::jwt::decode_okp_public_key;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::instrument;

/// Minimum spacing between refreshes triggered by an unknown `kid`.
pub const MIN_FORCED_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// JSON Web Key as published by the provider.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type: "OKP" or "RSA".
    pub kty: String,

    /// Key ID.
    pub kid: String,

    /// Curve (OKP only).
    #[serde(default)]
    pub crv: Option<String>,

    /// Public key (OKP only, base64url).
    #[serde(default)]
    pub x: Option<String>,

    /// Modulus (RSA only, base64url).
    #[serde(default)]
    pub n: Option<String>,

    /// Exponent (RSA only, base64url).
    #[serde(default)]
    pub e: Option<String>,

    #[serde(default)]
    pub alg: Option<String>,

    #[serde(default, rename = "use")]
    pub key_use: Option<String>,
}

impl Jwk {
    /// Build the verification key and the only algorithm it may verify.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::BadSignature` for unsupported key types, a
    /// conflicting `alg`, or unusable key material.
    pub fn decoding_key(&self) -> Result<(DecodingKey, Algorithm), AuthError> {
        let (key, alg) = match self.kty.as_str() {
            "OKP" => {
                if self.crv.as_deref().is_some_and(|crv| crv != "Ed25519") {
                    tracing::warn!(target: "api.auth.jwks", kid = %self.kid, "Unsupported OKP curve");
                    return Err(AuthError::BadSignature);
                }
                let x = self.x.as_deref().ok_or_else(|| {
                    tracing::warn!(target: "api.auth.jwks", kid = %self.kid, "JWK missing x");
                    AuthError::BadSignature
                })?;
                let bytes = decode_okp_public_key(x).map_err(|e| {
                    tracing::warn!(target: "api.auth.jwks", kid = %self.kid, error = %e, "Invalid OKP key encoding");
                    AuthError::BadSignature
                })?;
                (DecodingKey::from_ed_der(&bytes), Algorithm::EdDSA)
            }
            "RSA" => {
                let (Some(n), Some(e)) = (self.n.as_deref(), self.e.as_deref()) else {
                    tracing::warn!(target: "api.auth.jwks", kid = %self.kid, "JWK missing n or e");
                    return Err(AuthError::BadSignature);
                };
                let key = DecodingKey::from_rsa_components(n, e).map_err(|err| {
                    tracing::warn!(target: "api.auth.jwks", kid = %self.kid, error = %err, "Invalid RSA components");
                    AuthError::BadSignature
                })?;
                (key, Algorithm::RS256)
            }
            other => {
                tracing::warn!(target: "api.auth.jwks", kid = %self.kid, kty = %other, "Unsupported JWK key type");
                return Err(AuthError::BadSignature);
            }
        };

        let expected_alg = match alg {
            Algorithm::EdDSA => "EdDSA",
            _ => "RS256",
        };
        if let Some(declared) = &self.alg {
            if declared != expected_alg {
                tracing::warn!(target: "api.auth.jwks", kid = %self.kid, alg = %declared, "JWK alg conflicts with key type");
                return Err(AuthError::BadSignature);
            }
        }

        Ok((key, alg))
    }
}

/// JWKS document.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksResponse {
    pub keys: Vec<Jwk>,
}

struct CachedJwks {
    keys: HashMap<String, Jwk>,
    expires_at: Instant,
}

/// Caching JWKS client.
pub struct JwksClient {
    jwks_url: String,
    http_client: reqwest::Client,
    cache: RwLock<Option<CachedJwks>>,
    cache_ttl: Duration,
    last_forced_refresh: Mutex<Option<Instant>>,
}

impl JwksClient {
    /// Create a client for `jwks_url`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::ServiceError` if the HTTP client cannot be built.
    pub fn new(
        jwks_url: String,
        fetch_timeout: Duration,
        cache_ttl: Duration,
    ) -> Result<Self, AuthError> {
        let http_client = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .build()
            .map_err(|e| {
                tracing::error!(target: "api.auth.jwks", error = %e, "Failed to build HTTP client");
                AuthError::ServiceError("Failed to build JWKS HTTP client".to_string())
            })?;

        Ok(Self {
            jwks_url,
            http_client,
            cache: RwLock::new(None),
            cache_ttl,
            last_forced_refresh: Mutex::new(None),
        })
    }

    /// Look up a key by `kid`, fetching the key set when the cache is empty,
    /// stale, or (rate-limited) missing the `kid`.
    ///
    /// # Errors
    ///
    /// - `ServiceError` - the key set could not be fetched
    /// - `BadSignature` - no key with this `kid` exists
    #[instrument(skip_all, name = "api.auth.jwks.get_key")]
    pub async fn get_key(&self, kid: &str) -> Result<Jwk, AuthError> {
        let fresh_but_missing = {
            let cache = self.cache.read().await;
            match cache.as_ref() {
                Some(cached) if cached.expires_at > Instant::now() => {
                    if let Some(key) = cached.keys.get(kid) {
                        tracing::debug!(target: "api.auth.jwks", kid = %kid, "JWKS cache hit");
                        return Ok(key.clone());
                    }
                    true
                }
                _ => false,
            }
        };

        if fresh_but_missing && !self.claim_forced_refresh().await {
            tracing::debug!(target: "api.auth.jwks", kid = %kid, "Unknown kid, forced refresh suppressed");
            return Err(AuthError::BadSignature);
        }

        self.refresh().await?;

        let cache = self.cache.read().await;
        if let Some(key) = cache.as_ref().and_then(|cached| cached.keys.get(kid)) {
            return Ok(key.clone());
        }

        tracing::warn!(target: "api.auth.jwks", kid = %kid, "Key not found in JWKS after refresh");
        Err(AuthError::BadSignature)
    }

    /// Reserve the forced-refresh slot if the interval has elapsed.
    async fn claim_forced_refresh(&self) -> bool {
        let mut last = self.last_forced_refresh.lock().await;
        let now = Instant::now();
        match *last {
            Some(at) if now.duration_since(at) < MIN_FORCED_REFRESH_INTERVAL => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    async fn refresh(&self) -> Result<(), AuthError> {
        match self.fetch().await {
            Ok(keys) => {
                metrics::record_jwks_refresh("success");
                tracing::info!(target: "api.auth.jwks", key_count = keys.len(), "JWKS cache refreshed");

                let mut cache = self.cache.write().await;
                *cache = Some(CachedJwks {
                    keys,
                    expires_at: Instant::now() + self.cache_ttl,
                });
                Ok(())
            }
            Err(e) => {
                metrics::record_jwks_refresh("error");
                Err(e)
            }
        }
    }

    async fn fetch(&self) -> Result<HashMap<String, Jwk>, AuthError> {
        let unavailable = || AuthError::ServiceError("Identity provider keys unavailable".to_string());

        let response = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(target: "api.auth.jwks", error = %e, "Failed to fetch JWKS");
                unavailable()
            })?;

        if !response.status().is_success() {
            tracing::error!(target: "api.auth.jwks", status = %response.status(), "JWKS endpoint returned error");
            return Err(unavailable());
        }

        let jwks: JwksResponse = response.json().await.map_err(|e| {
            tracing::error!(target: "api.auth.jwks", error = %e, "Failed to parse JWKS response");
            unavailable()
        })?;

        Ok(jwks
            .keys
            .into_iter()
            .map(|key| (key.kid.clone(), key))
            .collect())
    }
}
