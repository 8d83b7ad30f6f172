//! Service configuration.
//!
//! Configuration is loaded from environment variables. The signing secret is
//! held as a `SecretString` and the Redis URL has its credentials stripped
//! in Debug output.

use crate::middleware::client_ip::TrustedProxies;
use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use common::secret::{redact_url_credentials, SecretString};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";
pub const DEFAULT_JWT_ISSUER: &str = "spot-api";
pub const DEFAULT_JWT_AUDIENCE: &str = "spot-api";
pub const DEFAULT_ACCESS_TOKEN_TTL_SECONDS: u64 = 86_400;
pub const DEFAULT_REFRESH_TOKEN_TTL_SECONDS: u64 = 604_800;
pub const DEFAULT_SESSION_COOKIE_NAME: &str = "session_token";
pub const DEFAULT_REVOCATION_TIMEOUT_MS: u64 = 500;
pub const DEFAULT_RATE_LIMIT_REQUESTS: u32 = 100;
pub const DEFAULT_RATE_LIMIT_WINDOW_SECONDS: u64 = 60;
pub const DEFAULT_OIDC_JWKS_TIMEOUT_SECONDS: u64 = 5;
pub const DEFAULT_OIDC_JWKS_CACHE_TTL_SECONDS: u64 = 300;
pub const DEFAULT_DRAIN_SECONDS: u64 = 5;

/// Minimum HS256 secret length in bytes.
pub const MIN_JWT_SECRET_BYTES: usize = 32;

/// External identity provider settings. Present only when all of
/// `OIDC_ISSUER`, `OIDC_AUDIENCE` and `OIDC_JWKS_URL` are set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OidcConfig {
    pub issuer: String,
    pub audience: String,
    pub jwks_url: String,
    pub jwks_timeout: Duration,
    pub jwks_cache_ttl: Duration,
}

/// Service configuration.
pub struct Config {
    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// HS256 signing secret for self-issued tokens.
    pub jwt_secret: SecretString,

    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,

    /// Cookie read when no bearer token is presented.
    pub session_cookie_name: String,

    /// Redis URL for the shared revocation store. `None` selects the
    /// in-memory store.
    pub redis_url: Option<String>,

    /// Bound on each revocation store call.
    pub revocation_timeout: Duration,

    /// Requests admitted per client per window.
    pub rate_limit_requests: u32,
    pub rate_limit_window: Duration,

    /// Proxies whose forwarding headers are believed.
    pub trusted_proxies: TrustedProxies,

    pub oidc: Option<OidcConfig>,

    /// Leeway for provider token `exp`/`nbf`/`iat` checks.
    pub jwt_clock_skew: Duration,

    /// Grace period for in-flight requests on shutdown.
    pub drain: Duration,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("jwt_secret", &"[REDACTED]")
            .field("jwt_issuer", &self.jwt_issuer)
            .field("jwt_audience", &self.jwt_audience)
            .field("access_token_ttl", &self.access_token_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .field("session_cookie_name", &self.session_cookie_name)
            .field(
                "redis_url",
                &self.redis_url.as_deref().map(redact_url_credentials),
            )
            .field("revocation_timeout", &self.revocation_timeout)
            .field("rate_limit_requests", &self.rate_limit_requests)
            .field("rate_limit_window", &self.rate_limit_window)
            .field("trusted_proxies", &self.trusted_proxies.ranges().len())
            .field("oidc", &self.oidc)
            .field("jwt_clock_skew", &self.jwt_clock_skew)
            .field("drain", &self.drain)
            .finish()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid JWT secret: {0}")]
    InvalidJwtSecret(String),

    #[error("Invalid token lifetime configuration: {0}")]
    InvalidTokenTtl(String),

    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidJwtClockSkew(String),

    #[error("Invalid rate limit configuration: {0}")]
    InvalidRateLimit(String),

    #[error("Invalid trusted proxy configuration: {0}")]
    InvalidTrustedProxies(String),

    #[error("Incomplete OIDC configuration: {0}")]
    IncompleteOidc(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Parse `name` as a positive number, or return `default` when unset.
fn positive<T>(
    vars: &HashMap<String, String>,
    name: &str,
    default: T,
    err: fn(String) -> ConfigError,
) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default,
    T::Err: fmt::Display,
{
    let Some(value_str) = vars.get(name) else {
        return Ok(default);
    };

    let value: T = value_str.trim().parse().map_err(|e| {
        err(format!(
            "{name} must be a valid positive integer, got '{value_str}': {e}"
        ))
    })?;

    if value <= T::default() {
        return Err(err(format!("{name} must be greater than 0")));
    }
    Ok(value)
}

fn non_empty(vars: &HashMap<String, String>, name: &str) -> Option<String> {
    vars.get(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a required variable is missing or a value is
    /// out of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a map (for testing).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a required variable is missing or a value is
    /// out of range.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let jwt_secret = vars
            .get("JWT_SECRET")
            .ok_or_else(|| ConfigError::MissingEnvVar("JWT_SECRET".to_string()))?;
        if jwt_secret.len() < MIN_JWT_SECRET_BYTES {
            return Err(ConfigError::InvalidJwtSecret(format!(
                "JWT_SECRET must be at least {MIN_JWT_SECRET_BYTES} bytes"
            )));
        }
        let jwt_secret = SecretString::from(jwt_secret.clone());

        let bind_address = non_empty(vars, "BIND_ADDRESS")
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());
        let jwt_issuer =
            non_empty(vars, "JWT_ISSUER").unwrap_or_else(|| DEFAULT_JWT_ISSUER.to_string());
        let jwt_audience =
            non_empty(vars, "JWT_AUDIENCE").unwrap_or_else(|| DEFAULT_JWT_AUDIENCE.to_string());

        let access_ttl_secs = positive(
            vars,
            "ACCESS_TOKEN_TTL_SECONDS",
            DEFAULT_ACCESS_TOKEN_TTL_SECONDS,
            ConfigError::InvalidTokenTtl,
        )?;
        let refresh_ttl_secs = positive(
            vars,
            "REFRESH_TOKEN_TTL_SECONDS",
            DEFAULT_REFRESH_TOKEN_TTL_SECONDS,
            ConfigError::InvalidTokenTtl,
        )?;
        if refresh_ttl_secs <= access_ttl_secs {
            return Err(ConfigError::InvalidTokenTtl(format!(
                "REFRESH_TOKEN_TTL_SECONDS ({refresh_ttl_secs}) must exceed ACCESS_TOKEN_TTL_SECONDS ({access_ttl_secs})"
            )));
        }

        let session_cookie_name = non_empty(vars, "SESSION_COOKIE_NAME")
            .unwrap_or_else(|| DEFAULT_SESSION_COOKIE_NAME.to_string());

        let redis_url = non_empty(vars, "REDIS_URL");

        let revocation_timeout_ms = positive(
            vars,
            "REVOCATION_TIMEOUT_MS",
            DEFAULT_REVOCATION_TIMEOUT_MS,
            ConfigError::InvalidValue,
        )?;

        let rate_limit_requests = positive(
            vars,
            "RATE_LIMIT_REQUESTS",
            DEFAULT_RATE_LIMIT_REQUESTS,
            ConfigError::InvalidRateLimit,
        )?;
        let rate_limit_window_secs = positive(
            vars,
            "RATE_LIMIT_WINDOW_SECONDS",
            DEFAULT_RATE_LIMIT_WINDOW_SECONDS,
            ConfigError::InvalidRateLimit,
        )?;

        let trusted_proxies = match vars.get("TRUSTED_PROXIES") {
            Some(list) => TrustedProxies::parse_list(list)
                .map_err(|e| ConfigError::InvalidTrustedProxies(e.to_string()))?,
            None => TrustedProxies::default(),
        };

        let jwt_clock_skew_secs = positive(
            vars,
            "JWT_CLOCK_SKEW_SECONDS",
            DEFAULT_CLOCK_SKEW.as_secs(),
            ConfigError::InvalidJwtClockSkew,
        )?;
        if jwt_clock_skew_secs > MAX_CLOCK_SKEW.as_secs() {
            return Err(ConfigError::InvalidJwtClockSkew(format!(
                "JWT_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {jwt_clock_skew_secs}",
                MAX_CLOCK_SKEW.as_secs()
            )));
        }

        let oidc = Self::oidc_from_vars(vars)?;

        let drain_secs = match vars.get("DRAIN_SECONDS") {
            Some(value_str) => value_str.trim().parse::<u64>().map_err(|e| {
                ConfigError::InvalidValue(format!(
                    "DRAIN_SECONDS must be a non-negative integer, got '{value_str}': {e}"
                ))
            })?,
            None => DEFAULT_DRAIN_SECONDS,
        };

        Ok(Self {
            bind_address,
            jwt_secret,
            jwt_issuer,
            jwt_audience,
            access_token_ttl: Duration::from_secs(access_ttl_secs),
            refresh_token_ttl: Duration::from_secs(refresh_ttl_secs),
            session_cookie_name,
            redis_url,
            revocation_timeout: Duration::from_millis(revocation_timeout_ms),
            rate_limit_requests,
            rate_limit_window: Duration::from_secs(rate_limit_window_secs),
            trusted_proxies,
            oidc,
            jwt_clock_skew: Duration::from_secs(jwt_clock_skew_secs),
            drain: Duration::from_secs(drain_secs),
        })
    }

    fn oidc_from_vars(vars: &HashMap<String, String>) -> Result<Option<OidcConfig>, ConfigError> {
        let issuer = non_empty(vars, "OIDC_ISSUER");
        let audience = non_empty(vars, "OIDC_AUDIENCE");
        let jwks_url = non_empty(vars, "OIDC_JWKS_URL");

        let (issuer, audience, jwks_url) = match (issuer, audience, jwks_url) {
            (None, None, None) => return Ok(None),
            (Some(issuer), Some(audience), Some(jwks_url)) => (issuer, audience, jwks_url),
            _ => {
                return Err(ConfigError::IncompleteOidc(
                    "OIDC_ISSUER, OIDC_AUDIENCE and OIDC_JWKS_URL must be set together"
                        .to_string(),
                ))
            }
        };

        let jwks_timeout_secs = positive(
            vars,
            "OIDC_JWKS_TIMEOUT_SECONDS",
            DEFAULT_OIDC_JWKS_TIMEOUT_SECONDS,
            ConfigError::InvalidValue,
        )?;
        let jwks_cache_ttl_secs = positive(
            vars,
            "OIDC_JWKS_CACHE_TTL_SECONDS",
            DEFAULT_OIDC_JWKS_CACHE_TTL_SECONDS,
            ConfigError::InvalidValue,
        )?;

        Ok(Some(OidcConfig {
            issuer,
            audience,
            jwks_url,
            jwks_timeout: Duration::from_secs(jwks_timeout_secs),
            jwks_cache_ttl: Duration::from_secs(jwks_cache_ttl_secs),
        }))
    }
}
