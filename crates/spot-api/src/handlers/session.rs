//! Session handlers: who am I, logout and refresh.
//!
//! `me`, `session` and `provider/me` read the context the admission
//! middleware attached. `logout` and `refresh` check their tokens through
//! the session service.

use crate::auth::context::{AuthUser, MaybeAuthUser, ProviderUser};
use crate::errors::{ApiError, AuthError};
use crate::middleware::auth::{correlation_id, extract_token, record_rejection};
use crate::routes::AppState;
use crate::services::session_service::{self, TokenPair};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;

/// Response for `GET /v1/me`.
#[derive(Debug, Clone, Serialize)]
pub struct MeResponse {
    pub user_id: String,
    pub email: String,
    /// Expiry of the presented token (Unix seconds).
    pub expires_at: i64,
    pub correlation_id: String,
}

/// Response for `GET /v1/session`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Response for `GET /v1/provider/me`.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderMeResponse {
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub issuer: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogoutRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Parse an optional JSON body. An empty body yields `T::default()`.
fn parse_optional_body<T>(body: &Bytes) -> Result<T, ApiError>
where
    T: Default + for<'de> Deserialize<'de>,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {e}")))
}

/// Handler for GET /v1/me
#[instrument(skip_all, name = "api.handlers.me")]
pub async fn get_me(AuthUser(ctx): AuthUser) -> Json<MeResponse> {
    Json(MeResponse {
        user_id: ctx.user_id,
        email: ctx.email,
        expires_at: ctx.expires_at,
        correlation_id: ctx.correlation_id,
    })
}

/// Handler for GET /v1/session
///
/// Anonymous callers get `{"authenticated": false}`.
#[instrument(skip_all, name = "api.handlers.session")]
pub async fn get_session(MaybeAuthUser(ctx): MaybeAuthUser) -> Json<SessionResponse> {
    Json(SessionResponse {
        authenticated: ctx.is_some(),
        user_id: ctx.map(|c| c.user_id),
    })
}

/// Handler for GET /v1/provider/me
#[instrument(skip_all, name = "api.handlers.provider_me")]
pub async fn get_provider_me(ProviderUser(ctx): ProviderUser) -> Json<ProviderMeResponse> {
    Json(ProviderMeResponse {
        subject: ctx.subject,
        email: ctx.email,
        issuer: ctx.issuer,
    })
}

/// Handler for POST /v1/auth/logout
///
/// Revokes the presented access token (bearer or session cookie). An
/// optional body `{"refresh_token": "..."}` revokes the paired refresh token
/// as well. Returns 204, also for a token that is already revoked.
///
/// Mounted outside `require_auth`: the admission revocation lookup would
/// turn a repeated logout into a 401.
#[instrument(skip_all, name = "api.handlers.logout")]
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let correlation_id = correlation_id(&headers);

    let Some(token) = extract_token(&headers, &state.auth.cookie_name) else {
        record_rejection(&AuthError::NoToken, &correlation_id);
        return Err(ApiError::Auth(AuthError::NoToken));
    };

    let request: LogoutRequest = parse_optional_body(&body)?;

    session_service::logout(&state.auth, &token, request.refresh_token.as_deref())
        .await
        .map_err(|e| {
            record_rejection(&e, &correlation_id);
            ApiError::Auth(e)
        })?;

    Ok(StatusCode::NO_CONTENT)
}

/// Handler for POST /v1/auth/refresh
///
/// Body `{"refresh_token": "..."}`. Returns a fresh token pair and revokes
/// the presented refresh token.
#[instrument(skip_all, name = "api.handlers.refresh")]
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<TokenPair>, ApiError> {
    let request: RefreshRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {e}")))?;

    let pair = session_service::refresh(&state.auth, &request.refresh_token)
        .await
        .map_err(|e| {
            record_rejection(&e, &correlation_id(&headers));
            ApiError::Auth(e)
        })?;

    Ok(Json(pair))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_logout_body_is_default() {
        let request: LogoutRequest = parse_optional_body(&Bytes::new()).unwrap();
        assert!(request.refresh_token.is_none());

        let request: LogoutRequest = parse_optional_body(&Bytes::from_static(b"  \n")).unwrap();
        assert!(request.refresh_token.is_none());
    }

    #[test]
    fn test_logout_body_with_refresh_token() {
        let request: LogoutRequest =
            parse_optional_body(&Bytes::from_static(br#"{"refresh_token":"abc"}"#)).unwrap();
        assert_eq!(request.refresh_token.as_deref(), Some("abc"));
    }

    #[test]
    fn test_malformed_logout_body_is_bad_request() {
        let result: Result<LogoutRequest, _> = parse_optional_body(&Bytes::from_static(b"{nope"));
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn test_session_response_omits_user_when_anonymous() {
        let json = serde_json::to_value(SessionResponse {
            authenticated: false,
            user_id: None,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"authenticated": false}));
    }
}
