//! RPC API authentication
//!
//! Set `DEXDUMP_API_TOKEN` to require `Authorization: Bearer <token>` on every
//! `/rpc/*` request. Without it the endpoints are open to anything that can
//! reach the bind address.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{info, warn};

use crate::config::API_TOKEN_ENV;

/// The expected bearer token, if authentication is enabled.
#[derive(Clone, Debug, Default)]
pub struct ApiToken(Option<Arc<str>>);

impl ApiToken {
    pub fn new(token: impl Into<Arc<str>>) -> Self {
        Self(Some(token.into()))
    }

    pub fn disabled() -> Self {
        Self(None)
    }

    /// Read the token from the environment. An empty value disables auth.
    pub fn from_env() -> Self {
        match std::env::var(API_TOKEN_ENV) {
            Ok(token) if !token.is_empty() => {
                info!("API authentication enabled ({API_TOKEN_ENV} set)");
                Self::new(token)
            }
            _ => {
                warn!("API authentication disabled (set {API_TOKEN_ENV} to enable)");
                Self::disabled()
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.0.is_some()
    }
}

/// Axum middleware for token authentication
///
/// - Auth disabled: every request passes
/// - Missing or malformed header: 401 Unauthorized
/// - Wrong token: 403 Forbidden
pub async fn auth_middleware(
    State(token): State<ApiToken>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let Some(expected) = token.0.as_deref() else {
        return Ok(next.run(request).await);
    };

    let provided = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingHeader)?
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidFormat)?;

    if !constant_time_eq(expected.as_bytes(), provided.as_bytes()) {
        return Err(AuthError::InvalidToken);
    }

    Ok(next.run(request).await)
}

#[derive(Debug)]
pub enum AuthError {
    MissingHeader,
    InvalidFormat,
    InvalidToken,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingHeader => (StatusCode::UNAUTHORIZED, "Missing Authorization header"),
            AuthError::InvalidFormat => (
                StatusCode::UNAUTHORIZED,
                "Invalid Authorization format (expected 'Bearer <token>')",
            ),
            AuthError::InvalidToken => (StatusCode::FORBIDDEN, "Invalid API token"),
        };
        warn!(%status, "rejected RPC request: {message}");

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Compares every byte regardless of where the first difference is.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"hunter2", b"hunter2"));
        assert!(!constant_time_eq(b"hunter2", b"hunter3"));
        assert!(!constant_time_eq(b"hunter2", b"hunter"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn test_auth_error_response() {
        assert_eq!(
            AuthError::MissingHeader.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::InvalidFormat.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::InvalidToken.into_response().status(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_token_enabled() {
        assert!(ApiToken::new("secret").is_enabled());
        assert!(!ApiToken::disabled().is_enabled());
    }
}
