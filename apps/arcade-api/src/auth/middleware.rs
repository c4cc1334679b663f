//! Bearer token extraction for authenticated routes and WebSocket identify.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};

use crate::auth::tokens;
use crate::db::kv::KeyValueStore;
use crate::error::ApiError;
use crate::AppState;

/// Authenticated user resolved from an access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: String,
}

/// Rejection returned when the token is missing, malformed or unknown.
#[derive(Debug)]
pub struct AuthError {
    pub message: &'static str,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ApiError::unauthorized(self.message).into_response()
    }
}

/// Resolve a raw access token to its user.
pub async fn resolve_token(kv: &dyn KeyValueStore, token: &str) -> Result<AuthUser, AuthError> {
    if token.is_empty() {
        return Err(AuthError {
            message: "Missing token",
        });
    }

    let data = tokens::lookup_access_token(kv, token)
        .await
        .map_err(|_| AuthError {
            message: "Token lookup failed",
        })?
        .ok_or(AuthError {
            message: "Invalid or expired token",
        })?;

    Ok(AuthUser {
        user_id: data.user_id,
    })
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthError {
                message: "Missing Authorization header",
            })?;

        let token = header.strip_prefix("Bearer ").ok_or(AuthError {
            message: "Invalid Authorization header format",
        })?;

        resolve_token(state.kv.as_ref(), token).await
    }
}
