//! Caller extraction from the `Authorization: Bearer` header.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use oneclick_core::error::CoreError;
use oneclick_core::roles::Role;
use oneclick_core::types::DbId;

use crate::auth::jwt::decode_token;
use crate::error::AppError;
use crate::state::AppState;

/// Who is calling. Client-scoped handlers key every query by `client_id`.
#[derive(Debug, Clone)]
pub struct Caller {
    pub client_id: DbId,
    pub role: Role,
}

fn unauthorized(msg: &str) -> AppError {
    AppError::Core(CoreError::Unauthorized(msg.to_string()))
}

fn bearer_token(parts: &Parts) -> Result<&str, AppError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| unauthorized("Missing Authorization header"))?;

    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| unauthorized("Invalid Authorization format. Expected: Bearer <token>"))
}

impl FromRequestParts<AppState> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let claims = decode_token(token, &state.config.jwt)
            .map_err(|_| unauthorized("Invalid or expired token"))?;

        let Some(role) = claims.role() else {
            tracing::warn!(sub = claims.sub, role = %claims.role, "Token with unknown role rejected");
            return Err(unauthorized("Unknown role in token"));
        };

        Ok(Caller {
            client_id: claims.sub,
            role,
        })
    }
}
