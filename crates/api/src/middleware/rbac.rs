//! Role gates layered on [`Caller`].

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use oneclick_core::error::CoreError;

use super::auth::Caller;
use crate::error::AppError;
use crate::state::AppState;

/// Pricing and wallet administration. Non-admins get 403.
pub struct RequireAdmin(pub Caller);

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let caller = Caller::from_request_parts(parts, state).await?;
        if !caller.role.is_admin() {
            tracing::debug!(client_id = caller.client_id, "Admin route refused");
            return Err(AppError::Core(CoreError::Forbidden(
                "Admin role required".into(),
            )));
        }
        Ok(RequireAdmin(caller))
    }
}

/// Any valid token. The caller acts on its own client's data.
pub struct RequireAuth(pub Caller);

impl FromRequestParts<AppState> for RequireAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Caller::from_request_parts(parts, state).await.map(RequireAuth)
    }
}
