//! Handlers for per-client pricing.
//!
//! Admins manage overrides; clients read their own override and the rate
//! that actually applies to them.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use oneclick_core::error::CoreError;
use oneclick_core::pagination::{clamp_limit, clamp_offset};
use oneclick_core::pricing::{normalize_currency, validate_notes, validate_price};
use oneclick_core::types::{DbId, Money};
use oneclick_db::models::pricing::UpsertClientPricing;
use oneclick_db::repositories::PricingRepo;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::middleware::rbac::{RequireAdmin, RequireAuth};
use crate::query::PaginationParams;
use crate::response::DataResponse;
use crate::state::AppState;

const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 500;

#[derive(Debug, Deserialize)]
pub struct SetPricingRequest {
    pub price_per_message: Money,
    /// Defaults to the platform currency.
    pub currency: Option<String>,
    pub notes: Option<String>,
}

fn validate_request(state: &AppState, input: SetPricingRequest) -> AppResult<UpsertClientPricing> {
    validate_price(input.price_per_message)?;
    validate_notes(input.notes.as_deref())?;
    let currency = match input.currency.as_deref() {
        Some(c) => normalize_currency(c)?,
        None => state.config.pricing.currency.clone(),
    };
    Ok(UpsertClientPricing {
        price_per_message: input.price_per_message,
        currency,
        notes: input.notes,
    })
}

fn no_override(client_id: DbId) -> AppError {
    AppError::Core(CoreError::NotFound {
        entity: "ClientPricing",
        id: client_id,
    })
}

// ---------------------------------------------------------------------------
// Admin endpoints
// ---------------------------------------------------------------------------

/// POST /api/v1/admin/pricing/client/{client_id}
///
/// Set a client's override, replacing any existing one.
pub async fn set_client_pricing(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(client_id): Path<DbId>,
    Json(input): Json<SetPricingRequest>,
) -> AppResult<impl IntoResponse> {
    let input = validate_request(&state, input)?;
    let pricing = PricingRepo::upsert(&state.pool, client_id, &input).await?;

    tracing::info!(
        client_id,
        price_per_message = %pricing.price_per_message,
        currency = %pricing.currency,
        admin_id = admin.client_id,
        "Client pricing set",
    );

    Ok((StatusCode::CREATED, Json(DataResponse { data: pricing })))
}

/// PUT /api/v1/admin/pricing/client/{client_id}
///
/// Update an existing override. 404 when the client has none.
pub async fn update_client_pricing(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(client_id): Path<DbId>,
    Json(input): Json<SetPricingRequest>,
) -> AppResult<impl IntoResponse> {
    let input = validate_request(&state, input)?;
    let pricing = PricingRepo::update(&state.pool, client_id, &input)
        .await?
        .ok_or_else(|| no_override(client_id))?;

    tracing::info!(
        client_id,
        price_per_message = %pricing.price_per_message,
        admin_id = admin.client_id,
        "Client pricing updated",
    );

    Ok(Json(DataResponse { data: pricing }))
}

/// GET /api/v1/admin/pricing/client/{client_id}
pub async fn get_client_pricing(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Path(client_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let pricing = PricingRepo::find_for_client(&state.pool, client_id)
        .await?
        .ok_or_else(|| no_override(client_id))?;

    Ok(Json(DataResponse { data: pricing }))
}

/// DELETE /api/v1/admin/pricing/client/{client_id}
///
/// Remove the override; the client falls back to the platform default.
pub async fn delete_client_pricing(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(client_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    if !PricingRepo::delete(&state.pool, client_id).await? {
        return Err(no_override(client_id));
    }

    tracing::info!(client_id, admin_id = admin.client_id, "Client pricing removed");

    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/admin/pricing/clients
pub async fn list_client_pricing(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> AppResult<impl IntoResponse> {
    let limit = clamp_limit(params.limit, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT);
    let offset = clamp_offset(params.offset);
    let rows = PricingRepo::list(&state.pool, limit, offset).await?;

    Ok(Json(DataResponse { data: rows }))
}

// ---------------------------------------------------------------------------
// Client endpoints
// ---------------------------------------------------------------------------

/// GET /api/v1/client/my-pricing
///
/// The caller's override. 404 means the platform default applies.
pub async fn my_pricing(
    RequireAuth(caller): RequireAuth,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let pricing = PricingRepo::find_for_client(&state.pool, caller.client_id)
        .await?
        .ok_or_else(|| no_override(caller.client_id))?;

    Ok(Json(DataResponse { data: pricing }))
}

/// GET /api/v1/client/effective-pricing
pub async fn effective_pricing(
    RequireAuth(caller): RequireAuth,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let resolved = PricingRepo::resolve(&state.pool, caller.client_id, &state.config.pricing).await?;

    Ok(Json(DataResponse { data: resolved }))
}
