//! Handlers for the prepaid wallet.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use oneclick_core::error::CoreError;
use oneclick_core::pagination::{clamp_limit, clamp_offset};
use oneclick_core::types::{DbId, Money};
use oneclick_core::wallet::{validate_credit, MAX_BALANCE};
use oneclick_db::models::wallet::{CreditOutcome, WalletTransaction};
use oneclick_db::repositories::WalletRepo;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::middleware::rbac::{RequireAdmin, RequireAuth};
use crate::query::PaginationParams;
use crate::response::DataResponse;
use crate::state::AppState;

const DEFAULT_TX_LIMIT: i64 = 50;
const MAX_TX_LIMIT: i64 = 200;

#[derive(Debug, Serialize)]
pub struct WalletBalance {
    pub client_id: DbId,
    pub balance: Money,
    pub currency: String,
}

#[derive(Debug, Serialize)]
pub struct TransactionPage {
    pub transactions: Vec<WalletTransaction>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Deserialize)]
pub struct TopUpRequest {
    pub amount: Money,
    pub description: Option<String>,
}

/// GET /api/v1/client/wallet
///
/// Balance computed from the ledger.
pub async fn get_wallet(
    RequireAuth(caller): RequireAuth,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let balance = WalletRepo::balance(&state.pool, caller.client_id).await?;

    Ok(Json(DataResponse {
        data: WalletBalance {
            client_id: caller.client_id,
            balance,
            currency: state.config.pricing.currency.clone(),
        },
    }))
}

/// GET /api/v1/client/wallet/transactions
///
/// The caller's ledger, newest first.
pub async fn list_transactions(
    RequireAuth(caller): RequireAuth,
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> AppResult<impl IntoResponse> {
    let limit = clamp_limit(params.limit, DEFAULT_TX_LIMIT, MAX_TX_LIMIT);
    let offset = clamp_offset(params.offset);

    let transactions = WalletRepo::list_transactions(&state.pool, caller.client_id, limit, offset).await?;
    let total = WalletRepo::count_transactions(&state.pool, caller.client_id).await?;

    Ok(Json(DataResponse {
        data: TransactionPage {
            transactions,
            total,
            limit,
            offset,
        },
    }))
}

/// POST /api/v1/admin/wallet/{client_id}/top-up
pub async fn top_up(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(client_id): Path<DbId>,
    Json(input): Json<TopUpRequest>,
) -> AppResult<impl IntoResponse> {
    validate_credit(input.amount)?;
    let tx = match WalletRepo::credit(
        &state.pool,
        client_id,
        input.amount,
        input.description.as_deref(),
    )
    .await?
    {
        CreditOutcome::Applied(tx) => tx,
        CreditOutcome::BalanceLimit { balance } => {
            return Err(CoreError::Validation(format!(
                "Top-up would take the balance above {MAX_BALANCE} (current balance {balance})"
            ))
            .into())
        }
    };

    tracing::info!(
        client_id,
        amount = %input.amount,
        balance_after = %tx.balance_after,
        admin_id = admin.client_id,
        "Wallet topped up",
    );

    Ok((StatusCode::CREATED, Json(DataResponse { data: tx })))
}
