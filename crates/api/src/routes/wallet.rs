//! Route definitions for the prepaid wallet.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::wallet;
use crate::state::AppState;

/// Client routes mounted at `/client/wallet`.
///
/// ```text
/// GET    /                        -> get_wallet
/// GET    /transactions            -> list_transactions
/// ```
pub fn client_router() -> Router<AppState> {
    Router::new()
        .route("/", get(wallet::get_wallet))
        .route("/transactions", get(wallet::list_transactions))
}

/// Admin routes mounted at `/admin/wallet`.
///
/// ```text
/// POST   /{client_id}/top-up      -> top_up
/// ```
pub fn admin_router() -> Router<AppState> {
    Router::new().route("/{client_id}/top-up", post(wallet::top_up))
}
