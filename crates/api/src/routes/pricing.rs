//! Route definitions for per-client pricing.

use axum::routing::get;
use axum::Router;

use crate::handlers::pricing;
use crate::state::AppState;

/// Admin routes mounted at `/admin/pricing`.
///
/// ```text
/// GET    /clients                 -> list_client_pricing
/// GET    /client/{client_id}      -> get_client_pricing
/// POST   /client/{client_id}      -> set_client_pricing
/// PUT    /client/{client_id}      -> update_client_pricing
/// DELETE /client/{client_id}      -> delete_client_pricing
/// ```
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/clients", get(pricing::list_client_pricing))
        .route(
            "/client/{client_id}",
            get(pricing::get_client_pricing)
                .post(pricing::set_client_pricing)
                .put(pricing::update_client_pricing)
                .delete(pricing::delete_client_pricing),
        )
}

/// Client routes mounted at `/client`.
///
/// ```text
/// GET    /my-pricing              -> my_pricing
/// GET    /effective-pricing       -> effective_pricing
/// ```
pub fn client_router() -> Router<AppState> {
    Router::new()
        .route("/my-pricing", get(pricing::my_pricing))
        .route("/effective-pricing", get(pricing::effective_pricing))
}
