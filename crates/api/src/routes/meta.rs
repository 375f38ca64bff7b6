//! Route definitions for the Cloud API integration, mounted at `/meta`.

use axum::routing::get;
use axum::Router;

use crate::handlers::meta;
use crate::state::AppState;

/// ```text
/// GET    /credentials             -> get_credentials
/// POST   /credentials             -> save_credentials
/// PUT    /credentials             -> update_credentials
/// DELETE /credentials             -> delete_credentials
/// GET    /webhook                 -> verify_webhook (public)
/// POST   /webhook                 -> receive_webhook (public, signed)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/credentials",
            get(meta::get_credentials)
                .post(meta::save_credentials)
                .put(meta::update_credentials)
                .delete(meta::delete_credentials),
        )
        .route(
            "/webhook",
            get(meta::verify_webhook).post(meta::receive_webhook),
        )
}
