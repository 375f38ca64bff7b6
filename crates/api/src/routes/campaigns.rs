//! Route definitions for campaigns, mounted at `/campaigns`.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::campaigns;
use crate::state::AppState;

/// ```text
/// GET    /                        -> list_campaigns
/// POST   /                        -> create_campaign
/// GET    /{id}                    -> get_campaign
/// PUT    /{id}                    -> update_campaign
/// DELETE /{id}                    -> delete_campaign
/// POST   /{id}/send               -> send_campaign
/// POST   /{id}/cancel             -> cancel_campaign
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(campaigns::list_campaigns).post(campaigns::create_campaign),
        )
        .route(
            "/{id}",
            get(campaigns::get_campaign)
                .put(campaigns::update_campaign)
                .delete(campaigns::delete_campaign),
        )
        .route("/{id}/send", post(campaigns::send_campaign))
        .route("/{id}/cancel", post(campaigns::cancel_campaign))
}
