//! Route definitions for the inbox and direct sends, mounted at `/messages`.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::messages;
use crate::state::AppState;

/// ```text
/// GET    /inbox                   -> inbox
/// GET    /conversations           -> conversations
/// POST   /send-template           -> send_template
/// POST   /send-text               -> send_text
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/inbox", get(messages::inbox))
        .route("/conversations", get(messages::conversations))
        .route("/send-template", post(messages::send_template))
        .route("/send-text", post(messages::send_text))
}
