//! Route definitions for reports, mounted at `/reports`.

use axum::routing::get;
use axum::Router;

use crate::handlers::reports;
use crate::state::AppState;

/// ```text
/// GET    /financial-summary       -> financial_summary
/// GET    /campaign-performance    -> campaign_performance
/// GET    /daily-transactions      -> daily_transactions
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/financial-summary", get(reports::financial_summary))
        .route("/campaign-performance", get(reports::campaign_performance))
        .route("/daily-transactions", get(reports::daily_transactions))
}
