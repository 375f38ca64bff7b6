pub mod campaigns;
pub mod health;
pub mod messages;
pub mod meta;
pub mod pricing;
pub mod reports;
pub mod templates;
pub mod wallet;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /admin/pricing/clients                           list overrides (admin only)
/// /admin/pricing/client/{client_id}                get, set, update, remove
/// /admin/wallet/{client_id}/top-up                 credit a wallet (POST)
///
/// /client/my-pricing                               own override (404 = default)
/// /client/effective-pricing                        resolved rate
/// /client/wallet                                   balance
/// /client/wallet/transactions                      ledger
///
/// /campaigns                                       list, create
/// /campaigns/{id}                                  get, update, delete
/// /campaigns/{id}/send                             queue for dispatch (POST)
/// /campaigns/{id}/cancel                           cancel (POST)
///
/// /templates                                       list, create
/// /templates/{id}                                  get, update, delete
///
/// /messages/inbox                                  paged messages
/// /messages/conversations                          paged, grouped by contact
/// /messages/send-template                          one template message (POST)
/// /messages/send-text                              one text message (POST)
///
/// /reports/financial-summary                       ledger totals over a range
/// /reports/campaign-performance                    delivery funnel
/// /reports/daily-transactions                      one day of ledger activity
///
/// /meta/credentials                                get, save, update, delete
/// /meta/webhook                                    handshake, callbacks (public)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Admin pricing and wallet management.
        .nest("/admin/pricing", pricing::admin_router())
        .nest("/admin/wallet", wallet::admin_router())
        // Client self-service.
        .nest("/client", pricing::client_router())
        .nest("/client/wallet", wallet::client_router())
        .nest("/campaigns", campaigns::router())
        .nest("/templates", templates::router())
        .nest("/messages", messages::router())
        .nest("/reports", reports::router())
        // Credentials and the provider webhook.
        .nest("/meta", meta::router())
}
