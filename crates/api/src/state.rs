use std::sync::Arc;

use oneclick_core::crypto::CredentialCipher;
use oneclick_whatsapp::{MessagingApi, RateLimiter};

use crate::config::ServerConfig;
use crate::engine::EngineHandle;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: oneclick_db::DbPool,
    pub config: Arc<ServerConfig>,
    /// Encrypts messaging access tokens at rest.
    pub cipher: Arc<CredentialCipher>,
    /// Scheduler wake-up, running-campaign cancellation and status updates.
    pub engine: EngineHandle,
    /// Used by the single-message send endpoints.
    pub messaging: Arc<dyn MessagingApi>,
    /// Shared with the dispatcher so direct sends count against the same ceiling.
    pub limiter: Arc<RateLimiter>,
}
