//! Campaign delivery engine.
//!
//! - [`scheduler`] polls for campaigns that are ready to send and spawns a
//!   dispatch per campaign.
//! - [`dispatcher`] turns one campaign into priced, submitted messages.
//! - [`store`] is the persistence seam the dispatcher works through.
//! - [`status_updater`] applies delivery callbacks, partitioned by message id.

pub mod dispatcher;
pub mod scheduler;
pub mod status_updater;
pub mod store;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use oneclick_core::types::DbId;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use self::status_updater::StatusUpdaterHandle;

/// Cancellation tokens of the campaigns currently being dispatched.
#[derive(Debug, Clone, Default)]
pub struct ActiveCampaigns {
    tokens: Arc<Mutex<HashMap<DbId, CancellationToken>>>,
}

impl ActiveCampaigns {
    /// Register a dispatch. Returns `None` if the campaign is already running.
    pub fn register(&self, campaign_id: DbId, token: CancellationToken) -> Option<CancellationToken> {
        let mut tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        if tokens.contains_key(&campaign_id) {
            return None;
        }
        tokens.insert(campaign_id, token.clone());
        Some(token)
    }

    /// Stop further submissions for a running campaign. Returns whether one was running.
    pub fn cancel(&self, campaign_id: DbId) -> bool {
        let tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        match tokens.get(&campaign_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, campaign_id: DbId) {
        self.tokens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&campaign_id);
    }

    pub fn is_active(&self, campaign_id: DbId) -> bool {
        self.tokens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&campaign_id)
    }
}

/// What request handlers need from the running engine.
#[derive(Clone)]
pub struct EngineHandle {
    wake: Arc<Notify>,
    active: ActiveCampaigns,
    status_updates: StatusUpdaterHandle,
}

impl EngineHandle {
    pub fn new(status_updates: StatusUpdaterHandle) -> Self {
        Self {
            wake: Arc::new(Notify::new()),
            active: ActiveCampaigns::default(),
            status_updates,
        }
    }

    /// Ask the scheduler to poll now instead of waiting for its next tick.
    pub fn wake_scheduler(&self) {
        self.wake.notify_one();
    }

    pub fn wake_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.wake)
    }

    /// Stop further submissions for a campaign if it is being dispatched.
    pub fn cancel_campaign(&self, campaign_id: DbId) -> bool {
        self.active.cancel(campaign_id)
    }

    pub fn active(&self) -> &ActiveCampaigns {
        &self.active
    }

    pub fn status_updates(&self) -> &StatusUpdaterHandle {
        &self.status_updates
    }
}
