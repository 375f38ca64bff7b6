//! Background campaign scheduler.
//!
//! Polls every `poll_interval` (or immediately when woken by the send
//! endpoint) for campaigns that are PENDING_SEND or SCHEDULED and due. Uses
//! `SELECT FOR UPDATE SKIP LOCKED` via [`CampaignRepo::claim_next_ready`] so
//! one campaign is claimed by exactly one scheduler.
//!
//! Every cycle also resumes SENDING campaigns that no dispatch is working
//! on: ones a previous process left behind, and ones whose dispatch errored
//! or could not record every result. A campaign that keeps failing is
//! retried with exponential backoff.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use oneclick_core::delivery::backoff_delay;
use oneclick_core::types::DbId;
use oneclick_db::repositories::CampaignRepo;
use oneclick_db::DbPool;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::dispatcher::{DispatchOutcome, Dispatcher};
use super::EngineHandle;

#[derive(Debug, Clone, Copy)]
struct Stall {
    failures: u32,
    retry_at: Instant,
}

/// Consecutive dispatch failures per campaign and when each may run again.
#[derive(Debug, Clone)]
pub struct ResumeBackoff {
    base: Duration,
    stalls: Arc<Mutex<HashMap<DbId, Stall>>>,
}

impl ResumeBackoff {
    pub fn new(base: Duration) -> Self {
        Self {
            base,
            stalls: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Record one more failed dispatch. Returns the delay before the next try.
    pub fn record_failure(&self, campaign_id: DbId, now: Instant) -> Duration {
        let mut stalls = self.stalls.lock().unwrap_or_else(|e| e.into_inner());
        let failures = stalls.get(&campaign_id).map_or(0, |s| s.failures) + 1;
        let delay = backoff_delay(failures, self.base);
        stalls.insert(
            campaign_id,
            Stall {
                failures,
                retry_at: now + delay,
            },
        );
        delay
    }

    pub fn clear(&self, campaign_id: DbId) {
        self.stalls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&campaign_id);
    }

    pub fn is_due(&self, campaign_id: DbId, now: Instant) -> bool {
        self.stalls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&campaign_id)
            .map_or(true, |s| now >= s.retry_at)
    }

    pub fn failures(&self, campaign_id: DbId) -> u32 {
        self.stalls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&campaign_id)
            .map_or(0, |s| s.failures)
    }
}

pub struct CampaignScheduler {
    pool: DbPool,
    dispatcher: Arc<Dispatcher>,
    engine: EngineHandle,
    poll_interval: Duration,
    backoff: ResumeBackoff,
}

impl CampaignScheduler {
    /// Failed dispatches are retried after `poll_interval`, doubling per
    /// consecutive failure up to [`oneclick_core::delivery::MAX_BACKOFF`].
    pub fn new(
        pool: DbPool,
        dispatcher: Arc<Dispatcher>,
        engine: EngineHandle,
        poll_interval: Duration,
    ) -> Self {
        Self {
            pool,
            dispatcher,
            engine,
            poll_interval,
            backoff: ResumeBackoff::new(poll_interval),
        }
    }

    /// Run the scheduler loop until the cancellation token is triggered.
    ///
    /// The first cycle runs immediately. On shutdown running dispatches are
    /// cancelled and awaited.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        let wake = self.engine.wake_signal();
        let mut running = JoinSet::new();
        tracing::info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Campaign scheduler started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Campaign scheduler shutting down");
                    break;
                }
                _ = ticker.tick() => {}
                _ = wake.notified() => {}
            }

            while running.try_join_next().is_some() {}

            if let Err(e) = self.resume_stalled(&cancel, &mut running).await {
                tracing::error!(error = %e, "Failed to resume sending campaigns");
            }
            if let Err(e) = self.claim_ready(&cancel, &mut running).await {
                tracing::error!(error = %e, "Scheduling cycle failed");
            }
        }

        while running.join_next().await.is_some() {}
    }

    /// Restart SENDING campaigns with no live dispatch once their backoff expires.
    async fn resume_stalled(
        &self,
        cancel: &CancellationToken,
        running: &mut JoinSet<()>,
    ) -> Result<(), sqlx::Error> {
        let now = Instant::now();
        for campaign in CampaignRepo::list_sending(&self.pool).await? {
            if self.engine.active().is_active(campaign.id) || !self.backoff.is_due(campaign.id, now)
            {
                continue;
            }
            tracing::info!(
                campaign_id = campaign.id,
                failures = self.backoff.failures(campaign.id),
                "Resuming sending campaign",
            );
            self.spawn_dispatch(campaign.id, cancel, running);
        }
        Ok(())
    }

    /// Claim every campaign that is ready right now.
    async fn claim_ready(
        &self,
        cancel: &CancellationToken,
        running: &mut JoinSet<()>,
    ) -> Result<(), sqlx::Error> {
        while let Some(campaign) = CampaignRepo::claim_next_ready(&self.pool, Utc::now()).await? {
            tracing::info!(
                campaign_id = campaign.id,
                client_id = campaign.client_id,
                recipients = campaign.total_recipients,
                "Campaign claimed for dispatch",
            );
            self.spawn_dispatch(campaign.id, cancel, running);
        }
        Ok(())
    }

    fn spawn_dispatch(&self, campaign_id: DbId, cancel: &CancellationToken, running: &mut JoinSet<()>) {
        let active = self.engine.active().clone();
        let Some(token) = active.register(campaign_id, cancel.child_token()) else {
            tracing::debug!(campaign_id, "Campaign already dispatching");
            return;
        };

        let dispatcher = Arc::clone(&self.dispatcher);
        let backoff = self.backoff.clone();
        running.spawn(async move {
            let settled = match dispatcher.dispatch(campaign_id, token).await {
                Ok(report) => report.outcome != DispatchOutcome::Incomplete,
                Err(e) => {
                    tracing::error!(campaign_id, error = %e, "Campaign dispatch failed");
                    false
                }
            };
            // Record the backoff before releasing the campaign to the resume pass.
            if settled {
                backoff.clear(campaign_id);
            } else {
                let delay = backoff.record_failure(campaign_id, Instant::now());
                tracing::warn!(
                    campaign_id,
                    failures = backoff.failures(campaign_id),
                    retry_in_ms = delay.as_millis() as u64,
                    "Campaign left in SENDING, will retry",
                );
            }
            active.remove(campaign_id);
        });
    }
}
