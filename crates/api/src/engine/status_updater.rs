//! Partitioned delivery-status updater.
//!
//! Callbacks are routed to one of N single-consumer queues by a hash of the
//! external message id, so updates for the same message are applied one at a
//! time and in arrival order while different messages proceed in parallel.
//! The repository only ever moves a status forward.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use oneclick_core::types::DbId;
use oneclick_db::models::message::StatusUpdateOutcome;
use oneclick_db::repositories::MessageRepo;
use oneclick_db::DbPool;
use oneclick_whatsapp::webhook::StatusUpdate;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const CHANNEL_CAPACITY: usize = 1024;

/// A callback can beat the `mark_sent` that records its external id.
const UNKNOWN_RETRY_LIMIT: u32 = 3;
const UNKNOWN_RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct StatusEvent {
    pub client_id: DbId,
    pub update: StatusUpdate,
    retries: u32,
}

/// Stable partition index for an external message id.
pub fn partition_of(external_id: &str, partitions: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    external_id.hash(&mut hasher);
    (hasher.finish() % partitions.max(1) as u64) as usize
}

/// Cloneable sender side of the partitions.
#[derive(Debug, Clone)]
pub struct StatusUpdaterHandle {
    senders: Arc<Vec<mpsc::Sender<StatusEvent>>>,
}

impl StatusUpdaterHandle {
    pub fn partitions(&self) -> usize {
        self.senders.len()
    }

    /// Queue a callback for `client_id`. Returns `false` once the updater has stopped.
    pub async fn submit(&self, client_id: DbId, update: StatusUpdate) -> bool {
        self.send(StatusEvent {
            client_id,
            update,
            retries: 0,
        })
        .await
    }

    async fn send(&self, event: StatusEvent) -> bool {
        let index = partition_of(&event.update.external_id, self.senders.len());
        self.senders[index].send(event).await.is_ok()
    }
}

pub struct StatusUpdater;

impl StatusUpdater {
    /// Spawn `partitions` workers that run until `cancel` fires.
    pub fn start(
        pool: DbPool,
        partitions: usize,
        cancel: CancellationToken,
    ) -> (StatusUpdaterHandle, Vec<JoinHandle<()>>) {
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..partitions.max(1))
            .map(|_| mpsc::channel(CHANNEL_CAPACITY))
            .unzip();
        let handle = StatusUpdaterHandle {
            senders: Arc::new(senders),
        };

        let workers = receivers
            .into_iter()
            .enumerate()
            .map(|(index, rx)| {
                tokio::spawn(run_partition(
                    pool.clone(),
                    index,
                    rx,
                    handle.clone(),
                    cancel.clone(),
                ))
            })
            .collect();

        tracing::info!(partitions = handle.partitions(), "Status updater started");
        (handle, workers)
    }
}

async fn run_partition(
    pool: DbPool,
    index: usize,
    mut rx: mpsc::Receiver<StatusEvent>,
    requeue: StatusUpdaterHandle,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!(partition = index, "Status updater partition shutting down");
                break;
            }
            event = rx.recv() => {
                let Some(event) = event else { break };
                if let Err(e) = apply(&pool, event, &requeue).await {
                    tracing::error!(partition = index, error = %e, "Failed to apply status update");
                }
            }
        }
    }
}

async fn apply(
    pool: &DbPool,
    event: StatusEvent,
    requeue: &StatusUpdaterHandle,
) -> Result<(), sqlx::Error> {
    let update = &event.update;
    let outcome = MessageRepo::apply_status_update(
        pool,
        event.client_id,
        &update.external_id,
        update.status,
        update.timestamp,
        update.error.as_deref(),
    )
    .await?;

    match outcome {
        StatusUpdateOutcome::Applied { message, previous } => {
            tracing::debug!(
                message_id = message.id,
                external_id = %update.external_id,
                from = %previous,
                to = %update.status,
                "Message status advanced",
            );
        }
        StatusUpdateOutcome::Ignored { current } => {
            tracing::debug!(
                external_id = %update.external_id,
                current = %current,
                received = %update.status,
                "Stale status update ignored",
            );
        }
        StatusUpdateOutcome::UnknownMessage if event.retries < UNKNOWN_RETRY_LIMIT => {
            let requeue = requeue.clone();
            let retry = StatusEvent {
                retries: event.retries + 1,
                ..event
            };
            tokio::spawn(async move {
                tokio::time::sleep(UNKNOWN_RETRY_DELAY).await;
                requeue.send(retry).await;
            });
        }
        StatusUpdateOutcome::UnknownMessage => {
            tracing::warn!(
                client_id = event.client_id,
                external_id = %update.external_id,
                "Status update for unknown message dropped",
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_is_stable_and_in_range() {
        for id in ["wamid.a", "wamid.b", "wamid.HBgLMTU1NTAwMDAwMDEVAgARGBI"] {
            let first = partition_of(id, 4);
            assert!(first < 4);
            assert_eq!(first, partition_of(id, 4));
        }
    }

    #[test]
    fn zero_partitions_is_treated_as_one() {
        assert_eq!(partition_of("wamid.a", 0), 0);
        assert_eq!(partition_of("wamid.a", 1), 0);
    }

    #[test]
    fn ids_spread_over_partitions() {
        let used: std::collections::HashSet<usize> = (0..64)
            .map(|i| partition_of(&format!("wamid.{i}"), 4))
            .collect();
        assert!(used.len() > 1);
    }
}
