//! Per-campaign dispatch.
//!
//! Recipients are funded in audience order by the dispatch task itself, so a
//! short balance always fails the tail of the audience. Funded messages are
//! then submitted on a bounded worker pool behind the shared rate limiter.
//! A debited message that ends `failed` is refunded.
//!
//! A message whose final state could not be written stays `queued`; the
//! campaign is then left in SENDING so the next resume settles it.

use std::sync::Arc;

use oneclick_core::phone::PhoneNumber;
use oneclick_core::template::{body_parameters, render};
use oneclick_core::types::DbId;
use oneclick_core::wallet::INSUFFICIENT_BALANCE_REASON;
use oneclick_whatsapp::{send_with_retry, MessagingApi, RateLimiter, RetryPolicy, TemplateMessage};
use rust_decimal::Decimal;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::store::{DispatchPlan, DispatchStore, Funding, Preparation};

/// Reason recorded on messages a crashed dispatch left in `queued`.
pub const REASON_INTERRUPTED: &str = "dispatch interrupted";

#[derive(Debug, Clone, Copy)]
pub struct DispatchSettings {
    /// Concurrent submissions per campaign.
    pub max_concurrency: usize,
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Completed,
    /// Stopped by a cancel or shutdown, or the campaign left SENDING.
    Stopped,
    /// Failed before any recipient was attempted.
    Aborted(String),
    /// Some results could not be recorded; the campaign stays SENDING.
    Incomplete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub outcome: DispatchOutcome,
    pub sent: usize,
    pub failed: usize,
    /// Failed for lack of balance; never submitted.
    pub unfunded: usize,
    /// Recipients that already had a message from an earlier run.
    pub skipped: usize,
    /// Leftover queued messages failed at startup.
    pub recovered: usize,
    /// Submitted messages whose result could not be written.
    pub unrecorded: usize,
}

impl DispatchReport {
    fn new(outcome: DispatchOutcome) -> Self {
        Self {
            outcome,
            sent: 0,
            failed: 0,
            unfunded: 0,
            skipped: 0,
            recovered: 0,
            unrecorded: 0,
        }
    }
}

enum Delivered {
    Sent,
    Failed,
    /// The store rejected the write; the message is still `queued`.
    Unrecorded,
}

pub struct Dispatcher {
    store: Arc<dyn DispatchStore>,
    api: Arc<dyn MessagingApi>,
    limiter: Arc<RateLimiter>,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn DispatchStore>,
        api: Arc<dyn MessagingApi>,
        limiter: Arc<RateLimiter>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            store,
            api,
            limiter,
            settings,
        }
    }

    /// Dispatch a campaign that has already been moved to SENDING.
    ///
    /// Cancelling `cancel` stops further submissions; sends already handed
    /// to the worker pool run to completion.
    pub async fn dispatch(
        &self,
        campaign_id: DbId,
        cancel: CancellationToken,
    ) -> Result<DispatchReport, sqlx::Error> {
        let recovered = self.recover_interrupted(campaign_id).await?;

        let plan = match self.store.prepare(campaign_id).await? {
            Preparation::Ready(plan) => Arc::new(*plan),
            Preparation::NotSending(status) => {
                tracing::info!(campaign_id, status = ?status, "Campaign is not sending, skipping");
                let mut report = DispatchReport::new(DispatchOutcome::Stopped);
                report.recovered = recovered;
                return Ok(report);
            }
            Preparation::Abort(reason) => {
                tracing::warn!(campaign_id, reason = %reason, "Campaign failed before dispatch");
                self.store.fail_campaign(campaign_id, &reason).await?;
                let mut report = DispatchReport::new(DispatchOutcome::Aborted(reason));
                report.recovered = recovered;
                return Ok(report);
            }
        };

        tracing::info!(
            campaign_id,
            client_id = plan.client_id,
            recipients = plan.recipients.len(),
            price = %plan.price,
            "Dispatching campaign",
        );

        let mut report = DispatchReport::new(DispatchOutcome::Completed);
        report.recovered = recovered;

        let mut tasks = JoinSet::new();
        let submitted = self.submit_all(&plan, &cancel, &mut tasks, &mut report).await;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Delivered::Sent) => report.sent += 1,
                Ok(Delivered::Failed) => report.failed += 1,
                Ok(Delivered::Unrecorded) => report.unrecorded += 1,
                Err(e) => {
                    tracing::error!(campaign_id, error = %e, "Send task panicked");
                    report.unrecorded += 1;
                }
            }
        }
        submitted?;

        if cancel.is_cancelled() {
            report.outcome = DispatchOutcome::Stopped;
        } else if report.unrecorded > 0 {
            tracing::warn!(
                campaign_id,
                unrecorded = report.unrecorded,
                "Leaving campaign in SENDING until every message is recorded",
            );
            report.outcome = DispatchOutcome::Incomplete;
        } else if !self.store.complete(campaign_id).await? {
            report.outcome = DispatchOutcome::Stopped;
        }

        tracing::info!(
            campaign_id,
            outcome = ?report.outcome,
            sent = report.sent,
            failed = report.failed,
            unfunded = report.unfunded,
            skipped = report.skipped,
            unrecorded = report.unrecorded,
            "Campaign dispatch finished",
        );
        Ok(report)
    }

    /// Fund each recipient in audience order and hand it to the worker pool.
    async fn submit_all(
        &self,
        plan: &Arc<DispatchPlan>,
        cancel: &CancellationToken,
        tasks: &mut JoinSet<Delivered>,
        report: &mut DispatchReport,
    ) -> Result<(), sqlx::Error> {
        let existing = self.store.existing_recipients(plan.campaign_id).await?;
        let workers = Arc::new(Semaphore::new(self.settings.max_concurrency.max(1)));

        for recipient in &plan.recipients {
            if existing.contains(recipient.as_str()) {
                report.skipped += 1;
                continue;
            }

            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = Arc::clone(&workers).acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break,
                },
            };

            let params = body_parameters(&plan.variables, plan.personalization.get(recipient));
            let content = render(&plan.body_text, &params);

            let Some(message_id) = self.store.queue_message(plan, recipient, &content).await?
            else {
                report.skipped += 1;
                continue;
            };

            if plan.price > Decimal::ZERO {
                if let Funding::Insufficient { balance } =
                    self.store.debit(plan.client_id, message_id, plan.price).await?
                {
                    tracing::info!(
                        campaign_id = plan.campaign_id,
                        message_id,
                        balance = %balance,
                        required = %plan.price,
                        "Insufficient balance for recipient",
                    );
                    self.store
                        .mark_failed(message_id, INSUFFICIENT_BALANCE_REASON, 0)
                        .await?;
                    report.unfunded += 1;
                    continue;
                }
            }

            tasks.spawn(deliver(
                Arc::clone(&self.store),
                Arc::clone(&self.api),
                Arc::clone(&self.limiter),
                Arc::clone(plan),
                message_id,
                template_message(plan, recipient, params),
                self.settings.retry,
                permit,
            ));
        }
        Ok(())
    }

    /// Fail and refund messages an earlier run left in `queued`.
    ///
    /// Whether the API saw them is unknown, so they are not resent.
    async fn recover_interrupted(&self, campaign_id: DbId) -> Result<usize, sqlx::Error> {
        let leftovers = self.store.queued_messages(campaign_id).await?;
        for msg in &leftovers {
            self.store.mark_failed(msg.id, REASON_INTERRUPTED, 0).await?;
            if let Some(cost) = msg.cost.filter(|c| *c > Decimal::ZERO) {
                self.store.refund(msg.client_id, msg.id, cost).await?;
            }
        }
        if !leftovers.is_empty() {
            tracing::warn!(
                campaign_id,
                count = leftovers.len(),
                "Failed messages left queued by an interrupted dispatch",
            );
        }
        Ok(leftovers.len())
    }
}

fn template_message(plan: &DispatchPlan, to: &PhoneNumber, params: Vec<String>) -> TemplateMessage {
    TemplateMessage {
        to: to.as_wa_id().to_string(),
        template_name: plan.template_name.clone(),
        language: plan.language.clone(),
        body_parameters: params,
    }
}

#[allow(clippy::too_many_arguments)]
async fn deliver(
    store: Arc<dyn DispatchStore>,
    api: Arc<dyn MessagingApi>,
    limiter: Arc<RateLimiter>,
    plan: Arc<DispatchPlan>,
    message_id: DbId,
    message: TemplateMessage,
    retry: RetryPolicy,
    _permit: OwnedSemaphorePermit,
) -> Delivered {
    let outcome =
        send_with_retry(api.as_ref(), &limiter, &plan.credentials, &message, retry).await;

    match outcome.result {
        Ok(receipt) => match store
            .mark_sent(message_id, &receipt.external_id, outcome.attempts)
            .await
        {
            Ok(()) => Delivered::Sent,
            Err(e) => {
                tracing::error!(
                    message_id,
                    external_id = %receipt.external_id,
                    error = %e,
                    "Failed to record sent message",
                );
                Delivered::Unrecorded
            }
        },
        Err(err) => {
            tracing::warn!(
                campaign_id = plan.campaign_id,
                message_id,
                attempts = outcome.attempts,
                error = %err,
                "Message delivery failed",
            );
            // Refunds are idempotent per message; recovery settles anything left queued.
            if plan.price > Decimal::ZERO {
                if let Err(e) = store.refund(plan.client_id, message_id, plan.price).await {
                    tracing::error!(message_id, error = %e, "Failed to refund message");
                    return Delivered::Unrecorded;
                }
            }
            match store
                .mark_failed(message_id, err.reason(), outcome.attempts)
                .await
            {
                Ok(()) => Delivered::Failed,
                Err(e) => {
                    tracing::error!(message_id, error = %e, "Failed to record failed message");
                    Delivered::Unrecorded
                }
            }
        }
    }
}
