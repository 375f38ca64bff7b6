//! Repository for the `messages` table.
//!
//! Message status changes that resolve a campaign recipient bump the owning
//! campaign's counters in the same transaction.

use oneclick_core::delivery::{Direction, MessageStatus};
use oneclick_core::status::StatusId;
use oneclick_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::campaign::CampaignCounter;
use crate::models::message::{
    CreateIncomingMessage, CreateOutgoingMessage, Message, StatusUpdateOutcome,
};
use crate::repositories::CampaignRepo;

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "\
    id, client_id, campaign_id, external_id, direction, from_phone, to_phone, \
    content, status_id, failure_reason, attempts, cost, occurred_at, sent_at, \
    delivered_at, read_at, failed_at, created_at, updated_at";

/// Provides persistence for outgoing and incoming messages.
pub struct MessageRepo;

impl MessageRepo {
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Message>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM messages WHERE id = $1");
        sqlx::query_as::<_, Message>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Record a queued outgoing message.
    ///
    /// Returns `None` if the campaign already has a message for this recipient.
    pub async fn create_outgoing(
        pool: &PgPool,
        input: &CreateOutgoingMessage,
    ) -> Result<Option<Message>, sqlx::Error> {
        let query = format!(
            "INSERT INTO messages \
                (client_id, campaign_id, direction, from_phone, to_phone, content, status_id) \
             VALUES ($1, $2, 'outgoing', $3, $4, $5, $6) \
             ON CONFLICT (campaign_id, to_phone) \
                 WHERE direction = 'outgoing' AND campaign_id IS NOT NULL \
             DO NOTHING \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Message>(&query)
            .bind(input.client_id)
            .bind(input.campaign_id)
            .bind(&input.from_phone)
            .bind(&input.to_phone)
            .bind(&input.content)
            .bind(MessageStatus::Queued.id())
            .fetch_optional(pool)
            .await
    }

    /// Record an incoming message, deduplicated by external id.
    ///
    /// Returns `None` when the message was already stored.
    pub async fn insert_incoming(
        pool: &PgPool,
        input: &CreateIncomingMessage,
    ) -> Result<Option<Message>, sqlx::Error> {
        let query = format!(
            "INSERT INTO messages \
                (client_id, external_id, direction, from_phone, to_phone, content, \
                 status_id, occurred_at) \
             VALUES ($1, $2, 'incoming', $3, $4, $5, $6, $7) \
             ON CONFLICT (client_id, external_id) DO NOTHING \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Message>(&query)
            .bind(input.client_id)
            .bind(&input.external_id)
            .bind(&input.from_phone)
            .bind(&input.to_phone)
            .bind(&input.content)
            .bind(MessageStatus::Received.id())
            .bind(input.occurred_at)
            .fetch_optional(pool)
            .await
    }

    /// Queued -> sent after the API accepted the request.
    pub async fn mark_sent(
        pool: &PgPool,
        id: DbId,
        external_id: &str,
        attempts: i32,
    ) -> Result<Option<Message>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!(
            "UPDATE messages \
             SET status_id = $2, external_id = $3, attempts = $4, sent_at = NOW() \
             WHERE id = $1 AND status_id = $5 \
             RETURNING {COLUMNS}"
        );
        let updated = sqlx::query_as::<_, Message>(&query)
            .bind(id)
            .bind(MessageStatus::Sent.id())
            .bind(external_id)
            .bind(attempts)
            .bind(MessageStatus::Queued.id())
            .fetch_optional(&mut *tx)
            .await?;

        if let Some(campaign_id) = updated.as_ref().and_then(|m| m.campaign_id) {
            CampaignRepo::bump_counter(&mut *tx, campaign_id, CampaignCounter::Sent).await?;
        }

        tx.commit().await?;
        Ok(updated)
    }

    /// Queued -> failed with a reason (no funds, permanent rejection, retries exhausted).
    pub async fn mark_failed(
        pool: &PgPool,
        id: DbId,
        reason: &str,
        attempts: i32,
    ) -> Result<Option<Message>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!(
            "UPDATE messages \
             SET status_id = $2, failure_reason = $3, attempts = $4, failed_at = NOW() \
             WHERE id = $1 AND status_id = $5 \
             RETURNING {COLUMNS}"
        );
        let updated = sqlx::query_as::<_, Message>(&query)
            .bind(id)
            .bind(MessageStatus::Failed.id())
            .bind(reason)
            .bind(attempts)
            .bind(MessageStatus::Queued.id())
            .fetch_optional(&mut *tx)
            .await?;

        if let Some(campaign_id) = updated.as_ref().and_then(|m| m.campaign_id) {
            CampaignRepo::bump_counter(&mut *tx, campaign_id, CampaignCounter::Failed).await?;
        }

        tx.commit().await?;
        Ok(updated)
    }

    /// Apply a delivery callback, moving the status forward only.
    ///
    /// The row is locked while the transition is checked so concurrent
    /// callbacks for the same message serialize.
    pub async fn apply_status_update(
        pool: &PgPool,
        client_id: DbId,
        external_id: &str,
        next: MessageStatus,
        at: Timestamp,
        error: Option<&str>,
    ) -> Result<StatusUpdateOutcome, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let current: Option<(DbId, StatusId)> = sqlx::query_as(
            "SELECT id, status_id FROM messages \
             WHERE client_id = $1 AND external_id = $2 \
             FOR UPDATE",
        )
        .bind(client_id)
        .bind(external_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((id, status_id)) = current else {
            return Ok(StatusUpdateOutcome::UnknownMessage);
        };
        let Some(previous) = MessageStatus::from_id(status_id) else {
            return Ok(StatusUpdateOutcome::UnknownMessage);
        };
        if !previous.can_advance_to(next) {
            return Ok(StatusUpdateOutcome::Ignored { current: previous });
        }

        let stamp_column = match next {
            MessageStatus::Sent => "sent_at",
            MessageStatus::Delivered => "delivered_at",
            MessageStatus::Read => "read_at",
            _ => "failed_at",
        };
        let query = format!(
            "UPDATE messages \
             SET status_id = $2, {stamp_column} = COALESCE({stamp_column}, $3), \
                 failure_reason = COALESCE($4, failure_reason) \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        let message = sqlx::query_as::<_, Message>(&query)
            .bind(id)
            .bind(next.id())
            .bind(at)
            .bind(error)
            .fetch_one(&mut *tx)
            .await?;

        if let Some(campaign_id) = message.campaign_id {
            for counter in counters_for(previous, next) {
                CampaignRepo::bump_counter(&mut *tx, campaign_id, counter).await?;
            }
        }

        tx.commit().await?;
        Ok(StatusUpdateOutcome::Applied { message, previous })
    }

    // -----------------------------------------------------------------------
    // Inbox
    // -----------------------------------------------------------------------

    /// One page of a client's messages, newest first.
    pub async fn list_inbox(
        pool: &PgPool,
        client_id: DbId,
        direction: Option<Direction>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM messages \
             WHERE client_id = $1 AND ($2::TEXT IS NULL OR direction = $2) \
             ORDER BY occurred_at DESC, id DESC \
             LIMIT $3 OFFSET $4"
        );
        sqlx::query_as::<_, Message>(&query)
            .bind(client_id)
            .bind(direction.map(|d| d.as_str()))
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    pub async fn count_inbox(
        pool: &PgPool,
        client_id: DbId,
        direction: Option<Direction>,
    ) -> Result<i64, sqlx::Error> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM messages \
             WHERE client_id = $1 AND ($2::TEXT IS NULL OR direction = $2)",
        )
        .bind(client_id)
        .bind(direction.map(|d| d.as_str()))
        .fetch_one(pool)
        .await?;
        Ok(row.0)
    }

    // -----------------------------------------------------------------------
    // Campaign dispatch support
    // -----------------------------------------------------------------------

    /// Recipients that already have a message in this campaign.
    pub async fn recipients_with_messages(
        pool: &PgPool,
        campaign_id: DbId,
    ) -> Result<Vec<String>, sqlx::Error> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT to_phone FROM messages \
             WHERE campaign_id = $1 AND direction = 'outgoing'",
        )
        .bind(campaign_id)
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().map(|(p,)| p).collect())
    }

    /// Queued messages of a campaign, oldest first.
    pub async fn list_queued_for_campaign(
        pool: &PgPool,
        campaign_id: DbId,
    ) -> Result<Vec<Message>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM messages \
             WHERE campaign_id = $1 AND status_id = $2 \
             ORDER BY id"
        );
        sqlx::query_as::<_, Message>(&query)
            .bind(campaign_id)
            .bind(MessageStatus::Queued.id())
            .fetch_all(pool)
            .await
    }

    pub async fn list_for_campaign(
        pool: &PgPool,
        campaign_id: DbId,
    ) -> Result<Vec<Message>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM messages WHERE campaign_id = $1 ORDER BY id");
        sqlx::query_as::<_, Message>(&query)
            .bind(campaign_id)
            .fetch_all(pool)
            .await
    }
}

/// Counters to bump when a message moves `previous -> next`.
///
/// A callback may skip steps (queued straight to read), so every milestone
/// crossed is counted once.
fn counters_for(previous: MessageStatus, next: MessageStatus) -> Vec<CampaignCounter> {
    let mut out = Vec::new();
    if next == MessageStatus::Failed {
        out.push(CampaignCounter::Failed);
        return out;
    }
    if !previous.counts_as_sent() && next.counts_as_sent() {
        out.push(CampaignCounter::Sent);
    }
    if !previous.counts_as_delivered() && next.counts_as_delivered() {
        out.push(CampaignCounter::Delivered);
    }
    if next == MessageStatus::Read {
        out.push(CampaignCounter::Read);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skipping_to_read_counts_every_milestone() {
        assert_eq!(
            counters_for(MessageStatus::Queued, MessageStatus::Read),
            vec![
                CampaignCounter::Sent,
                CampaignCounter::Delivered,
                CampaignCounter::Read
            ]
        );
    }

    #[test]
    fn single_steps() {
        assert_eq!(
            counters_for(MessageStatus::Sent, MessageStatus::Delivered),
            vec![CampaignCounter::Delivered]
        );
        assert_eq!(
            counters_for(MessageStatus::Delivered, MessageStatus::Read),
            vec![CampaignCounter::Read]
        );
        assert_eq!(
            counters_for(MessageStatus::Sent, MessageStatus::Failed),
            vec![CampaignCounter::Failed]
        );
    }
}
