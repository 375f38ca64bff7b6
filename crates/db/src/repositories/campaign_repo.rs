//! Repository for the `campaigns` table.

use oneclick_core::campaign::CampaignStatus;
use oneclick_core::status::StatusId;
use oneclick_core::types::{DbId, Timestamp};
use sqlx::{PgExecutor, PgPool};

use crate::models::campaign::{Campaign, CampaignCounter, CreateCampaign, UpdateCampaign};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "\
    id, client_id, name, template_id, audience, personalization, status_id, \
    scheduled_at, total_recipients, messages_sent_count, messages_delivered_count, \
    messages_read_count, messages_failed_count, actual_sent_at, completed_at, \
    failure_reason, created_at, updated_at";

fn ids(statuses: &[CampaignStatus]) -> Vec<StatusId> {
    statuses.iter().map(|s| s.id()).collect()
}

/// Provides CRUD, state transitions and counters for campaigns.
pub struct CampaignRepo;

impl CampaignRepo {
    /// Insert a new campaign, returning the created row.
    pub async fn create(pool: &PgPool, input: &CreateCampaign) -> Result<Campaign, sqlx::Error> {
        let query = format!(
            "INSERT INTO campaigns \
                (client_id, name, template_id, audience, total_recipients, \
                 personalization, status_id, scheduled_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Campaign>(&query)
            .bind(input.client_id)
            .bind(&input.name)
            .bind(input.template_id)
            .bind(&input.audience)
            .bind(input.total_recipients)
            .bind(&input.personalization)
            .bind(input.status.id())
            .bind(input.scheduled_at)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Campaign>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM campaigns WHERE id = $1");
        sqlx::query_as::<_, Campaign>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a campaign owned by `client_id`.
    pub async fn find_for_client(
        pool: &PgPool,
        client_id: DbId,
        id: DbId,
    ) -> Result<Option<Campaign>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM campaigns WHERE id = $1 AND client_id = $2");
        sqlx::query_as::<_, Campaign>(&query)
            .bind(id)
            .bind(client_id)
            .fetch_optional(pool)
            .await
    }

    /// List a client's campaigns, newest first, optionally filtered by status.
    pub async fn list_for_client(
        pool: &PgPool,
        client_id: DbId,
        status: Option<CampaignStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Campaign>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM campaigns \
             WHERE client_id = $1 AND ($2::SMALLINT IS NULL OR status_id = $2) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $3 OFFSET $4"
        );
        sqlx::query_as::<_, Campaign>(&query)
            .bind(client_id)
            .bind(status.map(|s| s.id()))
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Apply a patch, but only if the campaign is still in `expected` status.
    ///
    /// Returns `None` when the row is missing or its status changed underneath.
    pub async fn update(
        pool: &PgPool,
        client_id: DbId,
        id: DbId,
        expected: CampaignStatus,
        input: &UpdateCampaign,
    ) -> Result<Option<Campaign>, sqlx::Error> {
        let (touch_schedule, scheduled_at) = match input.scheduled_at {
            Some(value) => (true, value),
            None => (false, None),
        };
        let query = format!(
            "UPDATE campaigns SET \
                 name = COALESCE($4, name), \
                 template_id = COALESCE($5, template_id), \
                 audience = COALESCE($6, audience), \
                 total_recipients = COALESCE($7, total_recipients), \
                 personalization = COALESCE($8, personalization), \
                 scheduled_at = CASE WHEN $9 THEN $10 ELSE scheduled_at END, \
                 status_id = COALESCE($11, status_id) \
             WHERE id = $1 AND client_id = $2 AND status_id = $3 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Campaign>(&query)
            .bind(id)
            .bind(client_id)
            .bind(expected.id())
            .bind(&input.name)
            .bind(input.template_id)
            .bind(&input.audience)
            .bind(input.total_recipients)
            .bind(&input.personalization)
            .bind(touch_schedule)
            .bind(scheduled_at)
            .bind(input.status.map(|s| s.id()))
            .fetch_optional(pool)
            .await
    }

    /// Delete a campaign if its status is one of `allowed`. Returns `true` if a row was removed.
    pub async fn delete(
        pool: &PgPool,
        client_id: DbId,
        id: DbId,
        allowed: &[CampaignStatus],
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM campaigns WHERE id = $1 AND client_id = $2 AND status_id = ANY($3)",
        )
        .bind(id)
        .bind(client_id)
        .bind(ids(allowed))
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // -----------------------------------------------------------------------
    // State transitions
    // -----------------------------------------------------------------------

    /// Move the campaign to `to` if it is currently in one of the legal sources.
    ///
    /// The conditional `UPDATE` is the per-campaign serialization point: of
    /// two concurrent actors only one sees a row returned.
    pub async fn transition(
        pool: &PgPool,
        id: DbId,
        to: CampaignStatus,
    ) -> Result<Option<Campaign>, sqlx::Error> {
        let from = CampaignStatus::sources_of(to);
        let query = format!(
            "UPDATE campaigns SET \
                 status_id = $2, \
                 actual_sent_at = CASE WHEN $2 = $4 THEN COALESCE(actual_sent_at, NOW()) \
                                       ELSE actual_sent_at END, \
                 completed_at = CASE WHEN $5 THEN NOW() ELSE completed_at END \
             WHERE id = $1 AND status_id = ANY($3) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Campaign>(&query)
            .bind(id)
            .bind(to.id())
            .bind(ids(&from))
            .bind(CampaignStatus::Sending.id())
            .bind(to.is_terminal())
            .fetch_optional(pool)
            .await
    }

    /// Mark a SENDING campaign FAILED with a reason.
    pub async fn mark_failed(
        pool: &PgPool,
        id: DbId,
        reason: &str,
    ) -> Result<Option<Campaign>, sqlx::Error> {
        let query = format!(
            "UPDATE campaigns SET status_id = $2, failure_reason = $3, completed_at = NOW() \
             WHERE id = $1 AND status_id = $4 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Campaign>(&query)
            .bind(id)
            .bind(CampaignStatus::Failed.id())
            .bind(reason)
            .bind(CampaignStatus::Sending.id())
            .fetch_optional(pool)
            .await
    }

    /// Atomically claim the next campaign ready for dispatch and move it to SENDING.
    ///
    /// Ready means PENDING_SEND, or SCHEDULED with `scheduled_at <= now`.
    /// Uses `FOR UPDATE SKIP LOCKED` so concurrent schedulers never claim the
    /// same campaign.
    pub async fn claim_next_ready(
        pool: &PgPool,
        now: Timestamp,
    ) -> Result<Option<Campaign>, sqlx::Error> {
        let query = format!(
            "UPDATE campaigns \
             SET status_id = $1, actual_sent_at = COALESCE(actual_sent_at, NOW()) \
             WHERE id = ( \
                 SELECT id FROM campaigns \
                 WHERE status_id = $2 OR (status_id = $3 AND scheduled_at <= $4) \
                 ORDER BY COALESCE(scheduled_at, updated_at) ASC, id ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Campaign>(&query)
            .bind(CampaignStatus::Sending.id())
            .bind(CampaignStatus::PendingSend.id())
            .bind(CampaignStatus::Scheduled.id())
            .bind(now)
            .fetch_optional(pool)
            .await
    }

    /// Campaigns left in SENDING (e.g. after a restart).
    pub async fn list_sending(pool: &PgPool) -> Result<Vec<Campaign>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM campaigns WHERE status_id = $1 ORDER BY id");
        sqlx::query_as::<_, Campaign>(&query)
            .bind(CampaignStatus::Sending.id())
            .fetch_all(pool)
            .await
    }

    pub async fn status_of(pool: &PgPool, id: DbId) -> Result<Option<CampaignStatus>, sqlx::Error> {
        let row: Option<(StatusId,)> = sqlx::query_as("SELECT status_id FROM campaigns WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(row.and_then(|(sid,)| CampaignStatus::from_id(sid)))
    }

    // -----------------------------------------------------------------------
    // Counters
    // -----------------------------------------------------------------------

    /// Increment a counter by one, never past `total_recipients`.
    ///
    /// Returns `false` when the guard prevented the increment.
    pub async fn bump_counter<'e, E>(
        executor: E,
        id: DbId,
        counter: CampaignCounter,
    ) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let column = counter.column();
        let query = format!(
            "UPDATE campaigns SET {column} = {column} + 1 \
             WHERE id = $1 AND {column} < total_recipients"
        );
        let result = sqlx::query(&query).bind(id).execute(executor).await?;
        Ok(result.rows_affected() > 0)
    }
}
