//! Read-only aggregate queries over `wallet_transactions` and `messages`.

use oneclick_core::delivery::MessageStatus;
use oneclick_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::report::{CampaignCountsRow, LedgerTotalsRow};

/// Aggregations for the financial and performance reports.
pub struct ReportRepo;

impl ReportRepo {
    /// Ledger sums by kind for `created_at` in `[start, end]`.
    pub async fn ledger_totals(
        pool: &PgPool,
        client_id: DbId,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<LedgerTotalsRow, sqlx::Error> {
        sqlx::query_as::<_, LedgerTotalsRow>(
            "SELECT \
                 COALESCE(SUM(amount) FILTER (WHERE kind = 'top_up'), 0) AS top_ups, \
                 COALESCE(-SUM(amount) FILTER (WHERE kind = 'deduction'), 0) AS deductions, \
                 COALESCE(SUM(amount) FILTER (WHERE kind = 'refund'), 0) AS refunds, \
                 COUNT(*) AS transaction_count \
             FROM wallet_transactions \
             WHERE client_id = $1 AND created_at >= $2 AND created_at <= $3",
        )
        .bind(client_id)
        .bind(start)
        .bind(end)
        .fetch_one(pool)
        .await
    }

    /// Outgoing messages accepted by the API (sent, delivered or read) created in `[start, end]`.
    pub async fn count_messages_sent(
        pool: &PgPool,
        client_id: DbId,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<i64, sqlx::Error> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM messages \
             WHERE client_id = $1 AND direction = 'outgoing' \
               AND status_id = ANY($2) \
               AND created_at >= $3 AND created_at <= $4",
        )
        .bind(client_id)
        .bind(sent_ids())
        .bind(start)
        .bind(end)
        .fetch_one(pool)
        .await?;
        Ok(row.0)
    }

    /// Message counts per campaign; all of the client's campaigns when `campaign_id` is `None`.
    pub async fn campaign_counts(
        pool: &PgPool,
        client_id: DbId,
        campaign_id: Option<DbId>,
    ) -> Result<Vec<CampaignCountsRow>, sqlx::Error> {
        sqlx::query_as::<_, CampaignCountsRow>(
            "SELECT \
                 c.id AS campaign_id, \
                 c.name AS campaign_name, \
                 c.status_id, \
                 c.total_recipients, \
                 COUNT(m.id) AS attempted, \
                 COUNT(m.id) FILTER (WHERE m.status_id = ANY($3)) AS sent, \
                 COUNT(m.id) FILTER (WHERE m.status_id = ANY($4)) AS delivered, \
                 COUNT(m.id) FILTER (WHERE m.status_id = $5) AS read, \
                 COUNT(m.id) FILTER (WHERE m.status_id = $6) AS failed \
             FROM campaigns c \
             LEFT JOIN messages m \
                 ON m.campaign_id = c.id AND m.direction = 'outgoing' \
             WHERE c.client_id = $1 AND ($2::BIGINT IS NULL OR c.id = $2) \
             GROUP BY c.id \
             ORDER BY c.created_at DESC, c.id DESC",
        )
        .bind(client_id)
        .bind(campaign_id)
        .bind(sent_ids())
        .bind(vec![MessageStatus::Delivered.id(), MessageStatus::Read.id()])
        .bind(MessageStatus::Read.id())
        .bind(MessageStatus::Failed.id())
        .fetch_all(pool)
        .await
    }
}

fn sent_ids() -> Vec<i16> {
    MessageStatus::ALL
        .iter()
        .filter(|s| s.counts_as_sent())
        .map(|s| s.id())
        .collect()
}
