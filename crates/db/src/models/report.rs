//! Aggregate rows read by the reporting queries.

use oneclick_core::reporting::CampaignCounts;
use oneclick_core::status::StatusId;
use oneclick_core::types::{DbId, Money};
use sqlx::FromRow;

/// Per-campaign message counts.
#[derive(Debug, Clone, FromRow)]
pub struct CampaignCountsRow {
    pub campaign_id: DbId,
    pub campaign_name: String,
    pub status_id: StatusId,
    pub total_recipients: i32,
    pub attempted: i64,
    pub sent: i64,
    pub delivered: i64,
    pub read: i64,
    pub failed: i64,
}

impl CampaignCountsRow {
    pub fn counts(&self) -> CampaignCounts {
        CampaignCounts {
            recipients: i64::from(self.total_recipients),
            attempted: self.attempted,
            sent: self.sent,
            delivered: self.delivered,
            read: self.read,
            failed: self.failed,
        }
    }
}

/// Ledger sums by kind, as positive magnitudes.
#[derive(Debug, Clone, FromRow)]
pub struct LedgerTotalsRow {
    pub top_ups: Money,
    pub deductions: Money,
    pub refunds: Money,
    pub transaction_count: i64,
}
