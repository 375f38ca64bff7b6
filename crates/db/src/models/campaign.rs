//! Campaign entity and DTOs.

use oneclick_core::campaign::CampaignStatus;
use oneclick_core::status::StatusId;
use oneclick_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `campaigns` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Campaign {
    pub id: DbId,
    pub client_id: DbId,
    pub name: String,
    pub template_id: DbId,
    /// Ordered array of canonical phone numbers.
    pub audience: serde_json::Value,
    /// `{ phone: { variable: value } }`.
    pub personalization: serde_json::Value,
    pub status_id: StatusId,
    pub scheduled_at: Option<Timestamp>,
    pub total_recipients: i32,
    pub messages_sent_count: i32,
    pub messages_delivered_count: i32,
    pub messages_read_count: i32,
    pub messages_failed_count: i32,
    pub actual_sent_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub failure_reason: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Campaign {
    pub fn status(&self) -> Option<CampaignStatus> {
        CampaignStatus::from_id(self.status_id)
    }
}

/// Validated insert for a new campaign.
#[derive(Debug, Clone)]
pub struct CreateCampaign {
    pub client_id: DbId,
    pub name: String,
    pub template_id: DbId,
    pub audience: serde_json::Value,
    pub total_recipients: i32,
    pub personalization: serde_json::Value,
    pub status: CampaignStatus,
    pub scheduled_at: Option<Timestamp>,
}

/// Validated patch. `None` leaves a column unchanged.
#[derive(Debug, Clone, Default)]
pub struct UpdateCampaign {
    pub name: Option<String>,
    pub template_id: Option<DbId>,
    pub audience: Option<serde_json::Value>,
    pub total_recipients: Option<i32>,
    pub personalization: Option<serde_json::Value>,
    /// `Some(None)` clears the schedule.
    pub scheduled_at: Option<Option<Timestamp>>,
    pub status: Option<CampaignStatus>,
}

/// Per-campaign counters bumped as messages resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CampaignCounter {
    Sent,
    Delivered,
    Read,
    Failed,
}

impl CampaignCounter {
    pub(crate) fn column(self) -> &'static str {
        match self {
            CampaignCounter::Sent => "messages_sent_count",
            CampaignCounter::Delivered => "messages_delivered_count",
            CampaignCounter::Read => "messages_read_count",
            CampaignCounter::Failed => "messages_failed_count",
        }
    }
}
