//! Message entity and DTOs.

use oneclick_core::delivery::{Direction, MessageStatus};
use oneclick_core::inbox::InboxMessage;
use oneclick_core::status::StatusId;
use oneclick_core::types::{DbId, Money, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `messages` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Message {
    pub id: DbId,
    pub client_id: DbId,
    pub campaign_id: Option<DbId>,
    pub external_id: Option<String>,
    pub direction: String,
    pub from_phone: String,
    pub to_phone: String,
    pub content: String,
    pub status_id: StatusId,
    pub failure_reason: Option<String>,
    pub attempts: i32,
    pub cost: Option<Money>,
    pub occurred_at: Timestamp,
    pub sent_at: Option<Timestamp>,
    pub delivered_at: Option<Timestamp>,
    pub read_at: Option<Timestamp>,
    pub failed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Message {
    pub fn status(&self) -> Option<MessageStatus> {
        MessageStatus::from_id(self.status_id)
    }

    /// Inbox view of the row; `None` if the row carries an unknown status or direction.
    pub fn to_inbox(&self) -> Option<InboxMessage> {
        Some(InboxMessage {
            id: self.id,
            external_id: self.external_id.clone(),
            campaign_id: self.campaign_id,
            from_phone: self.from_phone.clone(),
            to_phone: self.to_phone.clone(),
            content: self.content.clone(),
            direction: Direction::parse(&self.direction)?,
            status: self.status()?,
            timestamp: self.occurred_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct CreateOutgoingMessage {
    pub client_id: DbId,
    pub campaign_id: Option<DbId>,
    pub from_phone: String,
    pub to_phone: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct CreateIncomingMessage {
    pub client_id: DbId,
    pub external_id: String,
    pub from_phone: String,
    pub to_phone: String,
    pub content: String,
    pub occurred_at: Timestamp,
}

/// Outcome of applying a delivery callback.
#[derive(Debug, Clone)]
pub enum StatusUpdateOutcome {
    Applied {
        message: Message,
        previous: MessageStatus,
    },
    /// Backward, repeated, or otherwise stale update.
    Ignored { current: MessageStatus },
    UnknownMessage,
}
