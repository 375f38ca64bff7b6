//! Message delivery status ordering and retry backoff.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::define_status_enum;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Upper bound on a single retry delay.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Maximum jitter added on top of a backoff delay, as a percentage.
pub const JITTER_PERCENT: u64 = 10;

// ---------------------------------------------------------------------------
// Message status
// ---------------------------------------------------------------------------

define_status_enum! {
    /// Per-message status, seeded into `message_statuses`.
    MessageStatus {
        Queued = 1 => "queued",
        Sent = 2 => "sent",
        Delivered = 3 => "delivered",
        Read = 4 => "read",
        Failed = 5 => "failed",
        /// The only status an incoming message carries.
        Received = 6 => "received",
    }
}

impl MessageStatus {
    /// Whether a status update from `self` to `next` moves forward.
    ///
    /// `queued -> sent -> delivered -> read`; `failed` only from queued or
    /// sent. Repeats, backward moves and anything touching `received` are
    /// rejected.
    pub fn can_advance_to(self, next: MessageStatus) -> bool {
        use MessageStatus::*;
        match (self, next) {
            (Queued, Sent | Delivered | Read | Failed) => true,
            (Sent, Delivered | Read | Failed) => true,
            (Delivered, Read) => true,
            _ => false,
        }
    }

    /// The API accepted the message (it may have progressed further since).
    pub fn counts_as_sent(self) -> bool {
        matches!(
            self,
            MessageStatus::Sent | MessageStatus::Delivered | MessageStatus::Read
        )
    }

    pub fn counts_as_delivered(self) -> bool {
        matches!(self, MessageStatus::Delivered | MessageStatus::Read)
    }

    /// A recipient is resolved once its message left `queued`.
    pub fn is_resolved(self) -> bool {
        self.counts_as_sent() || self == MessageStatus::Failed
    }

    /// Map a Cloud API webhook status string.
    pub fn from_callback(status: &str) -> Option<Self> {
        match status.to_ascii_lowercase().as_str() {
            "sent" => Some(MessageStatus::Sent),
            "delivered" => Some(MessageStatus::Delivered),
            "read" => Some(MessageStatus::Read),
            "failed" => Some(MessageStatus::Failed),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Direction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Incoming,
    Outgoing,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Incoming => "incoming",
            Direction::Outgoing => "outgoing",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "incoming" => Some(Direction::Incoming),
            "outgoing" => Some(Direction::Outgoing),
            _ => None,
        }
    }
}

/// The non-platform side of a message: the sender of incoming messages,
/// the recipient of outgoing ones.
pub fn counterpart<'a>(direction: Direction, from: &'a str, to: &'a str) -> &'a str {
    match direction {
        Direction::Incoming => from,
        Direction::Outgoing => to,
    }
}

// ---------------------------------------------------------------------------
// Backoff
// ---------------------------------------------------------------------------

/// Delay before the attempt following failed attempt `attempt` (1-based),
/// without jitter: `base * 2^(attempt - 1)`, capped at [`MAX_BACKOFF`].
pub fn backoff_delay(attempt: u32, base: Duration) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << exp).min(MAX_BACKOFF)
}

/// [`backoff_delay`] plus up to [`JITTER_PERCENT`] random jitter.
pub fn backoff_with_jitter(attempt: u32, base: Duration) -> Duration {
    let delay = backoff_delay(attempt, base);
    let max_jitter_ms = delay.as_millis() as u64 * JITTER_PERCENT / 100;
    if max_jitter_ms == 0 {
        return delay;
    }
    let jitter = rand::rng().random_range(0..=max_jitter_ms);
    delay + Duration::from_millis(jitter)
}
