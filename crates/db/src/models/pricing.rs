//! Per-client pricing override entity and DTOs.

use oneclick_core::types::{DbId, Money, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `client_pricing` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ClientPricing {
    pub id: DbId,
    pub client_id: DbId,
    pub price_per_message: Money,
    pub currency: String,
    pub notes: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone)]
pub struct UpsertClientPricing {
    pub price_per_message: Money,
    pub currency: String,
    pub notes: Option<String>,
}
