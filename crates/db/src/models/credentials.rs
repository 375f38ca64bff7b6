//! Messaging API credentials entity.

use oneclick_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `meta_credentials` table.
///
/// The encrypted access token is never serialized.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct MetaCredentials {
    pub id: DbId,
    pub client_id: DbId,
    #[serde(skip_serializing)]
    pub access_token_encrypted: Vec<u8>,
    pub phone_number_id: String,
    pub waba_id: String,
    pub display_phone_number: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone)]
pub struct UpsertMetaCredentials {
    pub access_token_encrypted: Vec<u8>,
    pub phone_number_id: String,
    pub waba_id: String,
    pub display_phone_number: Option<String>,
}
