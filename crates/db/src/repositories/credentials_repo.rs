//! Repository for the `meta_credentials` table.

use oneclick_core::types::DbId;
use sqlx::PgPool;

use crate::models::credentials::{MetaCredentials, UpsertMetaCredentials};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "\
    id, client_id, access_token_encrypted, phone_number_id, waba_id, \
    display_phone_number, created_at, updated_at";

/// Stores one set of messaging API credentials per client.
pub struct CredentialsRepo;

impl CredentialsRepo {
    pub async fn upsert(
        pool: &PgPool,
        client_id: DbId,
        input: &UpsertMetaCredentials,
    ) -> Result<MetaCredentials, sqlx::Error> {
        let query = format!(
            "INSERT INTO meta_credentials \
                (client_id, access_token_encrypted, phone_number_id, waba_id, display_phone_number) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (client_id) DO UPDATE SET \
                 access_token_encrypted = EXCLUDED.access_token_encrypted, \
                 phone_number_id = EXCLUDED.phone_number_id, \
                 waba_id = EXCLUDED.waba_id, \
                 display_phone_number = EXCLUDED.display_phone_number \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, MetaCredentials>(&query)
            .bind(client_id)
            .bind(&input.access_token_encrypted)
            .bind(&input.phone_number_id)
            .bind(&input.waba_id)
            .bind(&input.display_phone_number)
            .fetch_one(pool)
            .await
    }

    pub async fn find_for_client(
        pool: &PgPool,
        client_id: DbId,
    ) -> Result<Option<MetaCredentials>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM meta_credentials WHERE client_id = $1");
        sqlx::query_as::<_, MetaCredentials>(&query)
            .bind(client_id)
            .fetch_optional(pool)
            .await
    }

    /// Resolve the owning client of a WhatsApp Business Account id (webhook `entry.id`).
    pub async fn find_by_waba_id(
        pool: &PgPool,
        waba_id: &str,
    ) -> Result<Option<MetaCredentials>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM meta_credentials WHERE waba_id = $1");
        sqlx::query_as::<_, MetaCredentials>(&query)
            .bind(waba_id)
            .fetch_optional(pool)
            .await
    }

    /// Fallback lookup by the phone-number id in webhook metadata.
    pub async fn find_by_phone_number_id(
        pool: &PgPool,
        phone_number_id: &str,
    ) -> Result<Option<MetaCredentials>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM meta_credentials WHERE phone_number_id = $1 \
             ORDER BY id LIMIT 1"
        );
        sqlx::query_as::<_, MetaCredentials>(&query)
            .bind(phone_number_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn delete(pool: &PgPool, client_id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM meta_credentials WHERE client_id = $1")
            .bind(client_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
