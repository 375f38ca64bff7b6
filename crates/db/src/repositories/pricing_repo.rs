//! Repository for the `client_pricing` table.

use oneclick_core::pricing::{self, PricingDefaults, ResolvedPrice};
use oneclick_core::types::DbId;
use sqlx::PgPool;

use crate::models::pricing::{ClientPricing, UpsertClientPricing};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, client_id, price_per_message, currency, notes, created_at, updated_at";

/// Provides CRUD operations for per-client pricing overrides.
pub struct PricingRepo;

impl PricingRepo {
    pub async fn find_for_client(
        pool: &PgPool,
        client_id: DbId,
    ) -> Result<Option<ClientPricing>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM client_pricing WHERE client_id = $1");
        sqlx::query_as::<_, ClientPricing>(&query)
            .bind(client_id)
            .fetch_optional(pool)
            .await
    }

    /// Create or replace the override for a client.
    pub async fn upsert(
        pool: &PgPool,
        client_id: DbId,
        input: &UpsertClientPricing,
    ) -> Result<ClientPricing, sqlx::Error> {
        let query = format!(
            "INSERT INTO client_pricing (client_id, price_per_message, currency, notes) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (client_id) DO UPDATE SET \
                 price_per_message = EXCLUDED.price_per_message, \
                 currency = EXCLUDED.currency, \
                 notes = EXCLUDED.notes \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ClientPricing>(&query)
            .bind(client_id)
            .bind(input.price_per_message)
            .bind(&input.currency)
            .bind(&input.notes)
            .fetch_one(pool)
            .await
    }

    /// Replace an existing override. Returns `None` if the client has none.
    pub async fn update(
        pool: &PgPool,
        client_id: DbId,
        input: &UpsertClientPricing,
    ) -> Result<Option<ClientPricing>, sqlx::Error> {
        let query = format!(
            "UPDATE client_pricing SET \
                 price_per_message = $2, currency = $3, notes = $4 \
             WHERE client_id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ClientPricing>(&query)
            .bind(client_id)
            .bind(input.price_per_message)
            .bind(&input.currency)
            .bind(&input.notes)
            .fetch_optional(pool)
            .await
    }

    /// Remove the override, reverting the client to the default. Returns `true` if a row was deleted.
    pub async fn delete(pool: &PgPool, client_id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM client_pricing WHERE client_id = $1")
            .bind(client_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list(
        pool: &PgPool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ClientPricing>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM client_pricing \
             ORDER BY client_id \
             LIMIT $1 OFFSET $2"
        );
        sqlx::query_as::<_, ClientPricing>(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Effective price for a client: the override if present, else `defaults`.
    pub async fn resolve(
        pool: &PgPool,
        client_id: DbId,
        defaults: &PricingDefaults,
    ) -> Result<ResolvedPrice, sqlx::Error> {
        let row = Self::find_for_client(pool, client_id).await?;
        Ok(pricing::resolve(
            row.map(|r| (r.price_per_message, r.currency)),
            defaults,
        ))
    }
}
