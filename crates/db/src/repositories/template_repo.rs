//! Repository for the `message_templates` table.

use oneclick_core::types::DbId;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::models::template::{CreateTemplate, MessageTemplate, UpdateTemplate};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "\
    id, client_id, name, category, language, structure, variables, status, \
    external_template_id, created_at, updated_at";

/// Provides CRUD operations for message templates.
pub struct TemplateRepo;

impl TemplateRepo {
    pub async fn create(
        pool: &PgPool,
        input: &CreateTemplate,
    ) -> Result<MessageTemplate, sqlx::Error> {
        let query = format!(
            "INSERT INTO message_templates \
                (client_id, name, category, language, structure, variables, status, \
                 external_template_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, MessageTemplate>(&query)
            .bind(input.client_id)
            .bind(&input.name)
            .bind(&input.category)
            .bind(&input.language)
            .bind(Json(&input.structure))
            .bind(Json(&input.variables))
            .bind(&input.status)
            .bind(&input.external_template_id)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<MessageTemplate>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM message_templates WHERE id = $1");
        sqlx::query_as::<_, MessageTemplate>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_for_client(
        pool: &PgPool,
        client_id: DbId,
        id: DbId,
    ) -> Result<Option<MessageTemplate>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM message_templates WHERE id = $1 AND client_id = $2");
        sqlx::query_as::<_, MessageTemplate>(&query)
            .bind(id)
            .bind(client_id)
            .fetch_optional(pool)
            .await
    }

    /// A client's template by its provider name and language.
    pub async fn find_by_name(
        pool: &PgPool,
        client_id: DbId,
        name: &str,
        language: &str,
    ) -> Result<Option<MessageTemplate>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM message_templates \
             WHERE client_id = $1 AND name = $2 AND language = $3"
        );
        sqlx::query_as::<_, MessageTemplate>(&query)
            .bind(client_id)
            .bind(name)
            .bind(language)
            .fetch_optional(pool)
            .await
    }

    /// List a client's templates by name, optionally filtered by status.
    pub async fn list_for_client(
        pool: &PgPool,
        client_id: DbId,
        status: Option<&str>,
    ) -> Result<Vec<MessageTemplate>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM message_templates \
             WHERE client_id = $1 AND ($2::TEXT IS NULL OR UPPER(status) = UPPER($2)) \
             ORDER BY name, language"
        );
        sqlx::query_as::<_, MessageTemplate>(&query)
            .bind(client_id)
            .bind(status)
            .fetch_all(pool)
            .await
    }

    pub async fn update(
        pool: &PgPool,
        client_id: DbId,
        id: DbId,
        input: &UpdateTemplate,
    ) -> Result<Option<MessageTemplate>, sqlx::Error> {
        let query = format!(
            "UPDATE message_templates SET \
                 name = COALESCE($3, name), \
                 category = COALESCE($4, category), \
                 language = COALESCE($5, language), \
                 structure = COALESCE($6, structure), \
                 variables = COALESCE($7, variables), \
                 status = COALESCE($8, status), \
                 external_template_id = COALESCE($9, external_template_id) \
             WHERE id = $1 AND client_id = $2 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, MessageTemplate>(&query)
            .bind(id)
            .bind(client_id)
            .bind(&input.name)
            .bind(&input.category)
            .bind(&input.language)
            .bind(input.structure.as_ref().map(Json))
            .bind(input.variables.as_ref().map(Json))
            .bind(&input.status)
            .bind(&input.external_template_id)
            .fetch_optional(pool)
            .await
    }

    /// Delete a template. Fails with a foreign-key violation while campaigns reference it.
    pub async fn delete(pool: &PgPool, client_id: DbId, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM message_templates WHERE id = $1 AND client_id = $2")
            .bind(id)
            .bind(client_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
