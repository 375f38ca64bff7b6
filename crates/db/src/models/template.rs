//! Message template entity and DTOs.

use oneclick_core::template::TemplateStructure;
use oneclick_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::types::Json;
use sqlx::FromRow;

/// A row from the `message_templates` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct MessageTemplate {
    pub id: DbId,
    pub client_id: DbId,
    pub name: String,
    pub category: String,
    pub language: String,
    pub structure: Json<TemplateStructure>,
    /// Personalization keys feeding `{{1}}..{{n}}`, in order.
    pub variables: Json<Vec<String>>,
    pub status: String,
    pub external_template_id: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone)]
pub struct CreateTemplate {
    pub client_id: DbId,
    pub name: String,
    pub category: String,
    pub language: String,
    pub structure: TemplateStructure,
    pub variables: Vec<String>,
    pub status: String,
    pub external_template_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateTemplate {
    pub name: Option<String>,
    pub category: Option<String>,
    pub language: Option<String>,
    pub structure: Option<TemplateStructure>,
    pub variables: Option<Vec<String>>,
    pub status: Option<String>,
    pub external_template_id: Option<String>,
}
