//! Handlers for the per-client message template registry.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use oneclick_core::error::CoreError;
use oneclick_core::template::{
    normalize_category, validate_language, validate_structure, validate_template_name,
    TemplateStructure, DEFAULT_TEMPLATE_STATUS,
};
use oneclick_core::types::DbId;
use oneclick_db::models::template::{CreateTemplate, MessageTemplate, UpdateTemplate};
use oneclick_db::repositories::TemplateRepo;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::middleware::rbac::RequireAuth;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateTemplateRequest {
    pub name: String,
    pub category: String,
    pub language: String,
    pub structure: TemplateStructure,
    #[serde(default)]
    pub variables: Vec<String>,
    /// Approval status as reported by the provider. Defaults to `PENDING`.
    pub status: Option<String>,
    pub external_template_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTemplateRequest {
    pub name: Option<String>,
    pub category: Option<String>,
    pub language: Option<String>,
    pub structure: Option<TemplateStructure>,
    pub variables: Option<Vec<String>>,
    pub status: Option<String>,
    pub external_template_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TemplateListParams {
    pub status: Option<String>,
}

fn not_found(id: DbId) -> AppError {
    AppError::Core(CoreError::NotFound {
        entity: "MessageTemplate",
        id,
    })
}

fn normalize_status(status: &str) -> AppResult<String> {
    let status = status.trim();
    if status.is_empty() {
        return Err(AppError::BadRequest("Template status must not be empty".into()));
    }
    Ok(status.to_ascii_uppercase())
}

/// GET /api/v1/templates
///
/// The caller's templates ordered by name. `?status=APPROVED` narrows the
/// list to those usable in a campaign.
pub async fn list_templates(
    RequireAuth(caller): RequireAuth,
    State(state): State<AppState>,
    Query(params): Query<TemplateListParams>,
) -> AppResult<impl IntoResponse> {
    let templates =
        TemplateRepo::list_for_client(&state.pool, caller.client_id, params.status.as_deref()).await?;
    Ok(Json(DataResponse { data: templates }))
}

/// POST /api/v1/templates
pub async fn create_template(
    RequireAuth(caller): RequireAuth,
    State(state): State<AppState>,
    Json(input): Json<CreateTemplateRequest>,
) -> AppResult<impl IntoResponse> {
    validate_template_name(&input.name)?;
    let category = normalize_category(&input.category)?;
    validate_language(&input.language)?;
    validate_structure(&input.structure, &input.variables)?;
    let status = match input.status.as_deref() {
        Some(s) => normalize_status(s)?,
        None => DEFAULT_TEMPLATE_STATUS.to_string(),
    };

    let create = CreateTemplate {
        client_id: caller.client_id,
        name: input.name.trim().to_string(),
        category,
        language: input.language,
        structure: input.structure,
        variables: input.variables,
        status,
        external_template_id: input.external_template_id,
    };
    let template = TemplateRepo::create(&state.pool, &create).await?;

    tracing::info!(
        template_id = template.id,
        client_id = caller.client_id,
        name = %template.name,
        status = %template.status,
        "Template created",
    );

    Ok((StatusCode::CREATED, Json(DataResponse { data: template })))
}

/// GET /api/v1/templates/{id}
pub async fn get_template(
    RequireAuth(caller): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let template = TemplateRepo::find_for_client(&state.pool, caller.client_id, id)
        .await?
        .ok_or_else(|| not_found(id))?;
    Ok(Json(DataResponse { data: template }))
}

/// PUT /api/v1/templates/{id}
///
/// The structure is re-validated against the variables that will be stored,
/// so changing either one alone cannot leave a dangling placeholder.
pub async fn update_template(
    RequireAuth(caller): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<UpdateTemplateRequest>,
) -> AppResult<impl IntoResponse> {
    let existing: MessageTemplate = TemplateRepo::find_for_client(&state.pool, caller.client_id, id)
        .await?
        .ok_or_else(|| not_found(id))?;

    if let Some(name) = &input.name {
        validate_template_name(name)?;
    }
    let category = input.category.as_deref().map(normalize_category).transpose()?;
    if let Some(language) = &input.language {
        validate_language(language)?;
    }
    if input.structure.is_some() || input.variables.is_some() {
        let structure = input.structure.as_ref().unwrap_or(&existing.structure.0);
        let variables = input.variables.as_deref().unwrap_or(&existing.variables.0);
        validate_structure(structure, variables)?;
    }
    let status = input.status.as_deref().map(normalize_status).transpose()?;

    let patch = UpdateTemplate {
        name: input.name.map(|n| n.trim().to_string()),
        category,
        language: input.language,
        structure: input.structure,
        variables: input.variables,
        status,
        external_template_id: input.external_template_id,
    };
    let template = TemplateRepo::update(&state.pool, caller.client_id, id, &patch)
        .await?
        .ok_or_else(|| not_found(id))?;

    tracing::info!(template_id = id, client_id = caller.client_id, "Template updated");

    Ok(Json(DataResponse { data: template }))
}

/// DELETE /api/v1/templates/{id}
///
/// 409 while any campaign still references the template.
pub async fn delete_template(
    RequireAuth(caller): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    if !TemplateRepo::delete(&state.pool, caller.client_id, id).await? {
        return Err(not_found(id));
    }

    tracing::info!(template_id = id, client_id = caller.client_id, "Template deleted");

    Ok(StatusCode::NO_CONTENT.into_response())
}
