//! Handlers for bulk-messaging campaigns.
//!
//! Every query is scoped to the caller's client id. Status changes go
//! through the conditional repository updates so a concurrent scheduler
//! claim or cancel can never be overwritten.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use oneclick_core::audience::{audience_to_json, parse_audience, parse_personalization, personalization_to_json};
use oneclick_core::campaign::{
    initial_status, status_after_update, validate_campaign_name, validate_deletable,
    validate_sendable, validate_transition, CampaignStatus,
};
use oneclick_core::error::CoreError;
use oneclick_core::pagination::{clamp_limit, clamp_offset};
use oneclick_core::template::ensure_approved;
use oneclick_core::types::{DbId, Timestamp};
use oneclick_db::models::campaign::{Campaign, CreateCampaign, UpdateCampaign};
use oneclick_db::repositories::{CampaignRepo, TemplateRepo};
use oneclick_db::DbPool;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{AppError, AppResult};
use crate::middleware::rbac::RequireAuth;
use crate::response::DataResponse;
use crate::state::AppState;

const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 200;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateCampaignRequest {
    pub campaign_name: String,
    pub template_id: DbId,
    /// Array of phone numbers, or that array JSON-encoded as a string.
    pub audience_json: serde_json::Value,
    #[serde(default)]
    pub personalization_data_json: serde_json::Value,
    pub scheduled_at: Option<Timestamp>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCampaignRequest {
    pub campaign_name: Option<String>,
    pub template_id: Option<DbId>,
    pub audience_json: Option<serde_json::Value>,
    pub personalization_data_json: Option<serde_json::Value>,
    /// Absent leaves the schedule alone; `null` clears it.
    #[serde(default, deserialize_with = "present")]
    pub scheduled_at: Option<Option<Timestamp>>,
    pub status: Option<String>,
}

/// Distinguish an explicit `null` from an absent field.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize)]
pub struct CampaignListParams {
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// A campaign row with its status spelled out.
#[derive(Debug, Serialize)]
pub struct CampaignResponse {
    #[serde(flatten)]
    pub campaign: Campaign,
    pub status: Option<CampaignStatus>,
}

impl From<Campaign> for CampaignResponse {
    fn from(campaign: Campaign) -> Self {
        let status = campaign.status();
        Self { campaign, status }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn load_campaign(pool: &DbPool, client_id: DbId, id: DbId) -> AppResult<Campaign> {
    CampaignRepo::find_for_client(pool, client_id, id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Campaign",
            id,
        }))
}

fn status_of(campaign: &Campaign) -> AppResult<CampaignStatus> {
    campaign.status().ok_or_else(|| {
        AppError::InternalError(format!(
            "Campaign {} has unknown status id {}",
            campaign.id, campaign.status_id
        ))
    })
}

/// The template must belong to the caller and be approved.
async fn ensure_usable_template(pool: &DbPool, client_id: DbId, template_id: DbId) -> AppResult<()> {
    let template = TemplateRepo::find_for_client(pool, client_id, template_id)
        .await?
        .ok_or_else(|| {
            AppError::Core(CoreError::Validation(format!(
                "template_id {template_id} does not reference one of your templates"
            )))
        })?;
    ensure_approved(&template.name, &template.status)?;
    Ok(())
}

fn recipient_count(len: usize) -> AppResult<i32> {
    i32::try_from(len)
        .map_err(|_| AppError::BadRequest("audience_json has too many recipients".into()))
}

fn status_changed(id: DbId) -> AppError {
    AppError::Core(CoreError::Conflict(format!(
        "Campaign {id} changed status concurrently; reload and retry"
    )))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/v1/campaigns
///
/// The caller's campaigns, newest first. Optional `?status=` filter.
pub async fn list_campaigns(
    RequireAuth(caller): RequireAuth,
    State(state): State<AppState>,
    Query(params): Query<CampaignListParams>,
) -> AppResult<impl IntoResponse> {
    let status = params
        .status
        .as_deref()
        .map(str::parse::<CampaignStatus>)
        .transpose()?;
    let limit = clamp_limit(params.limit, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT);
    let offset = clamp_offset(params.offset);

    let campaigns = CampaignRepo::list_for_client(&state.pool, caller.client_id, status, limit, offset)
        .await?
        .into_iter()
        .map(CampaignResponse::from)
        .collect::<Vec<_>>();

    Ok(Json(DataResponse { data: campaigns }))
}

/// POST /api/v1/campaigns
///
/// Create a campaign in DRAFT, or SCHEDULED when `scheduled_at` is in the future.
pub async fn create_campaign(
    RequireAuth(caller): RequireAuth,
    State(state): State<AppState>,
    Json(input): Json<CreateCampaignRequest>,
) -> AppResult<impl IntoResponse> {
    validate_campaign_name(&input.campaign_name)?;
    ensure_usable_template(&state.pool, caller.client_id, input.template_id).await?;
    let audience = parse_audience(&input.audience_json)?;
    let personalization = parse_personalization(&input.personalization_data_json)?;

    let create = CreateCampaign {
        client_id: caller.client_id,
        name: input.campaign_name.trim().to_string(),
        template_id: input.template_id,
        total_recipients: recipient_count(audience.len())?,
        audience: audience_to_json(&audience),
        personalization: personalization_to_json(&personalization),
        status: initial_status(input.scheduled_at, Utc::now()),
        scheduled_at: input.scheduled_at,
    };
    let campaign = CampaignRepo::create(&state.pool, &create).await?;

    tracing::info!(
        campaign_id = campaign.id,
        client_id = caller.client_id,
        recipients = campaign.total_recipients,
        status = %create.status,
        "Campaign created",
    );

    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: CampaignResponse::from(campaign),
        }),
    ))
}

/// GET /api/v1/campaigns/{id}
pub async fn get_campaign(
    RequireAuth(caller): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let campaign = load_campaign(&state.pool, caller.client_id, id).await?;
    Ok(Json(DataResponse {
        data: CampaignResponse::from(campaign),
    }))
}

/// PUT /api/v1/campaigns/{id}
///
/// Only DRAFT and SCHEDULED campaigns can be edited. A supplied `status` must
/// be a legal transition; otherwise touching `scheduled_at` re-derives it.
pub async fn update_campaign(
    RequireAuth(caller): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<UpdateCampaignRequest>,
) -> AppResult<impl IntoResponse> {
    let campaign = load_campaign(&state.pool, caller.client_id, id).await?;
    let current = status_of(&campaign)?;
    let requested = input
        .status
        .as_deref()
        .map(str::parse::<CampaignStatus>)
        .transpose()?;

    let effective_schedule = match input.scheduled_at {
        Some(value) => value,
        None => campaign.scheduled_at,
    };
    let target = status_after_update(
        current,
        requested,
        effective_schedule,
        input.scheduled_at.is_some(),
        Utc::now(),
    )?;

    if let Some(name) = &input.campaign_name {
        validate_campaign_name(name)?;
    }
    if let Some(template_id) = input.template_id {
        ensure_usable_template(&state.pool, caller.client_id, template_id).await?;
    }
    let audience = input
        .audience_json
        .as_ref()
        .map(parse_audience)
        .transpose()?;
    let personalization = input
        .personalization_data_json
        .as_ref()
        .map(parse_personalization)
        .transpose()?;

    let patch = UpdateCampaign {
        name: input.campaign_name.map(|n| n.trim().to_string()),
        template_id: input.template_id,
        total_recipients: audience
            .as_ref()
            .map(|a| recipient_count(a.len()))
            .transpose()?,
        audience: audience.as_deref().map(audience_to_json),
        personalization: personalization.as_ref().map(personalization_to_json),
        scheduled_at: input.scheduled_at,
        status: (target != current).then_some(target),
    };

    let updated = CampaignRepo::update(&state.pool, caller.client_id, id, current, &patch)
        .await?
        .ok_or_else(|| status_changed(id))?;

    tracing::info!(
        campaign_id = id,
        client_id = caller.client_id,
        from = %current,
        to = %target,
        "Campaign updated",
    );

    Ok(Json(DataResponse {
        data: CampaignResponse::from(updated),
    }))
}

/// DELETE /api/v1/campaigns/{id}
///
/// Refused while the campaign is PENDING_SEND or SENDING.
pub async fn delete_campaign(
    RequireAuth(caller): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let campaign = load_campaign(&state.pool, caller.client_id, id).await?;
    validate_deletable(status_of(&campaign)?)?;

    let deletable: Vec<CampaignStatus> = CampaignStatus::ALL
        .iter()
        .copied()
        .filter(|s| s.is_deletable())
        .collect();
    if !CampaignRepo::delete(&state.pool, caller.client_id, id, &deletable).await? {
        return Err(status_changed(id));
    }

    tracing::info!(campaign_id = id, client_id = caller.client_id, "Campaign deleted");

    Ok(StatusCode::NO_CONTENT.into_response())
}

/// POST /api/v1/campaigns/{id}/send
///
/// Queue the campaign for immediate dispatch and wake the scheduler.
/// Repeating the request while it is still PENDING_SEND is a no-op.
pub async fn send_campaign(
    RequireAuth(caller): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let campaign = load_campaign(&state.pool, caller.client_id, id).await?;
    let status = status_of(&campaign)?;
    let audience = parse_audience(&campaign.audience)?;
    validate_sendable(status, audience.len())?;

    let campaign = if status == CampaignStatus::PendingSend {
        campaign
    } else {
        CampaignRepo::transition(&state.pool, id, CampaignStatus::PendingSend)
            .await?
            .ok_or_else(|| status_changed(id))?
    };
    state.engine.wake_scheduler();

    tracing::info!(
        campaign_id = id,
        client_id = caller.client_id,
        recipients = audience.len(),
        "Campaign queued for sending",
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: CampaignResponse::from(campaign),
        }),
    ))
}

/// POST /api/v1/campaigns/{id}/cancel
///
/// Cancel a campaign. A running dispatch stops submitting further recipients;
/// sends already handed to the API finish.
pub async fn cancel_campaign(
    RequireAuth(caller): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let campaign = load_campaign(&state.pool, caller.client_id, id).await?;
    let status = status_of(&campaign)?;
    validate_transition(status, CampaignStatus::Cancelled)?;

    let cancelled = CampaignRepo::transition(&state.pool, id, CampaignStatus::Cancelled)
        .await?
        .ok_or_else(|| status_changed(id))?;
    let interrupted = state.engine.cancel_campaign(id);

    tracing::info!(
        campaign_id = id,
        client_id = caller.client_id,
        from = %status,
        interrupted,
        "Campaign cancelled",
    );

    Ok(Json(DataResponse {
        data: CampaignResponse::from(cancelled),
    }))
}
