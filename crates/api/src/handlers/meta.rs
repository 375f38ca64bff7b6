//! Handlers for the WhatsApp Cloud API integration.
//!
//! - Credentials: one set per client. The access token is stored encrypted
//!   and is write-only over the API.
//! - Webhook: unauthenticated endpoints the provider calls for the
//!   subscription handshake and for delivery callbacks.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use oneclick_core::error::CoreError;
use oneclick_core::phone::PhoneNumber;
use oneclick_core::types::DbId;
use oneclick_db::models::credentials::{MetaCredentials, UpsertMetaCredentials};
use oneclick_db::models::message::CreateIncomingMessage;
use oneclick_db::repositories::{CredentialsRepo, MessageRepo};
use oneclick_whatsapp::webhook::{
    parse_events, verify_signature, verify_subscription, AccountRef, IncomingMessage,
    WebhookEvent, SIGNATURE_HEADER,
};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::middleware::rbac::RequireAuth;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SaveCredentialsRequest {
    pub access_token: String,
    pub phone_number_id: String,
    pub waba_id: String,
    pub display_phone_number: Option<String>,
}

/// Partial update; an absent `access_token` keeps the stored one.
#[derive(Debug, Deserialize)]
pub struct UpdateCredentialsRequest {
    pub access_token: Option<String>,
    pub phone_number_id: Option<String>,
    pub waba_id: Option<String>,
    pub display_phone_number: Option<String>,
}

/// Stored credentials as returned to the client. Never carries the token.
#[derive(Debug, Serialize)]
pub struct CredentialsView {
    #[serde(flatten)]
    pub credentials: MetaCredentials,
    pub has_access_token: bool,
}

impl From<MetaCredentials> for CredentialsView {
    fn from(credentials: MetaCredentials) -> Self {
        let has_access_token = !credentials.access_token_encrypted.is_empty();
        Self {
            credentials,
            has_access_token,
        }
    }
}

fn required(field: &str, value: &str) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::Core(CoreError::Validation(format!(
            "{field} must not be empty"
        ))));
    }
    Ok(value.to_string())
}

/// Canonical `+digits` form when the value parses as a phone number.
fn normalize_display_number(raw: &str) -> String {
    PhoneNumber::parse(raw)
        .map(PhoneNumber::into_inner)
        .unwrap_or_else(|_| raw.trim().to_string())
}

fn no_credentials(client_id: DbId) -> AppError {
    AppError::Core(CoreError::NotFound {
        entity: "MetaCredentials",
        id: client_id,
    })
}

/// GET /api/v1/meta/credentials
pub async fn get_credentials(
    RequireAuth(caller): RequireAuth,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let creds = CredentialsRepo::find_for_client(&state.pool, caller.client_id)
        .await?
        .ok_or_else(|| no_credentials(caller.client_id))?;

    Ok(Json(DataResponse {
        data: CredentialsView::from(creds),
    }))
}

/// POST /api/v1/meta/credentials
///
/// Store (or replace) the caller's credentials.
pub async fn save_credentials(
    RequireAuth(caller): RequireAuth,
    State(state): State<AppState>,
    Json(input): Json<SaveCredentialsRequest>,
) -> AppResult<impl IntoResponse> {
    let token = required("access_token", &input.access_token)?;
    let upsert = UpsertMetaCredentials {
        access_token_encrypted: state.cipher.encrypt(&token)?,
        phone_number_id: required("phone_number_id", &input.phone_number_id)?,
        waba_id: required("waba_id", &input.waba_id)?,
        display_phone_number: input
            .display_phone_number
            .as_deref()
            .map(normalize_display_number),
    };
    let creds = CredentialsRepo::upsert(&state.pool, caller.client_id, &upsert).await?;

    tracing::info!(
        client_id = caller.client_id,
        phone_number_id = %creds.phone_number_id,
        waba_id = %creds.waba_id,
        "Messaging credentials saved",
    );

    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: CredentialsView::from(creds),
        }),
    ))
}

/// PUT /api/v1/meta/credentials
pub async fn update_credentials(
    RequireAuth(caller): RequireAuth,
    State(state): State<AppState>,
    Json(input): Json<UpdateCredentialsRequest>,
) -> AppResult<impl IntoResponse> {
    let existing = CredentialsRepo::find_for_client(&state.pool, caller.client_id)
        .await?
        .ok_or_else(|| no_credentials(caller.client_id))?;

    let access_token_encrypted = match input.access_token.as_deref() {
        Some(token) => state.cipher.encrypt(&required("access_token", token)?)?,
        None => existing.access_token_encrypted,
    };
    let upsert = UpsertMetaCredentials {
        access_token_encrypted,
        phone_number_id: match input.phone_number_id.as_deref() {
            Some(v) => required("phone_number_id", v)?,
            None => existing.phone_number_id,
        },
        waba_id: match input.waba_id.as_deref() {
            Some(v) => required("waba_id", v)?,
            None => existing.waba_id,
        },
        display_phone_number: input
            .display_phone_number
            .as_deref()
            .map(normalize_display_number)
            .or(existing.display_phone_number),
    };
    let creds = CredentialsRepo::upsert(&state.pool, caller.client_id, &upsert).await?;

    tracing::info!(
        client_id = caller.client_id,
        token_rotated = input.access_token.is_some(),
        "Messaging credentials updated",
    );

    Ok(Json(DataResponse {
        data: CredentialsView::from(creds),
    }))
}

/// DELETE /api/v1/meta/credentials
pub async fn delete_credentials(
    RequireAuth(caller): RequireAuth,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    if !CredentialsRepo::delete(&state.pool, caller.client_id).await? {
        return Err(no_credentials(caller.client_id));
    }

    tracing::info!(client_id = caller.client_id, "Messaging credentials removed");

    Ok(StatusCode::NO_CONTENT.into_response())
}

// ---------------------------------------------------------------------------
// Webhook
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SubscriptionParams {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// GET /api/v1/meta/webhook
///
/// Subscription handshake. Echoes `hub.challenge` as plain text.
pub async fn verify_webhook(
    State(state): State<AppState>,
    Query(params): Query<SubscriptionParams>,
) -> AppResult<impl IntoResponse> {
    let challenge = verify_subscription(
        params.mode.as_deref(),
        params.verify_token.as_deref(),
        params.challenge.as_deref(),
        &state.config.whatsapp.verify_token,
    )
    .map_err(|e| {
        tracing::warn!(error = %e, "Webhook subscription rejected");
        AppError::Core(CoreError::Forbidden(e.to_string()))
    })?;

    tracing::info!("Webhook subscription verified");
    Ok(challenge)
}

/// POST /api/v1/meta/webhook
///
/// Delivery callbacks. Once the signature checks out the answer is always
/// 200, so the provider does not redeliver payloads this service cannot use.
pub async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    if let Some(secret) = state.config.whatsapp.app_secret.as_deref() {
        let header = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
        verify_signature(secret, header, &body).map_err(|e| {
            tracing::warn!(error = %e, "Webhook signature rejected");
            AppError::Core(CoreError::Unauthorized(e.to_string()))
        })?;
    }

    let events = match parse_events(&body) {
        Ok(events) => events,
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring unparseable webhook payload");
            return Ok(StatusCode::OK);
        }
    };

    let mut owners = AccountOwners::default();
    let mut statuses = 0usize;
    let mut incoming = 0usize;
    for event in events {
        let account = match &event {
            WebhookEvent::Status(update) => &update.account,
            WebhookEvent::Incoming(msg) => &msg.account,
        };
        let Some(client_id) = owners.resolve(&state, account).await else {
            tracing::warn!(
                waba_id = %account.business_account_id,
                phone_number_id = %account.phone_number_id,
                "Webhook event for unknown account dropped",
            );
            continue;
        };

        match event {
            WebhookEvent::Status(update) => {
                if state.engine.status_updates().submit(client_id, update).await {
                    statuses += 1;
                } else {
                    tracing::warn!(client_id, "Status updater stopped; update dropped");
                }
            }
            WebhookEvent::Incoming(msg) => {
                if record_incoming(&state, client_id, msg).await {
                    incoming += 1;
                }
            }
        }
    }

    tracing::debug!(statuses, incoming, "Webhook processed");
    Ok(StatusCode::OK)
}

async fn record_incoming(state: &AppState, client_id: DbId, msg: IncomingMessage) -> bool {
    let to_phone = msg
        .account
        .display_phone_number
        .as_deref()
        .map(normalize_display_number)
        .unwrap_or_else(|| msg.account.phone_number_id.clone());
    let input = CreateIncomingMessage {
        client_id,
        external_id: msg.external_id,
        from_phone: msg.from,
        to_phone,
        content: msg.content,
        occurred_at: msg.timestamp,
    };

    match MessageRepo::insert_incoming(&state.pool, &input).await {
        Ok(Some(stored)) => {
            tracing::info!(
                message_id = stored.id,
                client_id,
                from = %stored.from_phone,
                "Incoming message recorded",
            );
            true
        }
        Ok(None) => {
            tracing::debug!(external_id = %input.external_id, "Duplicate incoming message ignored");
            false
        }
        Err(e) => {
            tracing::error!(client_id, error = %e, "Failed to record incoming message");
            false
        }
    }
}

/// Per-request cache of account -> client lookups.
#[derive(Default)]
struct AccountOwners {
    by_account: HashMap<(String, String), Option<DbId>>,
}

impl AccountOwners {
    /// The business-account id decides; the phone-number id is the fallback.
    async fn resolve(&mut self, state: &AppState, account: &AccountRef) -> Option<DbId> {
        let key = (
            account.business_account_id.clone(),
            account.phone_number_id.clone(),
        );
        if let Some(cached) = self.by_account.get(&key) {
            return *cached;
        }

        let owner = match lookup_owner(state, account).await {
            Ok(owner) => owner,
            Err(e) => {
                tracing::error!(error = %e, "Failed to resolve webhook account");
                None
            }
        };
        self.by_account.insert(key, owner);
        owner
    }
}

async fn lookup_owner(state: &AppState, account: &AccountRef) -> Result<Option<DbId>, sqlx::Error> {
    if !account.business_account_id.is_empty() {
        if let Some(creds) =
            CredentialsRepo::find_by_waba_id(&state.pool, &account.business_account_id).await?
        {
            return Ok(Some(creds.client_id));
        }
    }
    if account.phone_number_id.is_empty() {
        return Ok(None);
    }
    let creds = CredentialsRepo::find_by_phone_number_id(&state.pool, &account.phone_number_id).await?;
    Ok(creds.map(|c| c.client_id))
}
