//! Handlers for the message inbox and single-message sends.

use std::future::Future;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use oneclick_core::campaign::REASON_MISSING_CREDENTIALS;
use oneclick_core::delivery::Direction;
use oneclick_core::error::CoreError;
use oneclick_core::inbox::{aggregate, Conversation, InboxMessage};
use oneclick_core::pagination::{PageMeta, PageRequest};
use oneclick_core::phone::PhoneNumber;
use oneclick_core::template::{is_approved, render};
use oneclick_core::types::{DbId, Money};
use oneclick_core::wallet::INSUFFICIENT_BALANCE_REASON;
use oneclick_db::models::message::CreateOutgoingMessage;
use oneclick_db::models::wallet::DebitOutcome;
use oneclick_db::repositories::{
    CredentialsRepo, MessageRepo, PricingRepo, TemplateRepo, WalletRepo,
};
use oneclick_db::DbPool;
use oneclick_whatsapp::{
    send_text_with_retry, send_with_retry, SendOutcome, SenderCredentials, TemplateMessage,
    TextMessage,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::middleware::rbac::RequireAuth;
use crate::response::DataResponse;
use crate::state::AppState;

/// Longest body the Cloud API accepts for a text message.
const MAX_TEXT_LENGTH: usize = 4096;

#[derive(Debug, Deserialize)]
pub struct InboxParams {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    /// `incoming` or `outgoing`; both when absent.
    pub direction: Option<String>,
}

impl InboxParams {
    fn direction(&self) -> AppResult<Option<Direction>> {
        match self.direction.as_deref() {
            None | Some("") => Ok(None),
            Some(raw) => Direction::parse(raw).map(Some).ok_or_else(|| {
                AppError::BadRequest(format!(
                    "Invalid direction '{raw}'. Must be 'incoming' or 'outgoing'"
                ))
            }),
        }
    }
}

/// Inbox page. The paging fields sit next to `messages` at the top level.
#[derive(Debug, Serialize)]
pub struct InboxPage {
    pub messages: Vec<InboxMessage>,
    #[serde(flatten)]
    pub meta: PageMeta,
}

#[derive(Debug, Serialize)]
pub struct ConversationPage {
    pub conversations: Vec<Conversation>,
    #[serde(flatten)]
    pub meta: PageMeta,
}

async fn load_page(
    pool: &DbPool,
    client_id: DbId,
    params: &InboxParams,
) -> AppResult<(Vec<InboxMessage>, PageMeta)> {
    let direction = params.direction()?;
    let request = PageRequest::new(params.page, params.per_page);

    let rows = MessageRepo::list_inbox(
        pool,
        client_id,
        direction,
        request.per_page,
        request.offset(),
    )
    .await?;
    let total = MessageRepo::count_inbox(pool, client_id, direction).await?;

    let messages = rows
        .iter()
        .filter_map(|m| {
            let msg = m.to_inbox();
            if msg.is_none() {
                tracing::warn!(message_id = m.id, "Skipping message with unknown status or direction");
            }
            msg
        })
        .collect();

    Ok((messages, PageMeta::new(request, total)))
}

/// GET /api/v1/messages/inbox
///
/// One page of the caller's messages, newest first.
pub async fn inbox(
    RequireAuth(caller): RequireAuth,
    State(state): State<AppState>,
    Query(params): Query<InboxParams>,
) -> AppResult<impl IntoResponse> {
    let (messages, meta) = load_page(&state.pool, caller.client_id, &params).await?;
    Ok(Json(InboxPage { messages, meta }))
}

/// GET /api/v1/messages/conversations
///
/// The same page as the inbox, grouped by counterpart number.
pub async fn conversations(
    RequireAuth(caller): RequireAuth,
    State(state): State<AppState>,
    Query(params): Query<InboxParams>,
) -> AppResult<impl IntoResponse> {
    let (messages, meta) = load_page(&state.pool, caller.client_id, &params).await?;
    Ok(Json(ConversationPage {
        conversations: aggregate(messages),
        meta,
    }))
}

// ---------------------------------------------------------------------------
// Single-message sends
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SendTemplateRequest {
    pub recipient_phone_number: String,
    pub template_name: String,
    #[serde(default = "default_language")]
    pub language_code: String,
    /// Positional values for `{{1}}..{{n}}`, one per template variable.
    #[serde(default)]
    pub body_parameters: Vec<String>,
}

fn default_language() -> String {
    "en_US".to_string()
}

#[derive(Debug, Deserialize)]
pub struct SendTextRequest {
    pub recipient_phone_number: String,
    pub message_text: String,
    #[serde(default)]
    pub preview_url: bool,
}

#[derive(Debug, Serialize)]
pub struct SentMessage {
    pub message: InboxMessage,
    pub cost: Money,
    pub attempts: u32,
}

/// The client's sending identity and rate for one direct send.
struct Sender {
    credentials: SenderCredentials,
    from_phone: String,
    price: Money,
}

async fn resolve_sender(state: &AppState, client_id: DbId) -> AppResult<Sender> {
    let creds = CredentialsRepo::find_for_client(&state.pool, client_id)
        .await?
        .ok_or_else(|| CoreError::Validation(format!("Cannot send: {REASON_MISSING_CREDENTIALS}")))?;
    let access_token = state
        .cipher
        .decrypt(&creds.access_token_encrypted)
        .map_err(|e| AppError::InternalError(format!("stored access token is unreadable: {e}")))?;
    let price = PricingRepo::resolve(&state.pool, client_id, &state.config.pricing).await?;

    let from_phone = creds
        .display_phone_number
        .clone()
        .unwrap_or_else(|| creds.phone_number_id.clone());
    Ok(Sender {
        credentials: SenderCredentials {
            access_token,
            phone_number_id: creds.phone_number_id,
        },
        from_phone,
        price: price.price_per_message,
    })
}

/// Record, fund, send and settle one outgoing message that belongs to no campaign.
///
/// Funding follows the campaign rules: an insufficient balance fails the
/// message without sending (402), and a rejected send is refunded (502).
async fn send_direct<F, Fut>(
    state: &AppState,
    client_id: DbId,
    sender: &Sender,
    to: &PhoneNumber,
    content: String,
    send: F,
) -> AppResult<SentMessage>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = SendOutcome>,
{
    let input = CreateOutgoingMessage {
        client_id,
        campaign_id: None,
        from_phone: sender.from_phone.clone(),
        to_phone: to.as_str().to_string(),
        content,
    };
    let message = MessageRepo::create_outgoing(&state.pool, &input)
        .await?
        .ok_or_else(|| AppError::InternalError("outgoing message was not recorded".into()))?;

    if sender.price > Decimal::ZERO {
        let funding = WalletRepo::debit(
            &state.pool,
            client_id,
            sender.price,
            Some(message.id),
            Some("Direct message"),
        )
        .await?;
        if let DebitOutcome::InsufficientFunds { balance } = funding {
            MessageRepo::mark_failed(&state.pool, message.id, INSUFFICIENT_BALANCE_REASON, 0)
                .await?;
            return Err(CoreError::InsufficientFunds {
                balance,
                required: sender.price,
            }
            .into());
        }
    }

    let outcome = send().await;
    let attempts = i32::try_from(outcome.attempts).unwrap_or(i32::MAX);

    match outcome.result {
        Ok(receipt) => {
            let sent = MessageRepo::mark_sent(&state.pool, message.id, &receipt.external_id, attempts)
                .await?
                .ok_or_else(|| {
                    AppError::InternalError(format!("message {} left its queued state", message.id))
                })?;
            tracing::info!(
                client_id,
                message_id = sent.id,
                external_id = %receipt.external_id,
                cost = %sender.price,
                "Direct message sent",
            );
            let view = sent.to_inbox().ok_or_else(|| {
                AppError::InternalError(format!("message {} has an unknown status", sent.id))
            })?;
            Ok(SentMessage {
                message: view,
                cost: sender.price,
                attempts: outcome.attempts,
            })
        }
        Err(err) => {
            tracing::warn!(
                client_id,
                message_id = message.id,
                attempts = outcome.attempts,
                error = %err,
                "Direct message rejected",
            );
            if sender.price > Decimal::ZERO {
                WalletRepo::refund(
                    &state.pool,
                    client_id,
                    message.id,
                    sender.price,
                    Some("Refund for undelivered message"),
                )
                .await?;
            }
            MessageRepo::mark_failed(&state.pool, message.id, err.reason(), attempts).await?;
            Err(AppError::DeliveryFailed {
                message_id: message.id,
                reason: err.reason().to_string(),
            })
        }
    }
}

/// POST /api/v1/messages/send-template
///
/// Send one approved template to one recipient, charged at the caller's rate.
pub async fn send_template(
    RequireAuth(caller): RequireAuth,
    State(state): State<AppState>,
    Json(input): Json<SendTemplateRequest>,
) -> AppResult<impl IntoResponse> {
    let to = PhoneNumber::parse(&input.recipient_phone_number)?;
    let template = TemplateRepo::find_by_name(
        &state.pool,
        caller.client_id,
        &input.template_name,
        &input.language_code,
    )
    .await?
    .ok_or_else(|| {
        CoreError::Validation(format!(
            "Unknown template '{}' ({})",
            input.template_name, input.language_code
        ))
    })?;
    if !is_approved(&template.status) {
        return Err(CoreError::Validation(format!(
            "Template '{}' is not approved (status {})",
            template.name, template.status
        ))
        .into());
    }
    let expected = template.variables.0.len();
    if input.body_parameters.len() != expected {
        return Err(CoreError::Validation(format!(
            "Template '{}' takes {expected} body parameters, got {}",
            template.name,
            input.body_parameters.len()
        ))
        .into());
    }

    let sender = resolve_sender(&state, caller.client_id).await?;
    let content = render(&template.structure.0.body, &input.body_parameters);
    let message = TemplateMessage {
        to: to.as_wa_id().to_string(),
        template_name: template.name.clone(),
        language: template.language.clone(),
        body_parameters: input.body_parameters,
    };
    let retry = state.config.dispatch.retry_policy();

    let sent = send_direct(&state, caller.client_id, &sender, &to, content, || {
        send_with_retry(
            state.messaging.as_ref(),
            &state.limiter,
            &sender.credentials,
            &message,
            retry,
        )
    })
    .await?;

    Ok((StatusCode::CREATED, Json(DataResponse { data: sent })))
}

/// POST /api/v1/messages/send-text
///
/// Send a free-form text. WhatsApp only delivers these inside the 24-hour
/// window opened by the recipient's last message; outside it the send is
/// rejected and refunded.
pub async fn send_text(
    RequireAuth(caller): RequireAuth,
    State(state): State<AppState>,
    Json(input): Json<SendTextRequest>,
) -> AppResult<impl IntoResponse> {
    let to = PhoneNumber::parse(&input.recipient_phone_number)?;
    if input.message_text.trim().is_empty() {
        return Err(CoreError::Validation("message_text must not be empty".into()).into());
    }
    if input.message_text.chars().count() > MAX_TEXT_LENGTH {
        return Err(CoreError::Validation(format!(
            "message_text must be at most {MAX_TEXT_LENGTH} characters"
        ))
        .into());
    }

    let sender = resolve_sender(&state, caller.client_id).await?;
    let message = TextMessage {
        to: to.as_wa_id().to_string(),
        body: input.message_text.clone(),
        preview_url: input.preview_url,
    };
    let retry = state.config.dispatch.retry_policy();

    let sent = send_direct(&state, caller.client_id, &sender, &to, input.message_text, || {
        send_text_with_retry(
            state.messaging.as_ref(),
            &state.limiter,
            &sender.credentials,
            &message,
            retry,
        )
    })
    .await?;

    Ok((StatusCode::CREATED, Json(DataResponse { data: sent })))
}
