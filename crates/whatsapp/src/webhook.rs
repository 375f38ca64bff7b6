//! Inbound webhook handling for the Cloud API.
//!
//! - Subscription handshake (`hub.mode` / `hub.verify_token` / `hub.challenge`).
//! - `X-Hub-Signature-256` verification (HMAC-SHA256 of the raw body).
//! - Payload parsing into [`WebhookEvent`]s: delivery status updates and
//!   incoming messages, tagged with the business account they belong to.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use oneclick_core::delivery::MessageStatus;
use oneclick_core::phone::PhoneNumber;
use oneclick_core::types::Timestamp;
use serde::Deserialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Name of the signature header.
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// `object` value of WhatsApp webhook payloads.
const WHATSAPP_OBJECT: &str = "whatsapp_business_account";

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Missing webhook signature")]
    MissingSignature,

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Webhook verification failed")]
    VerificationFailed,

    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Answer the subscription handshake. Returns the challenge to echo back.
pub fn verify_subscription(
    mode: Option<&str>,
    token: Option<&str>,
    challenge: Option<&str>,
    expected_token: &str,
) -> Result<String, WebhookError> {
    match (mode, token, challenge) {
        (Some("subscribe"), Some(token), Some(challenge))
            if !expected_token.is_empty() && token == expected_token =>
        {
            Ok(challenge.to_string())
        }
        _ => Err(WebhookError::VerificationFailed),
    }
}

/// Check `sha256=<hex>` against HMAC-SHA256(app_secret, body) in constant time.
pub fn verify_signature(
    app_secret: &str,
    header: Option<&str>,
    body: &[u8],
) -> Result<(), WebhookError> {
    let header = header.ok_or(WebhookError::MissingSignature)?;
    let hex_digest = header
        .trim()
        .strip_prefix("sha256=")
        .ok_or(WebhookError::InvalidSignature)?;
    let provided = hex::decode(hex_digest).map_err(|_| WebhookError::InvalidSignature)?;

    let mut mac = HmacSha256::new_from_slice(app_secret.as_bytes())
        .map_err(|_| WebhookError::InvalidSignature)?;
    mac.update(body);
    mac.verify_slice(&provided)
        .map_err(|_| WebhookError::InvalidSignature)
}

/// Compute the header value for `body`. Used by tests and local tooling.
pub fn sign(app_secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(app_secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Payload {
    #[serde(default)]
    object: String,
    #[serde(default)]
    entry: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    /// WhatsApp Business Account id.
    #[serde(default)]
    id: String,
    #[serde(default)]
    changes: Vec<Change>,
}

#[derive(Debug, Deserialize)]
struct Change {
    #[serde(default)]
    field: String,
    #[serde(default)]
    value: ChangeValue,
}

#[derive(Debug, Default, Deserialize)]
struct ChangeValue {
    #[serde(default)]
    metadata: Metadata,
    #[serde(default)]
    messages: Vec<serde_json::Value>,
    #[serde(default)]
    statuses: Vec<StatusEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct Metadata {
    #[serde(default)]
    display_phone_number: Option<String>,
    #[serde(default)]
    phone_number_id: String,
}

#[derive(Debug, Deserialize)]
struct StatusEntry {
    id: String,
    status: String,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    recipient_id: Option<String>,
    #[serde(default)]
    errors: Vec<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Identifies the account a webhook change belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRef {
    pub business_account_id: String,
    pub phone_number_id: String,
    pub display_phone_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub account: AccountRef,
    pub external_id: String,
    pub status: MessageStatus,
    pub timestamp: Timestamp,
    pub recipient: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub account: AccountRef,
    pub external_id: String,
    /// Sender in canonical `+digits` form.
    pub from: String,
    pub content: String,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    Status(StatusUpdate),
    Incoming(IncomingMessage),
}

/// Parse a webhook POST body into events, in payload order.
///
/// Changes for fields other than `messages`, unknown status strings and
/// messages without an id are skipped.
pub fn parse_events(body: &[u8]) -> Result<Vec<WebhookEvent>, WebhookError> {
    let payload: Payload =
        serde_json::from_slice(body).map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;
    if payload.object != WHATSAPP_OBJECT {
        return Err(WebhookError::InvalidPayload(format!(
            "unexpected object '{}'",
            payload.object
        )));
    }

    let mut events = Vec::new();
    for entry in payload.entry {
        for change in entry.changes {
            if change.field != "messages" {
                tracing::debug!(field = %change.field, "Ignoring webhook change");
                continue;
            }
            let value = change.value;
            let account = AccountRef {
                business_account_id: entry.id.clone(),
                phone_number_id: value.metadata.phone_number_id.clone(),
                display_phone_number: value.metadata.display_phone_number.clone(),
            };

            for status in value.statuses {
                let Some(next) = MessageStatus::from_callback(&status.status) else {
                    tracing::debug!(status = %status.status, "Ignoring unknown delivery status");
                    continue;
                };
                events.push(WebhookEvent::Status(StatusUpdate {
                    account: account.clone(),
                    external_id: status.id,
                    status: next,
                    timestamp: parse_timestamp(status.timestamp.as_deref()),
                    recipient: status.recipient_id,
                    error: first_error(&status.errors),
                }));
            }

            for message in value.messages {
                if let Some(incoming) = parse_incoming(&account, &message) {
                    events.push(WebhookEvent::Incoming(incoming));
                }
            }
        }
    }
    Ok(events)
}

fn parse_incoming(account: &AccountRef, msg: &serde_json::Value) -> Option<IncomingMessage> {
    let external_id = msg["id"].as_str()?.to_string();
    let raw_from = msg["from"].as_str()?;
    let from = PhoneNumber::parse(raw_from)
        .map(PhoneNumber::into_inner)
        .unwrap_or_else(|_| format!("+{raw_from}"));

    Some(IncomingMessage {
        account: account.clone(),
        external_id,
        from,
        content: message_content(msg),
        timestamp: parse_timestamp(msg["timestamp"].as_str()),
    })
}

/// Human-readable content of an incoming message.
fn message_content(msg: &serde_json::Value) -> String {
    let kind = msg["type"].as_str().unwrap_or("unknown");
    let text = match kind {
        "text" => msg["text"]["body"].as_str(),
        "button" => msg["button"]["text"].as_str(),
        "interactive" => msg["interactive"]["button_reply"]["title"]
            .as_str()
            .or_else(|| msg["interactive"]["list_reply"]["title"].as_str()),
        "reaction" => msg["reaction"]["emoji"].as_str(),
        _ => msg[kind]["caption"].as_str(),
    };
    match text {
        Some(t) => t.to_string(),
        None => format!("[{kind}]"),
    }
}

/// Unix-seconds string to a timestamp; now when absent or malformed.
fn parse_timestamp(raw: Option<&str>) -> Timestamp {
    raw.and_then(|s| s.parse::<i64>().ok())
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .unwrap_or_else(Utc::now)
}

fn first_error(errors: &[serde_json::Value]) -> Option<String> {
    let err = errors.first()?;
    let title = err["title"].as_str().or_else(|| err["message"].as_str());
    match (err["code"].as_i64(), title) {
        (Some(code), Some(title)) => Some(format!("{code}: {title}")),
        (None, Some(title)) => Some(title.to_string()),
        (Some(code), None) => Some(format!("error {code}")),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn wrap(value: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "id": "WABA-1",
                "changes": [{ "field": "messages", "value": value }]
            }]
        }))
        .unwrap()
    }

    #[test]
    fn subscription_handshake() {
        assert_eq!(
            verify_subscription(Some("subscribe"), Some("tok"), Some("42"), "tok").unwrap(),
            "42"
        );
        assert!(verify_subscription(Some("subscribe"), Some("bad"), Some("42"), "tok").is_err());
        assert!(verify_subscription(Some("unsubscribe"), Some("tok"), Some("42"), "tok").is_err());
        assert!(verify_subscription(Some("subscribe"), Some(""), Some("42"), "").is_err());
    }

    #[test]
    fn signature_round_trip_and_tamper() {
        let body = br#"{"object":"whatsapp_business_account"}"#;
        let header = sign("app-secret", body);
        assert!(verify_signature("app-secret", Some(&header), body).is_ok());
        assert_matches!(
            verify_signature("other-secret", Some(&header), body),
            Err(WebhookError::InvalidSignature)
        );
        assert_matches!(
            verify_signature("app-secret", Some(&header), b"tampered"),
            Err(WebhookError::InvalidSignature)
        );
        assert_matches!(
            verify_signature("app-secret", Some("sha256=zz"), body),
            Err(WebhookError::InvalidSignature)
        );
        assert_matches!(
            verify_signature("app-secret", None, body),
            Err(WebhookError::MissingSignature)
        );
    }

    #[test]
    fn parses_status_updates() {
        let body = wrap(json!({
            "metadata": { "phone_number_id": "PN-1", "display_phone_number": "15550009999" },
            "statuses": [
                { "id": "wamid.A", "status": "delivered", "timestamp": "1700000000", "recipient_id": "15550000001" },
                { "id": "wamid.B", "status": "failed", "timestamp": "1700000001",
                  "errors": [{ "code": 131026, "title": "Message undeliverable" }] },
                { "id": "wamid.C", "status": "deleted" }
            ]
        }));
        let events = parse_events(&body).unwrap();
        assert_eq!(events.len(), 2);

        let WebhookEvent::Status(first) = &events[0] else {
            panic!("expected status event");
        };
        assert_eq!(first.account.business_account_id, "WABA-1");
        assert_eq!(first.account.phone_number_id, "PN-1");
        assert_eq!(first.external_id, "wamid.A");
        assert_eq!(first.status, MessageStatus::Delivered);
        assert_eq!(first.timestamp.timestamp(), 1_700_000_000);

        assert_matches!(&events[1], WebhookEvent::Status(s) if s.status == MessageStatus::Failed
            && s.error.as_deref() == Some("131026: Message undeliverable"));
    }

    #[test]
    fn parses_incoming_messages() {
        let body = wrap(json!({
            "metadata": { "phone_number_id": "PN-1" },
            "messages": [
                { "id": "wamid.in1", "from": "15550000001", "timestamp": "1700000100",
                  "type": "text", "text": { "body": "STOP" } },
                { "id": "wamid.in2", "from": "15550000001", "type": "image",
                  "image": { "id": "media-1" } },
                { "from": "15550000001", "type": "text", "text": { "body": "no id" } }
            ]
        }));
        let events = parse_events(&body).unwrap();
        assert_eq!(events.len(), 2);
        assert_matches!(&events[0], WebhookEvent::Incoming(m)
            if m.from == "+15550000001" && m.content == "STOP" && m.external_id == "wamid.in1");
        assert_matches!(&events[1], WebhookEvent::Incoming(m) if m.content == "[image]");
    }

    #[test]
    fn rejects_foreign_objects_and_garbage() {
        assert_matches!(
            parse_events(br#"{"object":"page","entry":[]}"#),
            Err(WebhookError::InvalidPayload(_))
        );
        assert_matches!(parse_events(b"not json"), Err(WebhookError::InvalidPayload(_)));
    }

    #[test]
    fn other_fields_are_ignored() {
        let body = serde_json::to_vec(&json!({
            "object": "whatsapp_business_account",
            "entry": [{ "id": "WABA-1", "changes": [{ "field": "account_update", "value": {} }] }]
        }))
        .unwrap();
        assert!(parse_events(&body).unwrap().is_empty());
    }
}
