//! HTTP client for the Cloud API `/{phone_number_id}/messages` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DeliveryError;

/// Default Graph API host.
pub const DEFAULT_BASE_URL: &str = "https://graph.facebook.com";

/// Default Graph API version.
pub const DEFAULT_API_VERSION: &str = "v19.0";

/// HTTP request timeout for a single send attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Decrypted per-client credentials for one dispatch.
#[derive(Clone)]
pub struct SenderCredentials {
    pub access_token: String,
    pub phone_number_id: String,
}

impl std::fmt::Debug for SenderCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SenderCredentials")
            .field("access_token", &"<redacted>")
            .field("phone_number_id", &self.phone_number_id)
            .finish()
    }
}

/// One template message to one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateMessage {
    /// Recipient in digits-only form.
    pub to: String,
    pub template_name: String,
    pub language: String,
    /// Positional body parameters for `{{1}}..{{n}}`.
    pub body_parameters: Vec<String>,
}

/// A free-form text message. Only deliverable inside the 24-hour customer
/// care window opened by the recipient's last message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMessage {
    /// Recipient in digits-only form.
    pub to: String,
    pub body: String,
    pub preview_url: bool,
}

/// Acknowledgement from the API: the external message id (`wamid.*`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub external_id: String,
}

#[derive(Debug, Serialize)]
struct SendPayload<'a> {
    messaging_product: &'static str,
    recipient_type: &'static str,
    to: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    template: TemplatePayload<'a>,
}

#[derive(Debug, Serialize)]
struct TextSendPayload<'a> {
    messaging_product: &'static str,
    recipient_type: &'static str,
    to: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    text: TextPayload<'a>,
}

#[derive(Debug, Serialize)]
struct TextPayload<'a> {
    preview_url: bool,
    body: &'a str,
}

#[derive(Debug, Serialize)]
struct TemplatePayload<'a> {
    name: &'a str,
    language: LanguagePayload<'a>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    components: Vec<ComponentPayload<'a>>,
}

#[derive(Debug, Serialize)]
struct LanguagePayload<'a> {
    code: &'a str,
}

#[derive(Debug, Serialize)]
struct ComponentPayload<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    parameters: Vec<TextParameter<'a>>,
}

#[derive(Debug, Serialize)]
struct TextParameter<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    messages: Vec<SentMessage>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    id: String,
}

fn build_payload(message: &TemplateMessage) -> SendPayload<'_> {
    let components = if message.body_parameters.is_empty() {
        Vec::new()
    } else {
        vec![ComponentPayload {
            kind: "body",
            parameters: message
                .body_parameters
                .iter()
                .map(|text| TextParameter { kind: "text", text })
                .collect(),
        }]
    };

    SendPayload {
        messaging_product: "whatsapp",
        recipient_type: "individual",
        to: &message.to,
        kind: "template",
        template: TemplatePayload {
            name: &message.template_name,
            language: LanguagePayload {
                code: &message.language,
            },
            components,
        },
    }
}

fn build_text_payload(message: &TextMessage) -> TextSendPayload<'_> {
    TextSendPayload {
        messaging_product: "whatsapp",
        recipient_type: "individual",
        to: &message.to,
        kind: "text",
        text: TextPayload {
            preview_url: message.preview_url,
            body: &message.body,
        },
    }
}

// ---------------------------------------------------------------------------
// MessagingApi
// ---------------------------------------------------------------------------

/// Sends messages. Implemented by [`CloudApiClient`] and by test fakes.
///
/// Each call is a single attempt; retries are the caller's concern.
#[async_trait]
pub trait MessagingApi: Send + Sync {
    async fn send_template(
        &self,
        credentials: &SenderCredentials,
        message: &TemplateMessage,
    ) -> Result<SendReceipt, DeliveryError>;

    async fn send_text(
        &self,
        credentials: &SenderCredentials,
        message: &TextMessage,
    ) -> Result<SendReceipt, DeliveryError>;
}

// ---------------------------------------------------------------------------
// CloudApiClient
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CloudApiConfig {
    /// Graph API host, e.g. `https://graph.facebook.com`.
    pub base_url: String,
    /// Graph API version segment, e.g. `v19.0`.
    pub api_version: String,
}

impl Default for CloudApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
        }
    }
}

/// [`MessagingApi`] over HTTP using [`reqwest`].
pub struct CloudApiClient {
    client: reqwest::Client,
    config: CloudApiConfig,
}

impl CloudApiClient {
    pub fn new(config: CloudApiConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build reqwest HTTP client");
        Self { client, config }
    }

    /// `{base}/{version}/{phone_number_id}/messages`.
    pub fn messages_url(&self, phone_number_id: &str) -> String {
        format!(
            "{}/{}/{}/messages",
            self.config.base_url.trim_end_matches('/'),
            self.config.api_version,
            phone_number_id
        )
    }
}

impl CloudApiClient {
    /// POST one payload and read the external id from the acknowledgement.
    async fn post_message<T: Serialize + ?Sized>(
        &self,
        credentials: &SenderCredentials,
        payload: &T,
        kind: &'static str,
    ) -> Result<SendReceipt, DeliveryError> {
        let url = self.messages_url(&credentials.phone_number_id);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&credentials.access_token)
            .json(payload)
            .send()
            .await
            .map_err(|e| DeliveryError::from_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = DeliveryError::from_response(status.as_u16(), &body);
            tracing::debug!(
                status = status.as_u16(),
                kind,
                error = %err,
                "Cloud API rejected send"
            );
            return Err(err);
        }

        // The message was accepted; a malformed body must not trigger a resend.
        let parsed: SendResponse = response
            .json()
            .await
            .map_err(|e| DeliveryError::Permanent(format!("unreadable send response: {e}")))?;
        let external_id = parsed
            .messages
            .into_iter()
            .next()
            .map(|m| m.id)
            .ok_or_else(|| DeliveryError::Permanent("send response had no message id".into()))?;

        Ok(SendReceipt { external_id })
    }
}

#[async_trait]
impl MessagingApi for CloudApiClient {
    async fn send_template(
        &self,
        credentials: &SenderCredentials,
        message: &TemplateMessage,
    ) -> Result<SendReceipt, DeliveryError> {
        self.post_message(credentials, &build_payload(message), "template")
            .await
    }

    async fn send_text(
        &self,
        credentials: &SenderCredentials,
        message: &TextMessage,
    ) -> Result<SendReceipt, DeliveryError> {
        self.post_message(credentials, &build_text_payload(message), "text")
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_shape() {
        let message = TemplateMessage {
            to: "15550000001".into(),
            template_name: "order_update".into(),
            language: "en_US".into(),
            body_parameters: vec!["Ada".into(), "".into()],
        };
        let json = serde_json::to_value(build_payload(&message)).unwrap();
        assert_eq!(json["messaging_product"], "whatsapp");
        assert_eq!(json["to"], "15550000001");
        assert_eq!(json["type"], "template");
        assert_eq!(json["template"]["language"]["code"], "en_US");
        let params = &json["template"]["components"][0]["parameters"];
        assert_eq!(params[0]["text"], "Ada");
        assert_eq!(params[1]["text"], "");
    }

    #[test]
    fn no_components_without_parameters() {
        let message = TemplateMessage {
            to: "15550000001".into(),
            template_name: "hello_world".into(),
            language: "en_US".into(),
            body_parameters: Vec::new(),
        };
        let json = serde_json::to_value(build_payload(&message)).unwrap();
        assert!(json["template"].get("components").is_none());
    }

    #[test]
    fn text_payload_shape() {
        let message = TextMessage {
            to: "15550000001".into(),
            body: "See https://example.com/track".into(),
            preview_url: true,
        };
        let json = serde_json::to_value(build_text_payload(&message)).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["to"], "15550000001");
        assert_eq!(json["text"]["body"], "See https://example.com/track");
        assert_eq!(json["text"]["preview_url"], true);
        assert!(json.get("template").is_none());
    }

    #[test]
    fn url_builder() {
        let client = CloudApiClient::new(CloudApiConfig {
            base_url: "http://localhost:9000/".into(),
            api_version: "v19.0".into(),
        });
        assert_eq!(
            client.messages_url("12345"),
            "http://localhost:9000/v19.0/12345/messages"
        );
    }

    #[test]
    fn credentials_debug_redacts_token() {
        let creds = SenderCredentials {
            access_token: "EAAG-secret".into(),
            phone_number_id: "12345".into(),
        };
        let shown = format!("{creds:?}");
        assert!(!shown.contains("EAAG-secret"));
        assert!(shown.contains("12345"));
    }
}
