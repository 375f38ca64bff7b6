//! `CloudApiClient` against a mock Graph API server.

use assert_matches::assert_matches;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use oneclick_whatsapp::{
    CloudApiClient, CloudApiConfig, DeliveryError, MessagingApi, SenderCredentials,
    TemplateMessage, TextMessage,
};

fn client(server: &MockServer) -> CloudApiClient {
    CloudApiClient::new(CloudApiConfig {
        base_url: server.uri(),
        api_version: "v19.0".into(),
    })
}

fn creds() -> SenderCredentials {
    SenderCredentials {
        access_token: "test-token".into(),
        phone_number_id: "PN-1".into(),
    }
}

fn message() -> TemplateMessage {
    TemplateMessage {
        to: "15550000001".into(),
        template_name: "order_update".into(),
        language: "en_US".into(),
        body_parameters: vec!["Ada".into()],
    }
}

#[tokio::test]
async fn send_returns_external_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v19.0/PN-1/messages"))
        .and(header("authorization", "Bearer test-token"))
        .and(body_partial_json(json!({
            "messaging_product": "whatsapp",
            "to": "15550000001",
            "template": { "name": "order_update", "language": { "code": "en_US" } }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messaging_product": "whatsapp",
            "contacts": [{ "input": "15550000001", "wa_id": "15550000001" }],
            "messages": [{ "id": "wamid.HBgL" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let receipt = client(&server).send_template(&creds(), &message()).await.unwrap();
    assert_eq!(receipt.external_id, "wamid.HBgL");
}

#[tokio::test]
async fn text_send_posts_text_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v19.0/PN-1/messages"))
        .and(header("authorization", "Bearer test-token"))
        .and(body_partial_json(json!({
            "messaging_product": "whatsapp",
            "to": "15550000001",
            "type": "text",
            "text": { "body": "Your order shipped", "preview_url": false }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [{ "id": "wamid.TEXT1" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let text = TextMessage {
        to: "15550000001".into(),
        body: "Your order shipped".into(),
        preview_url: false,
    };
    let receipt = client(&server).send_text(&creds(), &text).await.unwrap();
    assert_eq!(receipt.external_id, "wamid.TEXT1");
}

#[tokio::test]
async fn text_outside_care_window_is_permanent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "message": "Re-engagement message", "code": 131047 }
        })))
        .mount(&server)
        .await;

    let text = TextMessage {
        to: "15550000001".into(),
        body: "Hello again".into(),
        preview_url: false,
    };
    let err = client(&server).send_text(&creds(), &text).await.unwrap_err();
    assert_matches!(err, DeliveryError::Permanent(ref m) if m.contains("Re-engagement"));
}

#[tokio::test]
async fn unauthorized_is_authentication_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": { "message": "Invalid OAuth access token", "code": 190 }
        })))
        .mount(&server)
        .await;

    let err = client(&server).send_template(&creds(), &message()).await.unwrap_err();
    assert_matches!(err, DeliveryError::Authentication(_));
}

#[tokio::test]
async fn server_error_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client(&server).send_template(&creds(), &message()).await.unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn invalid_recipient_is_permanent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "message": "Invalid parameter", "code": 100 }
        })))
        .mount(&server)
        .await;

    let err = client(&server).send_template(&creds(), &message()).await.unwrap_err();
    assert_matches!(err, DeliveryError::Permanent(ref m) if m.contains("Invalid parameter"));
}

#[tokio::test]
async fn accepted_without_id_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "messages": [] })))
        .mount(&server)
        .await;

    let err = client(&server).send_template(&creds(), &message()).await.unwrap_err();
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn connection_refused_is_transient() {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let client = CloudApiClient::new(CloudApiConfig {
        base_url: uri,
        api_version: "v19.0".into(),
    });
    let err = client.send_template(&creds(), &message()).await.unwrap_err();
    assert!(err.is_retryable());
}
