#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use oneclick_api::auth::jwt::{issue_token, JwtConfig};
use oneclick_api::config::{DispatchConfig, ServerConfig, WhatsAppConfig};
use oneclick_api::engine::status_updater::StatusUpdater;
use oneclick_api::engine::EngineHandle;
use oneclick_api::routes;
use oneclick_api::state::AppState;
use oneclick_core::crypto::CredentialCipher;
use oneclick_core::pricing::PricingDefaults;
use oneclick_core::roles::Role;
use oneclick_whatsapp::{CloudApiClient, MessagingApi, RateLimiter};

pub const TEST_JWT_SECRET: &str = "test-secret-for-integration-tests";
pub const TEST_VERIFY_TOKEN: &str = "verify-me";
pub const TEST_ENCRYPTION_KEY: &str = "test-credentials-key";

/// Build a test `ServerConfig` with safe defaults.
///
/// The default price is `0.0150 USD`, the webhook verify token is
/// [`TEST_VERIFY_TOKEN`] and signatures are not checked.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        jwt: JwtConfig {
            secret: TEST_JWT_SECRET.to_string(),
            access_token_expiry_mins: 15,
        },
        pricing: PricingDefaults::default(),
        whatsapp: WhatsAppConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            api_version: "v19.0".to_string(),
            verify_token: TEST_VERIFY_TOKEN.to_string(),
            app_secret: None,
        },
        dispatch: DispatchConfig::default(),
        credentials_key: TEST_ENCRYPTION_KEY.to_string(),
    }
}

/// The cipher the test app encrypts access tokens with.
pub fn test_cipher() -> CredentialCipher {
    CredentialCipher::from_passphrase(TEST_ENCRYPTION_KEY).unwrap()
}

/// Build the full application router with all middleware layers, using the
/// given database pool.
///
/// Mirrors `main.rs` except that no scheduler runs: campaigns queued by the
/// send endpoint stay PENDING_SEND, so tests observe the API in isolation.
/// The status updater does run, so webhook callbacks are applied.
pub fn build_test_app(pool: PgPool) -> Router {
    build_test_app_with_config(pool, test_config())
}

pub fn build_test_app_with_config(pool: PgPool, config: ServerConfig) -> Router {
    let api = Arc::new(CloudApiClient::new(config.whatsapp.cloud_api()));
    build_test_app_with_api(pool, config, api)
}

/// Same as [`build_test_app_with_config`] with a stand-in messaging API.
pub fn build_test_app_with_api(
    pool: PgPool,
    config: ServerConfig,
    messaging: Arc<dyn MessagingApi>,
) -> Router {
    let (status_updates, _workers) = StatusUpdater::start(
        pool.clone(),
        config.dispatch.status_partitions,
        CancellationToken::new(),
    );

    let state = AppState {
        pool,
        cipher: Arc::new(test_cipher()),
        config: Arc::new(config),
        engine: EngineHandle::new(status_updates),
        messaging,
        limiter: Arc::new(RateLimiter::new(1000)),
    };

    let cors = CorsLayer::new()
        .allow_origin(["http://localhost:5173".parse().unwrap()])
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600));

    let request_id_header = HeaderName::from_static("x-request-id");

    Router::new()
        .merge(routes::health::router())
        .nest("/api/v1", routes::api_routes())
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(30),
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

fn token_for(client_id: i64, role: Role) -> String {
    issue_token(client_id, role, &test_config().jwt).unwrap()
}

pub fn admin_token() -> String {
    token_for(1, Role::Admin)
}

pub fn client_token(client_id: i64) -> String {
    token_for(client_id, Role::Client)
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

pub async fn send(app: Router, request: Request<Body>) -> Response {
    app.oneshot(request).await.unwrap()
}

fn request(method: Method, uri: &str, token: Option<&str>, body: Option<serde_json::Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(json) => builder
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn get(app: Router, uri: &str) -> Response {
    send(app, request(Method::GET, uri, None, None)).await
}

pub async fn get_auth(app: Router, uri: &str, token: &str) -> Response {
    send(app, request(Method::GET, uri, Some(token), None)).await
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response {
    send(app, request(Method::POST, uri, None, Some(body))).await
}

pub async fn post_json_auth(app: Router, uri: &str, body: serde_json::Value, token: &str) -> Response {
    send(app, request(Method::POST, uri, Some(token), Some(body))).await
}

pub async fn post_auth(app: Router, uri: &str, token: &str) -> Response {
    send(app, request(Method::POST, uri, Some(token), None)).await
}

pub async fn put_json_auth(app: Router, uri: &str, body: serde_json::Value, token: &str) -> Response {
    send(app, request(Method::PUT, uri, Some(token), Some(body))).await
}

pub async fn delete_auth(app: Router, uri: &str, token: &str) -> Response {
    send(app, request(Method::DELETE, uri, Some(token), None)).await
}

/// Read the full response body as JSON.
pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_text(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}
