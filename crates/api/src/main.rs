use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method, StatusCode};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use oneclick_api::config::ServerConfig;
use oneclick_api::engine::dispatcher::{DispatchSettings, Dispatcher};
use oneclick_api::engine::scheduler::CampaignScheduler;
use oneclick_api::engine::status_updater::StatusUpdater;
use oneclick_api::engine::store::PgDispatchStore;
use oneclick_api::engine::EngineHandle;
use oneclick_api::{routes, state};
use oneclick_core::crypto::CredentialCipher;
use oneclick_whatsapp::{CloudApiClient, MessagingApi, RateLimiter};

use state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "oneclick_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = %config.port,
        default_price = %config.pricing.price_per_message,
        currency = %config.pricing.currency,
        "Loaded server configuration",
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = oneclick_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    oneclick_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    oneclick_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- CORS ---
    let cors = build_cors_layer(&config);

    // --- Credential encryption ---
    let cipher = Arc::new(
        CredentialCipher::from_passphrase(&config.credentials_key)
            .expect("Invalid CREDENTIALS_ENCRYPTION_KEY"),
    );

    let engine_cancel = CancellationToken::new();

    // --- Status updater ---
    let (status_updates, status_workers) = StatusUpdater::start(
        pool.clone(),
        config.dispatch.status_partitions,
        engine_cancel.clone(),
    );
    let engine = EngineHandle::new(status_updates);

    // --- Dispatch engine ---
    let api: Arc<dyn MessagingApi> = Arc::new(CloudApiClient::new(config.whatsapp.cloud_api()));
    let limiter = Arc::new(RateLimiter::new(config.dispatch.rate_per_sec));
    let store = Arc::new(PgDispatchStore::new(
        pool.clone(),
        Arc::clone(&cipher),
        config.pricing.clone(),
    ));
    let dispatcher = Arc::new(Dispatcher::new(
        store,
        Arc::clone(&api),
        Arc::clone(&limiter),
        DispatchSettings {
            max_concurrency: config.dispatch.max_concurrency,
            retry: config.dispatch.retry_policy(),
        },
    ));

    let scheduler = CampaignScheduler::new(
        pool.clone(),
        dispatcher,
        engine.clone(),
        config.dispatch.poll_interval(),
    );
    let scheduler_cancel = engine_cancel.clone();
    let scheduler_handle = tokio::spawn(async move {
        scheduler.run(scheduler_cancel).await;
    });
    tracing::info!(
        max_concurrency = config.dispatch.max_concurrency,
        rate_per_sec = config.dispatch.rate_per_sec,
        "Dispatch engine started",
    );

    // --- App state ---
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        cipher,
        engine,
        messaging: api,
        limiter,
    };

    // --- Request ID header name ---
    let request_id_header = HeaderName::from_static("x-request-id");

    // --- Router ---
    let app = Router::new()
        // Health check at root level (not under /api/v1).
        .merge(routes::health::router())
        // API v1 routes.
        .nest("/api/v1", routes::api_routes())
        // -- Middleware stack (applied bottom-up) --
        // Panic recovery: catch panics and return 500 JSON.
        .layer(CatchPanicLayer::new())
        // Request timeout.
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_secs),
        ))
        // Propagate request ID to response.
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        // Structured request/response tracing.
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Set request ID on incoming requests.
        .layer(SetRequestIdLayer::new(
            request_id_header,
            MakeRequestUuid,
        ))
        // CORS.
        .layer(cors)
        // Shared state.
        .with_state(state);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // Stop claiming campaigns and submitting recipients. Sends already
    // handed to the API finish inside the scheduler's join.
    engine_cancel.cancel();
    if tokio::time::timeout(Duration::from_secs(5), scheduler_handle)
        .await
        .is_err()
    {
        tracing::warn!("Scheduler did not stop in time; remaining sends resume on restart");
    }
    tracing::info!("Campaign scheduler stopped");

    for worker in status_workers {
        let _ = tokio::time::timeout(Duration::from_secs(5), worker).await;
    }
    tracing::info!("Status updater stopped");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Build the CORS middleware layer from server configuration.
///
/// Panics at startup if any configured origin is invalid.
fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<_> = config
        .cors_origins
        .iter()
        .map(|o| {
            o.parse()
                .unwrap_or_else(|e| panic!("Invalid CORS origin '{o}': {e}"))
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}
