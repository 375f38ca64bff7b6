use std::time::Duration;

use oneclick_core::pricing::PricingDefaults;
use oneclick_whatsapp::client::{DEFAULT_API_VERSION, DEFAULT_BASE_URL};
use oneclick_whatsapp::CloudApiConfig;
use oneclick_whatsapp::RetryPolicy;
use rust_decimal::Decimal;

use crate::auth::jwt::JwtConfig;

/// Server configuration loaded from environment variables.
///
/// All fields except the secrets have defaults suitable for local
/// development. In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// JWT validation settings.
    pub jwt: JwtConfig,
    /// Platform-wide fallback rate.
    pub pricing: PricingDefaults,
    pub whatsapp: WhatsAppConfig,
    pub dispatch: DispatchConfig,
    /// Passphrase the access-token encryption key is derived from.
    pub credentials_key: String,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default                 |
    /// |------------------------------|-------------------------|
    /// | `HOST`                       | `0.0.0.0`               |
    /// | `PORT`                       | `3000`                  |
    /// | `CORS_ORIGINS`               | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`       | `30`                    |
    /// | `DEFAULT_PRICE_PER_MESSAGE`  | `0.0150`                |
    /// | `DEFAULT_CURRENCY`           | `USD`                   |
    /// | `CREDENTIALS_ENCRYPTION_KEY` | **required**            |
    ///
    /// See [`JwtConfig::from_env`], [`WhatsAppConfig::from_env`] and
    /// [`DispatchConfig::from_env`] for the nested sections.
    ///
    /// # Panics
    ///
    /// Panics on unparsable values or a missing encryption key.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let defaults = PricingDefaults::default();
        let price_per_message: Decimal = match std::env::var("DEFAULT_PRICE_PER_MESSAGE") {
            Ok(raw) => raw
                .trim()
                .parse()
                .expect("DEFAULT_PRICE_PER_MESSAGE must be a decimal amount"),
            Err(_) => defaults.price_per_message,
        };
        assert!(
            price_per_message >= Decimal::ZERO,
            "DEFAULT_PRICE_PER_MESSAGE must not be negative"
        );
        let currency = std::env::var("DEFAULT_CURRENCY")
            .map(|c| c.trim().to_ascii_uppercase())
            .unwrap_or(defaults.currency);

        let credentials_key = std::env::var("CREDENTIALS_ENCRYPTION_KEY")
            .expect("CREDENTIALS_ENCRYPTION_KEY must be set in the environment");
        assert!(
            !credentials_key.is_empty(),
            "CREDENTIALS_ENCRYPTION_KEY must not be empty"
        );

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            jwt: JwtConfig::from_env(),
            pricing: PricingDefaults {
                price_per_message,
                currency,
            },
            whatsapp: WhatsAppConfig::from_env(),
            dispatch: DispatchConfig::from_env(),
            credentials_key,
        }
    }
}

/// Cloud API endpoint and webhook settings.
#[derive(Debug, Clone)]
pub struct WhatsAppConfig {
    pub base_url: String,
    pub api_version: String,
    /// Shared secret for the subscription handshake. Empty rejects every handshake.
    pub verify_token: String,
    /// App secret for `X-Hub-Signature-256`; signatures are not checked when unset.
    pub app_secret: Option<String>,
}

impl WhatsAppConfig {
    /// | Env Var                 | Default                      |
    /// |-------------------------|------------------------------|
    /// | `WHATSAPP_API_BASE_URL` | `https://graph.facebook.com` |
    /// | `WHATSAPP_API_VERSION`  | `v19.0`                      |
    /// | `WHATSAPP_VERIFY_TOKEN` | empty                        |
    /// | `WHATSAPP_APP_SECRET`   | unset                        |
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("WHATSAPP_API_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.into()),
            api_version: std::env::var("WHATSAPP_API_VERSION")
                .unwrap_or_else(|_| DEFAULT_API_VERSION.into()),
            verify_token: std::env::var("WHATSAPP_VERIFY_TOKEN").unwrap_or_default(),
            app_secret: std::env::var("WHATSAPP_APP_SECRET")
                .ok()
                .filter(|s| !s.is_empty()),
        }
    }

    pub fn cloud_api(&self) -> CloudApiConfig {
        CloudApiConfig {
            base_url: self.base_url.clone(),
            api_version: self.api_version.clone(),
        }
    }
}

/// Background dispatch engine settings.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Concurrent sends per campaign.
    pub max_concurrency: usize,
    /// Outbound requests per second across the process.
    pub rate_per_sec: u32,
    /// Attempts per recipient, including the first.
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub poll_interval_secs: u64,
    /// Number of delivery-callback partitions.
    pub status_partitions: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            rate_per_sec: 20,
            max_attempts: 4,
            base_backoff_ms: 500,
            poll_interval_secs: 5,
            status_partitions: 4,
        }
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|_| panic!("{name} must be a valid number")),
        Err(_) => default,
    }
}

impl DispatchConfig {
    /// | Env Var                       | Default |
    /// |-------------------------------|---------|
    /// | `DISPATCH_MAX_CONCURRENCY`    | `8`     |
    /// | `DISPATCH_RATE_PER_SEC`       | `20`    |
    /// | `DISPATCH_MAX_ATTEMPTS`       | `4`     |
    /// | `DISPATCH_BASE_BACKOFF_MS`    | `500`   |
    /// | `DISPATCH_POLL_INTERVAL_SECS` | `5`     |
    /// | `STATUS_UPDATER_PARTITIONS`   | `4`     |
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            max_concurrency: env_or("DISPATCH_MAX_CONCURRENCY", d.max_concurrency).max(1),
            rate_per_sec: env_or("DISPATCH_RATE_PER_SEC", d.rate_per_sec).max(1),
            max_attempts: env_or("DISPATCH_MAX_ATTEMPTS", d.max_attempts).max(1),
            base_backoff_ms: env_or("DISPATCH_BASE_BACKOFF_MS", d.base_backoff_ms),
            poll_interval_secs: env_or("DISPATCH_POLL_INTERVAL_SECS", d.poll_interval_secs).max(1),
            status_partitions: env_or("STATUS_UPDATER_PARTITIONS", d.status_partitions).max(1),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_backoff: Duration::from_millis(self.base_backoff_ms),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}
