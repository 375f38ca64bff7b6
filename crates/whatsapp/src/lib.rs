//! Boundary to the WhatsApp Business (Cloud) API.
//!
//! Outbound: [`MessagingApi`] sends one template or text message per call;
//! [`CloudApiClient`] is the HTTP implementation. Failures are classified
//! into [`DeliveryError`] so callers know whether a retry can help.
//! [`RateLimiter`] and [`retry::send_with_retry`] wrap any `MessagingApi`.
//!
//! Inbound: [`webhook`] parses callback payloads into status updates and
//! incoming messages and verifies their signatures.

pub mod client;
pub mod error;
pub mod rate_limit;
pub mod retry;
pub mod webhook;

pub use client::{
    CloudApiClient, CloudApiConfig, MessagingApi, SendReceipt, SenderCredentials, TemplateMessage,
    TextMessage,
};
pub use error::DeliveryError;
pub use rate_limit::RateLimiter;
pub use retry::{send_text_with_retry, send_with_retry, RetryPolicy, SendOutcome};
