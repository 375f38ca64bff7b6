//! Bounded retry with exponential backoff around a single send.

use std::future::Future;
use std::time::Duration;

use oneclick_core::delivery::backoff_with_jitter;

use crate::client::{MessagingApi, SendReceipt, SenderCredentials, TemplateMessage, TextMessage};
use crate::error::DeliveryError;
use crate::rate_limit::RateLimiter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first (at least 1).
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubles per attempt.
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_backoff: Duration::from_millis(500),
        }
    }
}

/// Final result of a send plus the number of attempts it took.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub result: Result<SendReceipt, DeliveryError>,
    pub attempts: u32,
}

/// Send one template message, retrying transient failures.
///
/// Every attempt waits for the shared `limiter` first. Permanent and
/// authentication errors return immediately.
pub async fn send_with_retry(
    api: &dyn MessagingApi,
    limiter: &RateLimiter,
    credentials: &SenderCredentials,
    message: &TemplateMessage,
    policy: RetryPolicy,
) -> SendOutcome {
    retry_send(limiter, policy, move || api.send_template(credentials, message)).await
}

/// [`send_with_retry`] for a free-form text message.
pub async fn send_text_with_retry(
    api: &dyn MessagingApi,
    limiter: &RateLimiter,
    credentials: &SenderCredentials,
    message: &TextMessage,
    policy: RetryPolicy,
) -> SendOutcome {
    retry_send(limiter, policy, move || api.send_text(credentials, message)).await
}

async fn retry_send<F, Fut>(limiter: &RateLimiter, policy: RetryPolicy, mut attempt_send: F) -> SendOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<SendReceipt, DeliveryError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        limiter.acquire().await;

        match attempt_send().await {
            Ok(receipt) => {
                return SendOutcome {
                    result: Ok(receipt),
                    attempts: attempt,
                }
            }
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                let delay = backoff_with_jitter(attempt, policy.base_backoff);
                tracing::warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Send attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                return SendOutcome {
                    result: Err(err),
                    attempts: attempt,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use assert_matches::assert_matches;
    use async_trait::async_trait;

    use super::*;

    /// Replays a fixed script of results, one per call.
    struct Scripted {
        script: Mutex<Vec<Result<SendReceipt, DeliveryError>>>,
        calls: Mutex<u32>,
    }

    impl Scripted {
        fn new(mut script: Vec<Result<SendReceipt, DeliveryError>>) -> Self {
            script.reverse();
            Self {
                script: Mutex::new(script),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    impl Scripted {
        fn next(&self) -> Result<SendReceipt, DeliveryError> {
            *self.calls.lock().unwrap() += 1;
            self.script
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(DeliveryError::Transient("script exhausted".into())))
        }
    }

    #[async_trait]
    impl MessagingApi for Scripted {
        async fn send_template(
            &self,
            _credentials: &SenderCredentials,
            _message: &TemplateMessage,
        ) -> Result<SendReceipt, DeliveryError> {
            self.next()
        }

        async fn send_text(
            &self,
            _credentials: &SenderCredentials,
            _message: &TextMessage,
        ) -> Result<SendReceipt, DeliveryError> {
            self.next()
        }
    }

    fn creds() -> SenderCredentials {
        SenderCredentials {
            access_token: "token".into(),
            phone_number_id: "123".into(),
        }
    }

    fn message() -> TemplateMessage {
        TemplateMessage {
            to: "15550000001".into(),
            template_name: "hello".into(),
            language: "en_US".into(),
            body_parameters: Vec::new(),
        }
    }

    fn receipt(id: &str) -> Result<SendReceipt, DeliveryError> {
        Ok(SendReceipt {
            external_id: id.into(),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn transient_then_success() {
        let api = Scripted::new(vec![
            Err(DeliveryError::Transient("HTTP 503".into())),
            Err(DeliveryError::Transient("HTTP 429".into())),
            receipt("wamid.1"),
        ]);
        let outcome = send_with_retry(
            &api,
            &RateLimiter::new(100),
            &creds(),
            &message(),
            RetryPolicy::default(),
        )
        .await;
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.result.unwrap().external_id, "wamid.1");
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_is_not_retried() {
        let api = Scripted::new(vec![Err(DeliveryError::Permanent("HTTP 400".into()))]);
        let outcome = send_with_retry(
            &api,
            &RateLimiter::new(100),
            &creds(),
            &message(),
            RetryPolicy::default(),
        )
        .await;
        assert_eq!(api.calls(), 1);
        assert_matches!(outcome.result, Err(DeliveryError::Permanent(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn authentication_is_not_retried() {
        let api = Scripted::new(vec![Err(DeliveryError::Authentication("HTTP 401".into()))]);
        let outcome = send_with_retry(
            &api,
            &RateLimiter::new(100),
            &creds(),
            &message(),
            RetryPolicy::default(),
        )
        .await;
        assert_eq!(outcome.attempts, 1);
        assert_matches!(outcome.result, Err(DeliveryError::Authentication(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_after_max_attempts() {
        let api = Scripted::new(Vec::new());
        let policy = RetryPolicy {
            max_attempts: 3,
            base_backoff: Duration::from_millis(100),
        };
        let start = tokio::time::Instant::now();
        let outcome =
            send_with_retry(&api, &RateLimiter::new(100), &creds(), &message(), policy).await;

        assert_eq!(api.calls(), 3);
        assert_eq!(outcome.attempts, 3);
        assert_matches!(outcome.result, Err(DeliveryError::Transient(_)));
        // 100ms + 200ms of backoff, plus at most 10% jitter each.
        assert!(start.elapsed() >= Duration::from_millis(300));
        assert!(start.elapsed() <= Duration::from_millis(330));
    }

    #[tokio::test(start_paused = true)]
    async fn text_sends_share_the_retry_rules() {
        let api = Scripted::new(vec![
            Err(DeliveryError::Transient("HTTP 503".into())),
            Err(DeliveryError::Permanent("HTTP 400: re-engagement required".into())),
        ]);
        let text = TextMessage {
            to: "15550000001".into(),
            body: "Your order shipped".into(),
            preview_url: false,
        };
        let outcome = send_text_with_retry(
            &api,
            &RateLimiter::new(100),
            &creds(),
            &text,
            RetryPolicy::default(),
        )
        .await;
        assert_eq!(outcome.attempts, 2);
        assert_matches!(outcome.result, Err(DeliveryError::Permanent(_)));
    }
}
