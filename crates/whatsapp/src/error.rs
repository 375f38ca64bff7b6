//! Delivery error taxonomy for the Cloud API.

/// Why a send attempt failed, classified by whether retrying can help.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// Timeouts, connection failures, 408, 429 and 5xx.
    #[error("Transient delivery failure: {0}")]
    Transient(String),

    /// Rejected request (invalid recipient, template mismatch, other 4xx).
    #[error("Delivery rejected: {0}")]
    Permanent(String),

    /// The access token was rejected (401/403).
    #[error("Messaging API authentication failed: {0}")]
    Authentication(String),
}

/// Cloud API error codes that signal throttling even when the HTTP status is 400.
const THROTTLING_CODES: &[i64] = &[4, 80007, 130429, 131048, 131056];

impl DeliveryError {
    /// Only transient failures are retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DeliveryError::Transient(_))
    }

    /// Short reason stored on the failed message row.
    pub fn reason(&self) -> &str {
        match self {
            DeliveryError::Transient(msg)
            | DeliveryError::Permanent(msg)
            | DeliveryError::Authentication(msg) => msg,
        }
    }

    /// Classify a non-2xx response.
    ///
    /// `body` is the raw response text; the Cloud API's
    /// `{"error": {"message", "code"}}` shape is used when present.
    pub fn from_response(status: u16, body: &str) -> Self {
        let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
        let api_error = parsed.as_ref().map(|v| &v["error"]);
        let code = api_error.and_then(|e| e["code"].as_i64());
        let message = api_error
            .and_then(|e| e["message"].as_str())
            .map(|m| format!("HTTP {status}: {m}"))
            .unwrap_or_else(|| format!("HTTP {status}"));

        match status {
            401 | 403 => DeliveryError::Authentication(message),
            408 | 429 => DeliveryError::Transient(message),
            s if s >= 500 => DeliveryError::Transient(message),
            _ if code.is_some_and(|c| THROTTLING_CODES.contains(&c)) => {
                DeliveryError::Transient(message)
            }
            _ => DeliveryError::Permanent(message),
        }
    }

    /// Classify a transport-level failure (no usable response).
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            DeliveryError::Transient(format!("transport error: {err}"))
        } else {
            DeliveryError::Permanent(format!("transport error: {err}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn auth_statuses() {
        assert_matches!(DeliveryError::from_response(401, ""), DeliveryError::Authentication(_));
        assert_matches!(DeliveryError::from_response(403, ""), DeliveryError::Authentication(_));
    }

    #[test]
    fn transient_statuses() {
        for status in [408, 429, 500, 502, 503, 504] {
            let err = DeliveryError::from_response(status, "");
            assert!(err.is_retryable(), "{status} should be retryable");
        }
    }

    #[test]
    fn other_client_errors_are_permanent() {
        let body = r#"{"error":{"message":"Recipient phone number not in allowed list","code":131030}}"#;
        let err = DeliveryError::from_response(400, body);
        assert_matches!(err, DeliveryError::Permanent(_));
        assert!(!err.is_retryable());
        assert_eq!(
            err.reason(),
            "HTTP 400: Recipient phone number not in allowed list"
        );
    }

    #[test]
    fn throttling_code_on_400_is_transient() {
        let body = r#"{"error":{"message":"Rate limit hit","code":130429}}"#;
        assert!(DeliveryError::from_response(400, body).is_retryable());
    }

    #[test]
    fn display() {
        let err = DeliveryError::Transient("HTTP 503".into());
        assert_eq!(err.to_string(), "Transient delivery failure: HTTP 503");
    }
}
