use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use oneclick_core::error::CoreError;
use serde::Serialize;

/// Error type returned by every handler. Rendered as `{"error", "code"}`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Malformed input that is not a domain rule (bad query parameter, etc).
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The messaging API rejected a single-message send; the message row is failed.
    #[error("Delivery failed: {reason}")]
    DeliveryFailed { message_id: i64, reason: String },

    #[error("Internal error: {0}")]
    InternalError(String),
}

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
}

const INTERNAL_MESSAGE: &str = "An internal error occurred";

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        INTERNAL_MESSAGE.to_string(),
    )
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Core(core) => core_parts(core),
            AppError::Database(err) => database_parts(err),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::DeliveryFailed { message_id, reason } => (
                StatusCode::BAD_GATEWAY,
                "DELIVERY_FAILED",
                format!("Message {message_id} was not accepted: {reason}"),
            ),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                internal()
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, error) = self.parts();
        (status, Json(ErrorBody { error, code })).into_response()
    }
}

fn core_parts(err: &CoreError) -> (StatusCode, &'static str, String) {
    match err {
        CoreError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
        CoreError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
        CoreError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
        CoreError::InsufficientFunds { .. } => (
            StatusCode::PAYMENT_REQUIRED,
            "INSUFFICIENT_FUNDS",
            err.to_string(),
        ),
        CoreError::Internal(msg) => {
            tracing::error!(error = %msg, "Internal core error");
            internal()
        }
    }
}

/// Client-facing wording for constraints a request can trip.
fn constraint_message(constraint: &str) -> Option<&'static str> {
    Some(match constraint {
        "uq_message_templates_client_name_language" => {
            "A template with this name and language already exists"
        }
        "uq_meta_credentials_waba_id" => {
            "This WhatsApp Business Account is already linked to another client"
        }
        "campaigns_template_id_fkey" => {
            "Template is still used by a campaign"
        }
        _ => return None,
    })
}

/// `RowNotFound` is 404. Unique (`uq_*`) and foreign-key violations are 409.
/// Anything else is logged and sanitized to 500.
fn database_parts(err: &sqlx::Error) -> (StatusCode, &'static str, String) {
    let db_err = match err {
        sqlx::Error::RowNotFound => {
            return (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                "Resource not found".to_string(),
            )
        }
        sqlx::Error::Database(db_err) => db_err,
        other => {
            tracing::error!(error = %other, "Database error");
            return internal();
        }
    };

    let constraint = db_err.constraint().unwrap_or("unknown");
    let message = match db_err.code().as_deref() {
        Some("23505") if constraint.starts_with("uq_") => constraint_message(constraint)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Duplicate value violates unique constraint: {constraint}")),
        Some("23503") => constraint_message(constraint)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Resource is still referenced: {constraint}")),
        _ => {
            tracing::error!(error = %db_err, constraint, "Database error");
            return internal();
        }
    };

    (StatusCode::CONFLICT, "CONFLICT", message)
}
