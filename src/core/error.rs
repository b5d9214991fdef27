use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde::{Deserialize, Serialize};

/// Application-wide Result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Code + message pair reported by the tax authority (errors and observations)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityMessage {
    pub code: i64,
    pub message: String,
}

impl AuthorityMessage {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Main application error type
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    /// Malformed or missing request field; never sent upstream
    #[error("Validation error: {0}")]
    Validation(String),

    /// Signing material missing/invalid or login rejected by the authentication service
    #[error("Credential error: {0}")]
    Credential(String),

    /// Transport failure or malformed response from the tax authority
    #[error("Upstream error: {message}")]
    Upstream {
        message: String,
        raw: Option<String>,
    },

    /// Authorization reply lost and its registration could not be confirmed
    #[error("Unknown authorization outcome: {0}")]
    UnknownOutcome(String),

    /// The authority explicitly rejected the voucher
    #[error("Voucher rejected by the tax authority")]
    RejectedVoucher {
        errors: Vec<AuthorityMessage>,
        observations: Vec<AuthorityMessage>,
        raw: Option<String>,
    },

    /// Local write failure after the authority already issued the voucher
    #[error("Persistence error: {message}")]
    Persistence {
        message: String,
        cae: String,
        invoice_number: String,
    },

    /// Request conflicts with the current state of a resource
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unauthorized access
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Database operation errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable class name used in error bodies
    pub fn class(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::Credential(_) => "credential_error",
            AppError::Upstream { .. } => "upstream_error",
            AppError::UnknownOutcome(_) => "unknown_outcome",
            AppError::RejectedVoucher { .. } => "rejected_voucher",
            AppError::Persistence { .. } => "persistence_error",
            AppError::Conflict(_) => "conflict",
            AppError::NotFound(_) => "not_found",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::RateLimitExceeded(_) => "rate_limit_exceeded",
            AppError::Configuration(_) => "configuration_error",
            AppError::Database(_) => "database_error",
            AppError::Json(_) => "json_error",
            AppError::Internal(_) => "internal_error",
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();

        // Database details stay in the logs
        let message = match self {
            AppError::Database(_) => "Database operation failed".to_string(),
            AppError::RejectedVoucher { errors, .. } => errors
                .first()
                .map(|e| e.message.clone())
                .unwrap_or_else(|| self.to_string()),
            _ => self.to_string(),
        };

        let mut body = serde_json::json!({
            "success": false,
            "error": {
                "class": self.class(),
                "message": message,
                "code": status_code.as_u16(),
            }
        });

        match self {
            AppError::Upstream { raw, .. } => {
                body["rawResponse"] = serde_json::json!(raw);
            }
            AppError::RejectedVoucher {
                errors,
                observations,
                raw,
            } => {
                body["errors"] = serde_json::json!(errors);
                body["observations"] = serde_json::json!(observations);
                body["rawResponse"] = serde_json::json!(raw);
            }
            AppError::Persistence {
                cae,
                invoice_number,
                ..
            } => {
                body["cae"] = serde_json::json!(cae);
                body["invoiceNumber"] = serde_json::json!(invoice_number);
            }
            _ => {}
        }

        HttpResponse::build(status_code).json(body)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Credential(_) => StatusCode::BAD_GATEWAY,
            AppError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            AppError::UnknownOutcome(_) => StatusCode::BAD_GATEWAY,
            AppError::RejectedVoucher { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Persistence { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::RateLimitExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Json(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// Helper functions for common error scenarios
impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn credential(msg: impl Into<String>) -> Self {
        AppError::Credential(msg.into())
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        AppError::Upstream {
            message: msg.into(),
            raw: None,
        }
    }

    pub fn upstream_with_raw(msg: impl Into<String>, raw: impl Into<String>) -> Self {
        AppError::Upstream {
            message: msg.into(),
            raw: Some(raw.into()),
        }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        AppError::Conflict(msg.into())
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        AppError::NotFound(resource.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        AppError::Unauthorized(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }
}
