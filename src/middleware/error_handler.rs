use actix_web::{
    error::{JsonPayloadError, PathError, QueryPayloadError},
    HttpRequest,
};

use crate::core::AppError;

/// Malformed JSON bodies become validation errors with the standard error body
pub fn json_error_handler(err: JsonPayloadError, req: &HttpRequest) -> actix_web::Error {
    log_rejected(req, &err);
    let message = match &err {
        JsonPayloadError::ContentType => "Content type must be application/json".to_string(),
        JsonPayloadError::Deserialize(e) => format!("Invalid request body: {}", e),
        other => format!("Invalid request body: {}", other),
    };
    AppError::Validation(message).into()
}

pub fn query_error_handler(err: QueryPayloadError, req: &HttpRequest) -> actix_web::Error {
    log_rejected(req, &err);
    AppError::Validation(format!("Invalid query string: {}", err)).into()
}

pub fn path_error_handler(err: PathError, req: &HttpRequest) -> actix_web::Error {
    log_rejected(req, &err);
    AppError::Validation(format!("Invalid path parameter: {}", err)).into()
}

fn log_rejected(req: &HttpRequest, err: &dyn std::fmt::Display) {
    tracing::debug!(
        method = %req.method(),
        path = %req.path(),
        error = %err,
        "Rejected malformed request"
    );
}
