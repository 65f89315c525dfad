use axum::http::StatusCode;
use axum::response::{ IntoResponse, Response };
use axum::Json;
use serde::{ Deserialize, Serialize };

use crate::chat::ChatError;

/// JSON body of every non-2xx response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable code, e.g. `rate_limited`.
    pub error: String,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    /// 400, the body could not be parsed at all.
    BadRequest(String),
    /// 422, the body parsed but a field is out of bounds.
    Validation(String),
    /// 404
    NotFound(String),
    /// 429
    RateLimited(String),
    /// 503, no provider is configured.
    ServiceUnavailable(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::RateLimited(msg) => (StatusCode::TOO_MANY_REQUESTS, "rate_limited", msg),
            ApiError::ServiceUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", msg)
            }
        };

        let body = ErrorBody {
            error: code.to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        let message = err.to_string();
        match err {
            ChatError::RateLimited { .. } => ApiError::RateLimited(message),
            ChatError::ServiceUnavailable => ApiError::ServiceUnavailable(message),
            ChatError::Validation(_) => ApiError::Validation(message),
            ChatError::NotFound(_) => ApiError::NotFound(message),
        }
    }
}
