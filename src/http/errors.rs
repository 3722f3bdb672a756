use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use crate::admission::{AdmissionError, Profile};
use crate::matches::FieldIssue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    BadRequest,
    Forbidden,
    NotFound,
    Conflict,
    TooManyRequests,
    InternalServerError,
    ServiceUnavailable,
}

impl ErrorType {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorType::BadRequest => StatusCode::BAD_REQUEST,
            ErrorType::Forbidden => StatusCode::FORBIDDEN,
            ErrorType::NotFound => StatusCode::NOT_FOUND,
            ErrorType::Conflict => StatusCode::CONFLICT,
            ErrorType::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ErrorType::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorType::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn error_name(&self) -> &'static str {
        match self {
            ErrorType::BadRequest => "BadRequest",
            ErrorType::Forbidden => "Forbidden",
            ErrorType::NotFound => "NotFound",
            ErrorType::Conflict => "Conflict",
            ErrorType::TooManyRequests => "TooManyRequests",
            ErrorType::InternalServerError => "InternalServerError",
            ErrorType::ServiceUnavailable => "ServiceUnavailable",
        }
    }
}

/// HTTP-facing error, rendered as `{"error": message, "details"?: ...}`
#[derive(Debug, Clone)]
pub struct ApiError {
    pub message: String,
    pub kind: ErrorType,
    pub details: Option<Value>,
}

impl ApiError {
    pub fn new(kind: ErrorType, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorType::BadRequest, message)
    }

    /// 400 listing each offending field
    pub fn validation(message: impl Into<String>, issues: &[FieldIssue]) -> Self {
        Self::bad_request(message).with_details(json!(issues))
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorType::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorType::Conflict, message)
    }

    /// 500 with the cause logged, never echoed to the client
    pub fn internal(message: impl Into<String>, cause: &dyn fmt::Display) -> Self {
        let message = message.into();
        log::error!("{} {}", message, cause);
        Self::new(ErrorType::InternalServerError, message)
    }

    pub fn from_admission(err: &AdmissionError) -> Self {
        let kind = match err.status_code(Profile::Http) {
            StatusCode::TOO_MANY_REQUESTS => ErrorType::TooManyRequests,
            StatusCode::FORBIDDEN => ErrorType::Forbidden,
            _ => ErrorType::ServiceUnavailable,
        };
        Self::new(kind, err.public_message())
    }

    pub fn status_code(&self) -> StatusCode {
        self.kind.status_code()
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.error_name(), self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match self.details {
            Some(details) => json!({ "error": self.message, "details": details }),
            None => json!({ "error": self.message }),
        };
        (self.kind.status_code(), Json(body)).into_response()
    }
}
