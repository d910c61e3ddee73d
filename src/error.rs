use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Machine-readable error codes returned in the `error` field.
///
/// The desktop client matches on these strings, so they are part of the wire contract.
pub mod msg {
    pub const MISSING_FIELDS: &str = "MISSING_FIELDS";
    pub const INVALID_REQUEST: &str = "INVALID_REQUEST";
    pub const INVALID_EMAIL: &str = "INVALID_EMAIL";
    pub const LICENSE_NOT_FOUND: &str = "LICENSE_NOT_FOUND";
    pub const LICENSE_INACTIVE: &str = "LICENSE_INACTIVE";
    pub const LICENSE_EXPIRED: &str = "LICENSE_EXPIRED";
    pub const NO_ACTIVE_LICENSE: &str = "NO_ACTIVE_LICENSE";
    pub const INVALID_PLAN: &str = "INVALID_PLAN";
    pub const PLAN_DISABLED: &str = "PLAN_DISABLED";
    pub const DOWNLOAD_UNAVAILABLE: &str = "DOWNLOAD_UNAVAILABLE";
    pub const INVALID_DOWNLOAD_TOKEN: &str = "INVALID_DOWNLOAD_TOKEN";
    pub const INVALID_SIGNATURE: &str = "INVALID_SIGNATURE";
    pub const INVALID_SIGNATURE_FORMAT: &str = "Invalid signature format";
    pub const INVALID_TIMESTAMP_IN_SIGNATURE: &str = "Invalid timestamp in signature";
    pub const INVALID_WEBHOOK_SECRET: &str = "Invalid webhook secret";
    pub const RATE_LIMITED: &str = "RATE_LIMITED";
    pub const SERVER_ERROR: &str = "SERVER_ERROR";
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Rate limited, retry after {retry_after}s")]
    RateLimited { retry_after: u64 },

    #[error("Signature error: {0}")]
    Signature(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse {
    ok: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidBody(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::InvalidBody(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::NotFound(code) => (StatusCode::NOT_FOUND, code.clone(), None),
            AppError::BadRequest(code) => (StatusCode::BAD_REQUEST, code.clone(), None),
            AppError::InvalidBody(reason) => (
                StatusCode::BAD_REQUEST,
                msg::INVALID_REQUEST.to_string(),
                Some(reason.clone()),
            ),
            AppError::Unauthorized(code) => (StatusCode::UNAUTHORIZED, code.clone(), None),
            AppError::Forbidden(code) => (StatusCode::FORBIDDEN, code.clone(), None),
            AppError::RateLimited { .. } => {
                (StatusCode::TOO_MANY_REQUESTS, msg::RATE_LIMITED.to_string(), None)
            }
            AppError::Signature(reason) => (
                StatusCode::BAD_REQUEST,
                msg::INVALID_SIGNATURE.to_string(),
                Some(reason.clone()),
            ),
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, msg::SERVER_ERROR.to_string(), None)
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, msg::SERVER_ERROR.to_string(), None)
            }
            AppError::Json(e) => {
                tracing::error!("JSON error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, msg::SERVER_ERROR.to_string(), None)
            }
            AppError::Http(e) => {
                tracing::error!("HTTP client error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, msg::SERVER_ERROR.to_string(), None)
            }
            AppError::Internal(reason) => {
                tracing::error!("Internal error: {}", reason);
                (StatusCode::INTERNAL_SERVER_ERROR, msg::SERVER_ERROR.to_string(), None)
            }
        };

        let retry_after = match &self {
            AppError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        };

        let body = ErrorResponse {
            ok: false,
            error,
            details,
            retry_after,
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

/// Converts `Option<T>` lookups into `NotFound` errors.
pub trait OptionExt<T> {
    fn or_not_found(self, code: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn or_not_found(self, code: &str) -> Result<T> {
        self.ok_or_else(|| AppError::NotFound(code.to_string()))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
