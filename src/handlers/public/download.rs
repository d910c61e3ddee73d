use std::path::Path;

use axum::{
    extract::State,
    http::{HeaderMap, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::db::{AppState, queries};
use crate::error::{AppError, Result, msg};
use crate::extractors::Query;
use crate::rate_limit::RateLimitScope;
use crate::util::required;

const DEFAULT_FILE_NAME: &str = "RescuePC-Setup.exe";

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub token: Option<String>,
    pub email: Option<String>,
}

/// Download token for an email: `hex(sha256(email + secret))`.
pub fn download_token(email: &str, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(email.as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

fn token_matches(provided: &str, expected: &str) -> bool {
    provided.len() == expected.len() && bool::from(provided.as_bytes().ct_eq(expected.as_bytes()))
}

/// GET /api/download/secure?token=..&email=..
pub async fn secure_download(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<DownloadQuery>,
) -> Result<Response> {
    state.rate_limiter.enforce(&headers, RateLimitScope::Download)?;

    let (Some(token), Some(email)) = (required(&query.token), required(&query.email)) else {
        return Err(AppError::BadRequest(msg::MISSING_FIELDS.into()));
    };

    let (Some(secret), Some(file_path)) = (
        state.download.secret.as_deref(),
        state.download.file_path.as_deref(),
    ) else {
        return Err(AppError::NotFound(msg::DOWNLOAD_UNAVAILABLE.into()));
    };

    if !token_matches(&token.to_ascii_lowercase(), &download_token(email, secret)) {
        tracing::warn!(email = %email, "Rejected download token");
        return Err(AppError::Unauthorized(msg::INVALID_DOWNLOAD_TOKEN.into()));
    }

    {
        let conn = state.db.get()?;
        if queries::find_active_license_by_email(&conn, email)?.is_none() {
            return Err(AppError::Forbidden(msg::NO_ACTIVE_LICENSE.into()));
        }
    }

    let bytes = match tokio::fs::read(file_path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::error!(path = %file_path, "Download file missing");
            return Err(AppError::NotFound(msg::DOWNLOAD_UNAVAILABLE.into()));
        }
        Err(e) => return Err(AppError::Internal(format!("failed to read {}: {}", file_path, e))),
    };

    let file_name = Path::new(file_path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_FILE_NAME);

    tracing::info!(email = %email, bytes = bytes.len(), "Serving secure download");

    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        bytes,
    )
        .into_response())
}
