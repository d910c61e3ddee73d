use axum::{extract::State, http::HeaderMap};
use serde::{Deserialize, Serialize};

use crate::db::{AppState, queries};
use crate::error::{AppError, Result, msg};
use crate::extractors::Json;
use crate::models::LicenseStatus;
use crate::rate_limit::RateLimitScope;
use crate::util::{required, validate_email_format};

use super::verify::require_key;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateLicenseRequest {
    pub email: Option<String>,
    #[serde(alias = "license_key")]
    pub license_key: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateLicenseResponse {
    pub ok: bool,
    pub license_key: String,
    pub status: LicenseStatus,
    pub plan_code: String,
    pub plan_name: String,
    pub max_devices: i32,
}

/// POST /api/licenses/validate
///
/// Confirms that a key belongs to an email. Status is reported, not enforced.
pub async fn validate_license(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ValidateLicenseRequest>,
) -> Result<Json<ValidateLicenseResponse>> {
    state.rate_limiter.enforce(&headers, RateLimitScope::Validate)?;

    let email = required(&req.email).ok_or_else(|| AppError::BadRequest(msg::MISSING_FIELDS.into()))?;
    let key = require_key(&req.license_key)?;
    validate_email_format(email)?;

    let conn = state.db.get()?;
    let license = queries::get_license_by_key(&conn, key)?
        .filter(|l| l.email_matches(email))
        .ok_or_else(|| AppError::NotFound(msg::LICENSE_NOT_FOUND.into()))?;

    Ok(Json(ValidateLicenseResponse {
        ok: true,
        license_key: license.license_key,
        status: license.status,
        plan_code: license.plan_code,
        plan_name: license.plan_name,
        max_devices: license.max_devices,
    }))
}
