use axum::{extract::State, http::HeaderMap};
use serde::{Deserialize, Serialize};

use crate::db::{AppState, queries};
use crate::error::{AppError, OptionExt, Result, msg};
use crate::extractors::Json;
use crate::models::{License, LicenseStatus};
use crate::plans::PlanRights;
use crate::rate_limit::RateLimitScope;
use crate::util::{iso8601, iso8601_opt, now, required, validate_email_format};

/// Longest license key or machine id accepted before touching storage.
pub(crate) const MAX_FIELD_LEN: usize = 256;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    #[serde(alias = "license_key")]
    pub license_key: Option<String>,
    #[serde(alias = "machine_id")]
    pub machine_id: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RightsView {
    pub personal_use: bool,
    pub commercial_use: bool,
    pub business_use: bool,
    pub remote_assist_included: bool,
    pub dedicated_support: bool,
}

impl From<&PlanRights> for RightsView {
    fn from(rights: &PlanRights) -> Self {
        Self {
            personal_use: rights.personal_use,
            commercial_use: rights.commercial_use,
            business_use: rights.business_use,
            remote_assist_included: rights.remote_assist_included,
            dedicated_support: rights.dedicated_support,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineView {
    pub machine_id: Option<String>,
    pub last_verified_at: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub ok: bool,
    pub license_key: String,
    pub plan: String,
    pub plan_label: &'static str,
    pub plan_description: &'static str,
    pub lifetime: bool,
    pub activated_at: String,
    pub expires_at: Option<String>,
    pub rights: RightsView,
    pub machine: MachineView,
    // Fields kept for older desktop clients
    pub valid: bool,
    pub license_id: String,
    pub status: LicenseStatus,
    pub plan_code: String,
    pub plan_name: &'static str,
}

/// Reject missing or oversized fields before any lookup.
pub(crate) fn require_key(value: &Option<String>) -> Result<&str> {
    let key = required(value).ok_or_else(|| AppError::BadRequest(msg::MISSING_FIELDS.into()))?;
    if key.len() > MAX_FIELD_LEN {
        return Err(AppError::BadRequest(msg::INVALID_REQUEST.into()));
    }
    Ok(key)
}

pub(crate) fn optional_machine_id(value: &Option<String>) -> Result<Option<&str>> {
    match required(value) {
        Some(id) if id.len() > MAX_FIELD_LEN => {
            Err(AppError::BadRequest(msg::INVALID_REQUEST.into()))
        }
        other => Ok(other),
    }
}

/// Active and unexpired, or the matching 403.
pub(crate) fn ensure_usable(license: &License, now: i64) -> Result<()> {
    if !license.status.is_active() {
        tracing::debug!(license_id = %license.id, status = %license.status, "Inactive license");
        return Err(AppError::Forbidden(msg::LICENSE_INACTIVE.into()));
    }
    if license.is_expired(now) {
        tracing::debug!(license_id = %license.id, "Expired license");
        return Err(AppError::Forbidden(msg::LICENSE_EXPIRED.into()));
    }
    Ok(())
}

/// POST /api/verify-license
///
/// Read-only: verification never changes the stored license.
pub async fn verify_license(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>> {
    state.rate_limiter.enforce(&headers, RateLimitScope::Verify)?;

    let key = require_key(&req.license_key)?;
    let machine_id = optional_machine_id(&req.machine_id)?;
    let email = required(&req.email);
    if let Some(email) = email {
        validate_email_format(email)?;
    }

    let conn = state.db.get()?;
    let license = queries::get_license_by_key(&conn, key)?.or_not_found(msg::LICENSE_NOT_FOUND)?;

    // A wrong email is reported exactly like an unknown key
    if let Some(email) = email
        && !license.email_matches(email)
    {
        return Err(AppError::NotFound(msg::LICENSE_NOT_FOUND.into()));
    }

    let now = now();
    ensure_usable(&license, now)?;

    let rights = license.rights();
    tracing::info!(license_id = %license.id, plan = %rights.code, "License verified");

    Ok(Json(VerifyResponse {
        ok: true,
        license_key: license.license_key.clone(),
        plan: rights.code.as_ref().to_string(),
        plan_label: rights.label,
        plan_description: rights.description,
        lifetime: rights.lifetime,
        activated_at: iso8601(license.created_at),
        expires_at: iso8601_opt(license.expires_at),
        rights: RightsView::from(&rights),
        machine: MachineView {
            machine_id: machine_id
                .map(str::to_string)
                .or_else(|| license.machine_id.clone()),
            last_verified_at: iso8601(now),
        },
        valid: true,
        license_id: license.id,
        status: license.status,
        plan_code: license.plan_code,
        plan_name: rights.label,
    }))
}
