use axum::{extract::State, http::HeaderMap};
use serde::{Deserialize, Serialize};

use crate::db::{AppState, queries};
use crate::error::{AppError, OptionExt, Result, msg};
use crate::extractors::Json;
use crate::jwt;
use crate::models::{License, LicenseStatus};
use crate::rate_limit::RateLimitScope;
use crate::util::{iso8601, now};

use super::verify::{ensure_usable, optional_machine_id, require_key};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivateRequest {
    #[serde(alias = "license_key")]
    pub license_key: Option<String>,
    #[serde(alias = "machine_id")]
    pub machine_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivateResponse {
    pub ok: bool,
    pub license_key: String,
    pub status: LicenseStatus,
    /// The license had been activated before this call
    pub already_active: bool,
    pub activated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Freshly purchased (`issued`) licenses may be activated; anything else must
/// already be usable.
fn ensure_activatable(license: &License, now: i64) -> Result<()> {
    if license.status == LicenseStatus::Issued {
        if license.is_expired(now) {
            return Err(AppError::Forbidden(msg::LICENSE_EXPIRED.into()));
        }
        return Ok(());
    }
    ensure_usable(license, now)
}

/// POST /api/activate
///
/// Binds the license to `machineId` (replacing any previous device), stamps
/// the activation time and moves an `issued` license to `active`. Concurrent
/// activations are last-write-wins.
pub async fn activate_license(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ActivateRequest>,
) -> Result<Json<ActivateResponse>> {
    state.rate_limiter.enforce(&headers, RateLimitScope::Activate)?;

    let key = require_key(&req.license_key)?;
    let machine_id = optional_machine_id(&req.machine_id)?;

    let conn = state.db.get()?;
    let mut license =
        queries::get_license_by_key(&conn, key)?.or_not_found(msg::LICENSE_NOT_FOUND)?;
    ensure_activatable(&license, now())?;

    let already_active = license.last_verified_at.is_some();
    let activated_at = queries::record_activation(&conn, &license.id, machine_id)?;
    license.status = LicenseStatus::Active;
    license.last_verified_at = Some(activated_at);
    if let Some(id) = machine_id {
        license.machine_id = Some(id.to_string());
    }

    let token = match state.jwt_secret.as_deref() {
        Some(secret) => Some(jwt::sign_entitlement(secret, &license, machine_id, activated_at)?),
        None => None,
    };

    tracing::info!(
        license_id = %license.id,
        machine_id = ?license.machine_id,
        already_active,
        "License activated"
    );

    Ok(Json(ActivateResponse {
        ok: true,
        license_key: license.license_key,
        status: license.status,
        already_active,
        activated_at: iso8601(activated_at),
        token,
    }))
}
