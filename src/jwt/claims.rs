use serde::{Deserialize, Serialize};

use crate::models::License;
use crate::util::SECONDS_PER_DAY;

/// Token lifetime for term plans without a stored expiry.
pub const TERM_TOKEN_DAYS: i64 = 365;
/// Token lifetime for lifetime plans.
pub const LIFETIME_TOKEN_DAYS: i64 = 3650;

/// Custom claims; `iat` and `exp` are handled by jwt-simple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitlementClaims {
    /// License key
    pub k: String,
    pub plan: String,
    /// Enterprise-class plan
    pub admin: bool,
    /// Machine id the activation was bound to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mid: Option<String>,
    pub email: String,
}

impl EntitlementClaims {
    pub fn for_license(license: &License, machine_id: Option<&str>) -> Self {
        let plan = license.plan();
        Self {
            k: license.license_key.clone(),
            plan: plan.as_ref().to_string(),
            admin: plan.is_enterprise_class(),
            mid: machine_id
                .map(str::to_string)
                .or_else(|| license.machine_id.clone()),
            email: license.customer_email.clone(),
        }
    }
}

/// Unix time the token should stop being accepted.
pub fn token_expiry(license: &License, now: i64) -> i64 {
    if license.rights().lifetime {
        return now + LIFETIME_TOKEN_DAYS * SECONDS_PER_DAY;
    }
    license
        .expires_at
        .unwrap_or(now + TERM_TOKEN_DAYS * SECONDS_PER_DAY)
}
