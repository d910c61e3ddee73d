use jwt_simple::prelude::*;

use crate::error::{AppError, Result};
use crate::models::License;

use super::{EntitlementClaims, token_expiry};

/// Sign an entitlement token for an activated license.
pub fn sign_entitlement(
    secret: &str,
    license: &License,
    machine_id: Option<&str>,
    now: i64,
) -> Result<String> {
    let key = HS256Key::from_bytes(secret.as_bytes());
    let lifetime_secs = (token_expiry(license, now) - now).max(1) as u64;

    let claims = Claims::with_custom_claims(
        EntitlementClaims::for_license(license, machine_id),
        Duration::from_secs(lifetime_secs),
    );

    key.authenticate(claims)
        .map_err(|e| AppError::Internal(format!("Failed to sign token: {}", e)))
}

pub fn verify_entitlement(secret: &str, token: &str) -> Result<JWTClaims<EntitlementClaims>> {
    let key = HS256Key::from_bytes(secret.as_bytes());
    key.verify_token::<EntitlementClaims>(token, None)
        .map_err(|e| AppError::Unauthorized(format!("Invalid token: {}", e)))
}
