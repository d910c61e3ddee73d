use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::plans::{PlanCode, PlanRights};

/// Tenant assigned when the checkout carries no tenant metadata.
pub const DEFAULT_TENANT_ID: &str = "RESCUEPC_MAIN";

/// Placeholder stored when the payment event had no customer email.
pub const UNKNOWN_EMAIL: &str = "unknown@unknown";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LicenseStatus {
    /// Created from a payment, not yet usable
    Issued,
    /// Usable by verification and activation
    Active,
    Duplicate,
    /// Placeholder row recording a failed webhook
    Error,
    Revoked,
}

impl LicenseStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, LicenseStatus::Active)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct License {
    pub id: String,
    pub license_key: String,
    pub customer_email: String,
    pub status: LicenseStatus,
    pub product_sku: String,
    pub plan_code: String,
    pub plan_name: String,
    pub amount_cents: i64,
    pub currency: String,
    pub max_devices: i32,
    /// Most recently bound device (single slot)
    pub machine_id: Option<String>,
    pub tenant_id: String,
    pub stripe_event_id: Option<String>,
    pub payment_intent: Option<String>,
    pub checkout_session: Option<String>,
    /// Failure description for `error` rows
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    pub expires_at: Option<i64>,
    pub issued_at: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_verified_at: Option<i64>,
}

impl License {
    pub fn plan(&self) -> PlanCode {
        PlanCode::parse_or_basic(&self.plan_code)
    }

    pub fn rights(&self) -> PlanRights {
        self.plan().rights()
    }

    /// Expired when an expiry is set and has passed. Lifetime plans never expire.
    pub fn is_expired(&self, now: i64) -> bool {
        !self.rights().lifetime && self.expires_at.is_some_and(|exp| exp <= now)
    }

    /// Usable = active and not expired.
    pub fn is_usable(&self, now: i64) -> bool {
        self.status.is_active() && !self.is_expired(now)
    }

    /// Case-insensitive comparison against the purchase email.
    pub fn email_matches(&self, email: &str) -> bool {
        self.customer_email.eq_ignore_ascii_case(email.trim())
    }
}

/// Input for a license issued from a completed checkout.
#[derive(Debug, Clone)]
pub struct NewLicense {
    pub license_key: String,
    pub customer_email: String,
    pub product_sku: String,
    pub plan: PlanCode,
    pub amount_cents: i64,
    pub currency: String,
    pub tenant_id: String,
    pub stripe_event_id: String,
    pub payment_intent: String,
    pub checkout_session: String,
    pub expires_at: Option<i64>,
}
