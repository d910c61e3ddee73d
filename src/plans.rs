//! Plan codes and the static rights table.
//!
//! Rights are never persisted; every request recomputes them from the plan code
//! stored on the license row.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    AsRefStr,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
#[strum(serialize_all = "SCREAMING-KEBAB-CASE", ascii_case_insensitive)]
pub enum PlanCode {
    Basic,
    Pro,
    Enterprise,
    Lifetime,
    Government,
    EnterprisePackage,
}

/// A single capability flag, used by [`has_right`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Right {
    PersonalUse,
    CommercialUse,
    BusinessUse,
    RemoteAssist,
    DedicatedSupport,
    Lifetime,
}

/// Usage permissions bundled with a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanRights {
    pub code: PlanCode,
    pub label: &'static str,
    pub description: &'static str,
    pub personal_use: bool,
    pub commercial_use: bool,
    pub business_use: bool,
    pub remote_assist_included: bool,
    pub dedicated_support: bool,
    pub lifetime: bool,
    pub max_devices: u32,
}

impl PlanCode {
    /// Parse a stored plan code, falling back to `Basic` for anything unrecognized.
    pub fn parse_or_basic(code: &str) -> Self {
        code.trim().parse().unwrap_or(PlanCode::Basic)
    }

    pub fn rights(self) -> PlanRights {
        match self {
            PlanCode::Basic => PlanRights {
                code: self,
                label: "Basic",
                description: "Home and personal use on one PC.",
                personal_use: true,
                commercial_use: false,
                business_use: false,
                remote_assist_included: false,
                dedicated_support: false,
                lifetime: false,
                max_devices: 1,
            },
            PlanCode::Pro => PlanRights {
                code: self,
                label: "Professional",
                description: "Use in paid repair work and client PCs.",
                personal_use: true,
                commercial_use: true,
                business_use: false,
                remote_assist_included: false,
                dedicated_support: false,
                lifetime: false,
                max_devices: 1,
            },
            PlanCode::Enterprise => PlanRights {
                code: self,
                label: "Enterprise",
                description: "Business environments and managed fleets.",
                personal_use: true,
                commercial_use: true,
                business_use: true,
                remote_assist_included: true,
                dedicated_support: true,
                lifetime: false,
                max_devices: 1,
            },
            PlanCode::Lifetime => PlanRights {
                code: self,
                label: "Lifetime",
                description: "Lifetime license on one machine.",
                personal_use: true,
                commercial_use: true,
                business_use: false,
                remote_assist_included: false,
                dedicated_support: false,
                lifetime: true,
                max_devices: 1,
            },
            PlanCode::Government => PlanRights {
                code: self,
                label: "Government",
                description: "Government and educational institutions.",
                personal_use: true,
                commercial_use: true,
                business_use: true,
                remote_assist_included: true,
                dedicated_support: true,
                lifetime: false,
                max_devices: 1,
            },
            PlanCode::EnterprisePackage => PlanRights {
                code: self,
                label: "Enterprise Package",
                description: "Enterprise license with additional benefits.",
                personal_use: true,
                commercial_use: true,
                business_use: true,
                remote_assist_included: true,
                dedicated_support: true,
                lifetime: false,
                max_devices: 1,
            },
        }
    }

    /// Environment-variable fragment, e.g. `ENTERPRISE_PACKAGE`.
    pub fn env_key(self) -> String {
        self.as_ref().replace('-', "_")
    }

    /// Enterprise-class plans get the admin flag in activation tokens.
    pub fn is_enterprise_class(self) -> bool {
        matches!(
            self,
            PlanCode::Enterprise | PlanCode::EnterprisePackage | PlanCode::Government
        )
    }
}

/// Resolve a plan code string to its rights. Unknown codes resolve to BASIC.
pub fn resolve(code: &str) -> PlanRights {
    PlanCode::parse_or_basic(code).rights()
}

/// Human-readable plan name for a code.
pub fn plan_name(code: &str) -> &'static str {
    resolve(code).label
}

pub fn has_right(code: &str, right: Right) -> bool {
    let rights = resolve(code);
    match right {
        Right::PersonalUse => rights.personal_use,
        Right::CommercialUse => rights.commercial_use,
        Right::BusinessUse => rights.business_use,
        Right::RemoteAssist => rights.remote_assist_included,
        Right::DedicatedSupport => rights.dedicated_support,
        Right::Lifetime => rights.lifetime,
    }
}

/// Substring probe order: longer codes first so `ENTERPRISE-PACKAGE` wins over `ENTERPRISE`.
const SUBSTRING_ORDER: [PlanCode; 6] = [
    PlanCode::EnterprisePackage,
    PlanCode::Enterprise,
    PlanCode::Government,
    PlanCode::Lifetime,
    PlanCode::Pro,
    PlanCode::Basic,
];

/// Map a storefront SKU to a plan tier.
///
/// Case-insensitive. Exact matches on the code or label win, then substring
/// containment, then the default tier `Basic`. Underscores and spaces are treated
/// like dashes so `RESCUEPC_ENTERPRISE_PACKAGE` maps as expected.
pub fn tier_from_sku(sku: &str) -> PlanCode {
    let normalized = sku.trim().to_ascii_uppercase().replace(['_', ' '], "-");
    if normalized.is_empty() {
        return PlanCode::Basic;
    }

    if let Some(exact) = PlanCode::iter().find(|code| {
        normalized == code.as_ref()
            || normalized == code.rights().label.to_ascii_uppercase().replace(' ', "-")
    }) {
        return exact;
    }

    SUBSTRING_ORDER
        .into_iter()
        .find(|code| normalized.contains(code.as_ref()))
        .unwrap_or(PlanCode::Basic)
}
