use axum::{extract::State, http::HeaderMap};
use serde::{Deserialize, Serialize};

use crate::db::AppState;
use crate::error::{AppError, Result, msg};
use crate::extractors::Json;
use crate::models::DEFAULT_TENANT_ID;
use crate::payments::{CheckoutSessionRequest, StripeClient};
use crate::plans::PlanCode;
use crate::rate_limit::RateLimitScope;
use crate::util::{required, validate_email_format};

/// Plans sold through the storefront checkout.
const CHECKOUT_PLANS: &[(&str, PlanCode)] = &[
    ("basic", PlanCode::Basic),
    ("pro", PlanCode::Pro),
    ("enterprise", PlanCode::Enterprise),
    ("lifetime", PlanCode::Lifetime),
];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub plan: Option<String>,
    pub customer_email: Option<String>,
    pub tenant_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub ok: bool,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// True when the static payment link was returned instead of a fresh session
    pub fallback: bool,
}

pub fn checkout_plan(name: &str) -> Option<PlanCode> {
    let name = name.trim();
    CHECKOUT_PLANS
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, plan)| *plan)
}

/// POST /api/checkout
pub async fn create_checkout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>> {
    state.rate_limiter.enforce(&headers, RateLimitScope::Checkout)?;

    let plan = required(&req.plan)
        .and_then(checkout_plan)
        .ok_or_else(|| AppError::BadRequest(msg::INVALID_PLAN.into()))?;
    if plan == PlanCode::Enterprise && !state.enterprise_enabled {
        return Err(AppError::Forbidden(msg::PLAN_DISABLED.into()));
    }

    let customer_email = required(&req.customer_email);
    if let Some(email) = customer_email {
        validate_email_format(email)?;
    }
    let tenant_id = required(&req.tenant_id).unwrap_or(DEFAULT_TENANT_ID);

    let price_id = state.stripe.price_ids.get(&plan);
    if let Some(price_id) = price_id
        && !state.stripe.secret_key.is_empty()
    {
        let base = state.base_url.trim_end_matches('/');
        let success_url = format!("{}/success?session_id={{CHECKOUT_SESSION_ID}}", base);
        let cancel_url = format!("{}/pricing", base);

        let client = StripeClient::new(&state.stripe);
        let request = CheckoutSessionRequest {
            plan,
            price_id,
            customer_email,
            tenant_id,
            success_url: &success_url,
            cancel_url: &cancel_url,
        };

        match client.create_checkout_session(&request).await {
            Ok(session) => {
                tracing::info!(plan = %plan, session_id = %session.id, "Checkout session created");
                return Ok(Json(CheckoutResponse {
                    ok: true,
                    url: session.url,
                    session_id: Some(session.id),
                    fallback: false,
                }));
            }
            Err(e) => {
                tracing::warn!(plan = %plan, error = %e, "Checkout session creation failed, trying payment link");
            }
        }
    } else {
        tracing::warn!(plan = %plan, "No Stripe price configured, trying payment link");
    }

    let link = state.stripe.payment_links.get(&plan).ok_or_else(|| {
        AppError::Internal(format!("no checkout session or payment link for plan {}", plan))
    })?;

    Ok(Json(CheckoutResponse {
        ok: true,
        url: link.clone(),
        session_id: None,
        fallback: true,
    }))
}
