use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};

use crate::db::AppState;
use crate::error::AppError;
use crate::models::DEFAULT_TENANT_ID;
use crate::payments::{StripeCheckoutSession, StripeClient, StripeWebhookEvent};

use super::common::{
    CheckoutData, MetadataError, WebhookEvent, WebhookProvider, WebhookResult, handle_webhook,
    rejected,
};

const DEFAULT_SKU: &str = "BASIC";

pub struct StripeWebhookProvider;

impl WebhookProvider for StripeWebhookProvider {
    fn provider_name(&self) -> &'static str {
        "stripe"
    }

    fn extract_signature(&self, headers: &HeaderMap) -> Result<String, WebhookResult> {
        headers
            .get("stripe-signature")
            .ok_or_else(|| rejected(StatusCode::BAD_REQUEST, "Missing stripe-signature header"))?
            .to_str()
            .map(|s| s.to_string())
            .map_err(|e| {
                tracing::debug!("Invalid UTF-8 in Stripe signature header: {}", e);
                rejected(StatusCode::BAD_REQUEST, "Invalid signature header")
            })
    }

    fn verify_signature(
        &self,
        state: &AppState,
        body: &Bytes,
        signature: &str,
    ) -> Result<bool, WebhookResult> {
        let client = StripeClient::new(&state.stripe);
        if !client.has_webhook_secret() {
            tracing::error!("STRIPE_WEBHOOK_SECRET is not configured, cannot verify webhook");
            return Err(rejected(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Webhook verification unavailable",
            ));
        }

        client.verify_webhook_signature(body, signature).map_err(|e| match e {
            AppError::Signature(reason) => {
                tracing::warn!(reason = %reason, "Malformed Stripe signature header");
                rejected(StatusCode::BAD_REQUEST, &reason)
            }
            other => {
                tracing::error!("Signature verification error: {}", other);
                rejected(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Signature verification failed",
                )
            }
        })
    }

    fn parse_event(&self, body: &Bytes) -> Result<WebhookEvent, WebhookResult> {
        let event: StripeWebhookEvent = serde_json::from_slice(body).map_err(|e| {
            tracing::error!("Failed to parse Stripe webhook: {}", e);
            rejected(StatusCode::BAD_REQUEST, "Invalid JSON")
        })?;

        match event.event_type.as_str() {
            "checkout.session.completed" => parse_checkout_completed(&event),
            other => {
                tracing::debug!(event_type = other, event_id = ?event.id, "Ignoring Stripe event");
                Ok(WebhookEvent::Ignored)
            }
        }
    }
}

fn parse_checkout_completed(event: &StripeWebhookEvent) -> Result<WebhookEvent, WebhookResult> {
    let session: StripeCheckoutSession = serde_json::from_value(event.data.object.clone())
        .map_err(|e| {
            tracing::error!("Failed to parse checkout session: {}", e);
            rejected(StatusCode::BAD_REQUEST, "Invalid checkout session")
        })?;

    if !session.is_paid() {
        tracing::info!(
            event_id = ?event.id,
            payment_status = ?session.payment_status,
            "Checkout completed without payment, ignoring"
        );
        return Ok(WebhookEvent::Ignored);
    }

    parse_checkout_session(event.id.as_deref(), &session)
        .map(WebhookEvent::CheckoutCompleted)
        .map_err(|e| {
            tracing::error!(event_id = ?event.id, error = %e, "Unusable checkout session");
            rejected(StatusCode::BAD_REQUEST, &e.to_string())
        })
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Normalize a checkout session into [`CheckoutData`].
///
/// Each field is taken from the first source that carries it:
/// - email: `customer_details.email`, `customer_email`, `customer.email`
/// - SKU: `metadata.sku`, `metadata.product_sku`, `metadata.product`, `metadata.plan`, else `BASIC`
/// - payment intent: `payment_intent`, else the session id
/// - tenant: `metadata.tenant_id`, else the default tenant
pub fn parse_checkout_session(
    event_id: Option<&str>,
    session: &StripeCheckoutSession,
) -> Result<CheckoutData, MetadataError> {
    let event_id = non_empty(event_id).ok_or(MetadataError::MissingField("id"))?;
    let session_id =
        non_empty(session.id.as_deref()).ok_or(MetadataError::MissingField("data.object.id"))?;

    let customer_email = non_empty(
        session
            .customer_details
            .as_ref()
            .and_then(|d| d.email.as_deref()),
    )
    .or_else(|| non_empty(session.customer_email.as_deref()))
    .or_else(|| non_empty(session.expanded_customer_email()))
    .map(str::to_string);

    let metadata = &session.metadata;
    let product_sku = [
        metadata.sku.as_deref(),
        metadata.product_sku.as_deref(),
        metadata.product.as_deref(),
        metadata.plan.as_deref(),
    ]
    .into_iter()
    .find_map(non_empty)
    .unwrap_or(DEFAULT_SKU)
    .to_string();

    let payment_intent = non_empty(session.payment_intent.as_deref())
        .unwrap_or(session_id)
        .to_string();

    Ok(CheckoutData {
        event_id: event_id.to_string(),
        session_id: session_id.to_string(),
        payment_intent,
        customer_email,
        product_sku,
        amount_cents: session.amount_total.unwrap_or(0),
        currency: non_empty(session.currency.as_deref())
            .unwrap_or("usd")
            .to_ascii_lowercase(),
        tenant_id: non_empty(metadata.tenant_id.as_deref())
            .unwrap_or(DEFAULT_TENANT_ID)
            .to_string(),
    })
}

/// POST /api/stripe/webhook
pub async fn handle_stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> WebhookResult {
    handle_webhook(&StripeWebhookProvider, &state, headers, body).await
}
