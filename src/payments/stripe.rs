use std::time::Duration;

use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::config::StripeConfig;
use crate::error::{AppError, Result, msg};
use crate::plans::PlanCode;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a webhook timestamp before it's rejected (in seconds).
pub const WEBHOOK_TIMESTAMP_TOLERANCE_SECS: i64 = 300;

/// Allowed clock skew for timestamps from the future.
pub const WEBHOOK_FUTURE_SKEW_SECS: i64 = 60;

#[derive(Debug, Deserialize)]
struct CreateCheckoutSessionResponse {
    id: String,
    url: String,
}

/// Parameters for a one-off hosted checkout.
#[derive(Debug, Clone)]
pub struct CheckoutSessionRequest<'a> {
    pub plan: PlanCode,
    pub price_id: &'a str,
    pub customer_email: Option<&'a str>,
    pub tenant_id: &'a str,
    pub success_url: &'a str,
    pub cancel_url: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct StripeClient {
    client: Client,
    api_base: String,
    secret_key: String,
    webhook_secret: String,
}

impl StripeClient {
    pub fn new(config: &StripeConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_default(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
            webhook_secret: config.webhook_secret.clone(),
        }
    }

    /// Create a hosted checkout session for a pre-configured price.
    ///
    /// The plan is echoed into session metadata (`sku`, `product`, `plan`) so the
    /// completion webhook can resolve the tier without a second API call.
    pub async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest<'_>,
    ) -> Result<CheckoutSession> {
        let plan = request.plan.as_ref();
        let mut form: Vec<(&str, &str)> = vec![
            ("mode", "payment"),
            ("success_url", request.success_url),
            ("cancel_url", request.cancel_url),
            ("line_items[0][price]", request.price_id),
            ("line_items[0][quantity]", "1"),
            ("metadata[sku]", plan),
            ("metadata[product]", plan),
            ("metadata[plan]", plan),
            ("metadata[tenant_id]", request.tenant_id),
        ];
        if let Some(email) = request.customer_email {
            form.push(("customer_email", email));
        }

        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Internal(format!(
                "Stripe API error: {} - {}",
                status, error_text
            )));
        }

        let session: CreateCheckoutSessionResponse = response.json().await?;

        Ok(CheckoutSession {
            id: session.id,
            url: session.url,
        })
    }

    pub fn has_webhook_secret(&self) -> bool {
        !self.webhook_secret.is_empty()
    }

    pub fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> Result<bool> {
        verify_signature_at(
            &self.webhook_secret,
            payload,
            signature,
            chrono::Utc::now().timestamp(),
        )
    }
}

/// Verify a `Stripe-Signature` header (`t=<ts>,v1=<hex>[,v1=...]`) against `now`.
///
/// A malformed header is an error; a well-formed header that does not match, or
/// whose timestamp is outside the tolerance window, is `Ok(false)`.
pub fn verify_signature_at(
    secret: &str,
    payload: &[u8],
    signature: &str,
    now: i64,
) -> Result<bool> {
    let mut timestamp = None;
    let mut candidates = Vec::new();

    for part in signature.split(',') {
        let part = part.trim();
        if let Some(t) = part.strip_prefix("t=") {
            timestamp = Some(t);
        } else if let Some(s) = part.strip_prefix("v1=") {
            candidates.push(s);
        }
    }

    let timestamp_str =
        timestamp.ok_or_else(|| AppError::Signature(msg::INVALID_SIGNATURE_FORMAT.into()))?;
    if candidates.is_empty() {
        return Err(AppError::Signature(msg::INVALID_SIGNATURE_FORMAT.into()));
    }

    let timestamp: i64 = timestamp_str
        .parse()
        .map_err(|_| AppError::Signature(msg::INVALID_TIMESTAMP_IN_SIGNATURE.into()))?;

    let age = now - timestamp;
    if age > WEBHOOK_TIMESTAMP_TOLERANCE_SECS {
        tracing::warn!(
            age,
            max = WEBHOOK_TIMESTAMP_TOLERANCE_SECS,
            "Stripe webhook rejected: timestamp too old"
        );
        return Ok(false);
    }
    if age < -WEBHOOK_FUTURE_SKEW_SECS {
        tracing::warn!(age, "Stripe webhook rejected: timestamp in the future");
        return Ok(false);
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::Internal(msg::INVALID_WEBHOOK_SECRET.into()))?;
    mac.update(timestamp_str.as_bytes());
    mac.update(b".");
    mac.update(payload);
    let expected = hex::encode(mac.finalize().into_bytes());
    let expected_bytes = expected.as_bytes();

    // Signature length is not secret (always 64 hex chars)
    Ok(candidates.iter().any(|provided| {
        provided.len() == expected_bytes.len() && bool::from(expected_bytes.ct_eq(provided.as_bytes()))
    }))
}

/// Generic Stripe webhook event; `data.object` is parsed per `type`.
#[derive(Debug, Deserialize)]
pub struct StripeWebhookEvent {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

// ============ checkout.session.completed ============

/// Checkout session as delivered in the webhook. Everything is optional here;
/// required fields are enforced by the checkout parser.
#[derive(Debug, Default, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: Option<String>,
    pub payment_status: Option<String>,
    pub payment_intent: Option<String>,
    pub customer_email: Option<String>,
    pub customer_details: Option<StripeCustomerDetails>,
    /// Either a customer id string or an expanded customer object
    pub customer: Option<serde_json::Value>,
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    #[serde(default)]
    pub metadata: StripeMetadata,
}

impl StripeCheckoutSession {
    /// Sessions that completed without collecting money yet (async payment
    /// methods) report `unpaid` and are fulfilled later.
    pub fn is_paid(&self) -> bool {
        match self.payment_status.as_deref() {
            None => true,
            Some(status) => status == "paid" || status == "no_payment_required",
        }
    }

    /// Email of an expanded `customer` object, if present.
    pub fn expanded_customer_email(&self) -> Option<&str> {
        self.customer
            .as_ref()
            .and_then(|c| c.get("email"))
            .and_then(|e| e.as_str())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct StripeCustomerDetails {
    pub email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StripeMetadata {
    pub sku: Option<String>,
    pub product_sku: Option<String>,
    pub product: Option<String>,
    pub plan: Option<String>,
    pub tenant_id: Option<String>,
}
