//! Provider-agnostic webhook processing: signature check, event dispatch and
//! idempotent license issuance.

use axum::{
    Json,
    body::Bytes,
    http::{HeaderMap, StatusCode},
};
use serde::Serialize;
use thiserror::Error;

use crate::db::{AppState, queries};
use crate::db::queries::IssueOutcome;
use crate::email::{self, EmailSendResult};
use crate::license_key;
use crate::models::{License, NewLicense, UNKNOWN_EMAIL};
use crate::plans::tier_from_sku;
use crate::util::{LicenseExpirations, now};

/// Result type for webhook operations.
pub type WebhookResult = (StatusCode, Json<WebhookReply>);

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WebhookReply {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn acknowledged() -> WebhookResult {
    (
        StatusCode::OK,
        Json(WebhookReply {
            ok: true,
            ..Default::default()
        }),
    )
}

pub fn rejected(status: StatusCode, error: &str) -> WebhookResult {
    (
        status,
        Json(WebhookReply {
            ok: false,
            error: Some(error.to_string()),
            ..Default::default()
        }),
    )
}

/// Normalized data from a completed checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutData {
    pub event_id: String,
    pub session_id: String,
    /// Falls back to the session id when the provider sent none
    pub payment_intent: String,
    pub customer_email: Option<String>,
    pub product_sku: String,
    pub amount_cents: i64,
    /// Lowercase ISO code
    pub currency: String,
    pub tenant_id: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MetadataError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

#[derive(Debug)]
pub enum WebhookEvent {
    CheckoutCompleted(CheckoutData),
    /// Acknowledged without side effects
    Ignored,
}

pub trait WebhookProvider: Send + Sync {
    /// Provider name for logging
    fn provider_name(&self) -> &'static str;

    fn extract_signature(&self, headers: &HeaderMap) -> Result<String, WebhookResult>;

    fn verify_signature(
        &self,
        state: &AppState,
        body: &Bytes,
        signature: &str,
    ) -> Result<bool, WebhookResult>;

    fn parse_event(&self, body: &Bytes) -> Result<WebhookEvent, WebhookResult>;
}

/// Verify, parse and dispatch one webhook delivery.
///
/// The signature is checked before the body is parsed, so unsigned payloads
/// never reach the JSON parser.
pub async fn handle_webhook<P: WebhookProvider>(
    provider: &P,
    state: &AppState,
    headers: HeaderMap,
    body: Bytes,
) -> WebhookResult {
    let signature = match provider.extract_signature(&headers) {
        Ok(s) => s,
        Err(e) => return e,
    };

    match provider.verify_signature(state, &body, &signature) {
        Ok(true) => {}
        Ok(false) => {
            tracing::warn!(provider = provider.provider_name(), "Webhook signature mismatch");
            return rejected(StatusCode::BAD_REQUEST, "Signature verification failed");
        }
        Err(e) => return e,
    }

    let event = match provider.parse_event(&body) {
        Ok(e) => e,
        Err(e) => return e,
    };

    match event {
        WebhookEvent::CheckoutCompleted(data) => handle_checkout(state, data).await,
        WebhookEvent::Ignored => acknowledged(),
    }
}

/// Issue (or recognize as duplicate) the license for a completed checkout.
///
/// The license email goes out only after the row is committed, on a background
/// task, so the provider gets its reply without waiting on mail retries. A failed
/// send is logged and never undoes the license.
pub async fn handle_checkout(state: &AppState, data: CheckoutData) -> WebhookResult {
    let outcome = match issue_license(state, &data) {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(event_id = %data.event_id, error = %e, "License issuance failed");
            record_failure(state, &data.event_id, &e.to_string());
            return rejected(StatusCode::INTERNAL_SERVER_ERROR, "License generation failed");
        }
    };

    match outcome {
        IssueOutcome::Issued(license) => {
            tracing::info!(
                event_id = %data.event_id,
                license_id = %license.id,
                plan = %license.plan_code,
                "License issued"
            );
            if data.customer_email.is_some() {
                send_license_email(state, &license);
            } else {
                tracing::warn!(license_id = %license.id, "Checkout had no email, license email not sent");
            }
            (
                StatusCode::OK,
                Json(WebhookReply {
                    ok: true,
                    license_id: Some(license.id),
                    license_key: Some(license.license_key),
                    ..Default::default()
                }),
            )
        }
        IssueOutcome::Duplicate(existing) => {
            tracing::info!(
                event_id = %data.event_id,
                license_id = %existing.id,
                "Duplicate payment event, no new license"
            );
            (
                StatusCode::OK,
                Json(WebhookReply {
                    ok: true,
                    duplicate: Some(true),
                    ..Default::default()
                }),
            )
        }
    }
}

fn issue_license(state: &AppState, data: &CheckoutData) -> crate::error::Result<IssueOutcome> {
    let plan = tier_from_sku(&data.product_sku);
    let expires_at =
        LicenseExpirations::from_days(state.license_term_days, plan.rights().lifetime, now())
            .license_exp;

    let input = NewLicense {
        license_key: license_key::generate(),
        customer_email: data
            .customer_email
            .clone()
            .unwrap_or_else(|| UNKNOWN_EMAIL.to_string()),
        product_sku: data.product_sku.clone(),
        plan,
        amount_cents: data.amount_cents,
        currency: data.currency.clone(),
        tenant_id: data.tenant_id.clone(),
        stripe_event_id: data.event_id.clone(),
        payment_intent: data.payment_intent.clone(),
        checkout_session: data.session_id.clone(),
        expires_at,
    };

    let mut conn = state.db.get()?;
    queries::issue_license_atomic(&mut conn, input)
}

fn send_license_email(state: &AppState, license: &License) {
    let mailer = state.mailer.clone();
    let message = email::license_email(license);
    let license_id = license.id.clone();

    tokio::spawn(async move {
        match mailer.deliver(&message).await {
            Ok(EmailSendResult::Sent) => {}
            Ok(result) => {
                tracing::warn!(license_id = %license_id, ?result, "License email not delivered")
            }
            Err(e) => {
                tracing::error!(license_id = %license_id, error = %e, "Failed to send license email")
            }
        }
    });
}

/// Best effort: store an `error` row and alert the operator. Failures here are
/// only logged so the original error still reaches the provider as a 500.
fn record_failure(state: &AppState, event_id: &str, error: &str) {
    match state.db.get() {
        Ok(conn) => {
            if let Err(e) = queries::create_error_license(&conn, event_id, error) {
                tracing::error!(event_id = %event_id, error = %e, "Failed to record error license");
            }
        }
        Err(e) => tracing::error!(event_id = %event_id, error = %e, "No connection to record error license"),
    }

    let mailer = state.mailer.clone();
    let message = email::error_notification(&state.email_alert_to, event_id, error);
    let event_id = event_id.to_string();
    tokio::spawn(async move {
        if let Err(e) = mailer.deliver(&message).await {
            tracing::error!(event_id = %event_id, error = %e, "Failed to send error notification");
        }
    });
}
