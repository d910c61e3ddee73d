//! License delivery and operator alert emails.
//!
//! Delivery goes through the Resend API. When sending is disabled or no API key
//! is configured the message is logged and skipped.

use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::EmailConfig;
use crate::error::{AppError, Result};
use crate::models::{DEFAULT_TENANT_ID, License, LicenseStatus};
use crate::plans::PlanCode;

/// Retry delays in seconds (exponential backoff: 1s, 4s, 16s)
const RETRY_DELAYS: &[u64] = &[1, 4, 16];

const RESEND_API_URL: &str = "https://api.resend.com/emails";

/// Per-request limit for one Resend call
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const PRODUCT_NAME: &str = "RescuePC Toolkit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailSendResult {
    Sent,
    /// Sending switched off by configuration
    Disabled,
    NoApiKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: Option<String>,
}

/// Outbound mail seam. Production uses [`EmailService`]; tests swap in a recorder.
pub trait Mailer: Send + Sync {
    fn deliver<'a>(&'a self, message: &'a EmailMessage) -> BoxFuture<'a, Result<EmailSendResult>>;
}

/// `$199.99 USD` style amount.
pub fn format_amount(amount_cents: i64, currency: &str) -> String {
    format!(
        "${}.{:02} {}",
        amount_cents / 100,
        (amount_cents % 100).abs(),
        currency.to_ascii_uppercase()
    )
}

/// The license delivery email sent after a successful purchase.
pub fn license_email(license: &License) -> EmailMessage {
    let amount = format_amount(license.amount_cents, &license.currency);
    let rights = license.rights();

    let text = format!(
        "Thank you for purchasing {product}!\n\nLicense key: {key}\nPlan: {plan}\nAmount: {amount}\n\nOpen {product}, choose Activate and paste the key above.\nKeep this email for your records.",
        product = PRODUCT_NAME,
        key = license.license_key,
        plan = rights.label,
        amount = amount,
    );
    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"></head>
<body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px;">
<h2 style="color: #333;">Thank you for purchasing {product}!</h2>
<p>Your license key:</p>
<div style="background: #f5f5f5; padding: 20px; border-radius: 8px; text-align: center;">
<code style="font-size: 22px; font-weight: bold; letter-spacing: 2px; color: #333;">{key}</code>
</div>
<p><strong>Plan:</strong> {plan} ({description})<br><strong>Amount:</strong> {amount}</p>
<p>Open {product}, choose <em>Activate</em> and paste the key above.</p>
<hr style="border: none; border-top: 1px solid #eee; margin: 30px 0;">
<p style="color: #999; font-size: 12px;">Keep this email for your records.</p>
</body>
</html>"#,
        product = PRODUCT_NAME,
        key = license.license_key,
        plan = rights.label,
        description = rights.description,
        amount = amount,
    );

    EmailMessage {
        to: license.customer_email.clone(),
        subject: "Your RescuePC License Key".to_string(),
        html,
        text: Some(text),
    }
}

/// A license email with a freshly generated key, for checking delivery setup.
pub fn sample_license_email(to: &str) -> EmailMessage {
    let now = crate::util::now();
    let plan = PlanCode::Pro;
    license_email(&License {
        id: "sample".to_string(),
        license_key: crate::license_key::generate(),
        customer_email: to.to_string(),
        status: LicenseStatus::Issued,
        product_sku: plan.as_ref().to_string(),
        plan_code: plan.as_ref().to_string(),
        plan_name: plan.rights().label.to_string(),
        amount_cents: 19999,
        currency: "usd".to_string(),
        max_devices: plan.rights().max_devices as i32,
        machine_id: None,
        tenant_id: DEFAULT_TENANT_ID.to_string(),
        stripe_event_id: None,
        payment_intent: None,
        checkout_session: None,
        error_detail: None,
        expires_at: None,
        issued_at: now,
        created_at: now,
        updated_at: now,
        last_verified_at: None,
    })
}

/// Alert for the operator when a webhook could not be processed.
pub fn error_notification(alert_to: &str, event_id: &str, error: &str) -> EmailMessage {
    EmailMessage {
        to: alert_to.to_string(),
        subject: "RescuePC License Generation Error".to_string(),
        html: format!(
            "<h2>License generation failed</h2><p><strong>Event:</strong> {}</p><pre>{}</pre>",
            event_id, error
        ),
        text: Some(format!(
            "License generation failed\n\nEvent: {}\nError: {}",
            event_id, error
        )),
    }
}

#[derive(Debug, Serialize)]
struct ResendEmailRequest<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    subject: &'a str,
    html: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ResendEmailResponse {
    #[allow(dead_code)]
    id: String,
}

#[derive(Clone)]
pub struct EmailService {
    api_key: Option<String>,
    from: String,
    reply_to: Option<String>,
    enabled: bool,
    http_client: Client,
}

impl EmailService {
    pub fn new(config: &EmailConfig) -> Self {
        Self {
            api_key: config.resend_api_key.clone(),
            from: config.from_header(),
            reply_to: config.reply_to.clone(),
            enabled: config.sending_enabled,
            http_client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }

    pub async fn send(&self, message: &EmailMessage) -> Result<EmailSendResult> {
        if !self.enabled {
            tracing::info!(to = %message.to, subject = %message.subject, "Email sending disabled, skipping");
            return Ok(EmailSendResult::Disabled);
        }

        let Some(api_key) = self.api_key.as_deref() else {
            tracing::warn!(to = %message.to, "No Resend API key configured, cannot send email");
            return Ok(EmailSendResult::NoApiKey);
        };

        let request = ResendEmailRequest {
            from: &self.from,
            to: vec![&message.to],
            subject: &message.subject,
            html: &message.html,
            text: message.text.as_deref(),
            reply_to: self.reply_to.as_deref(),
        };

        self.send_request_with_retry(api_key, &request, &message.to)
            .await
    }

    /// Retries network errors, 429 and 5xx. Other 4xx fail immediately.
    async fn send_request_with_retry(
        &self,
        api_key: &str,
        request: &ResendEmailRequest<'_>,
        to_email: &str,
    ) -> Result<EmailSendResult> {
        let mut last_error: Option<AppError> = None;

        for (attempt, delay_secs) in std::iter::once(&0u64).chain(RETRY_DELAYS).enumerate() {
            if *delay_secs > 0 {
                tracing::warn!(attempt, delay_secs, "Retrying email send after transient failure");
                tokio::time::sleep(Duration::from_secs(*delay_secs)).await;
            }

            match self.send_resend_request(api_key, request).await {
                Ok(()) => {
                    tracing::info!(attempt, to = %to_email, subject = %request.subject, "Email sent via Resend");
                    return Ok(EmailSendResult::Sent);
                }
                Err((error, true)) => last_error = Some(error),
                Err((error, false)) => return Err(error),
            }
        }

        tracing::error!(
            to = %to_email,
            attempts = RETRY_DELAYS.len() + 1,
            "Email send failed after all retries"
        );
        Err(last_error.unwrap_or_else(|| {
            AppError::Internal("Email service error: all retries exhausted".into())
        }))
    }

    /// One Resend call. The error side carries whether the failure is transient.
    async fn send_resend_request(
        &self,
        api_key: &str,
        request: &ResendEmailRequest<'_>,
    ) -> std::result::Result<(), (AppError, bool)> {
        let response = self
            .http_client
            .post(RESEND_API_URL)
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to send request to Resend API");
                (AppError::Http(e), true)
            })?;

        let status = response.status();
        if status.is_success() {
            response.json::<ResendEmailResponse>().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to parse Resend API response");
                (AppError::Internal("Email service response error".into()), false)
            })?;
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let is_transient = status.as_u16() == 429 || status.is_server_error();
        if is_transient {
            tracing::warn!(status = %status, body = %body, "Resend API returned transient error");
        } else {
            tracing::error!(status = %status, body = %body, "Resend API returned non-transient error");
        }

        Err((
            AppError::Internal(format!("Email service error: {} - {}", status, body)),
            is_transient,
        ))
    }
}

impl Mailer for EmailService {
    fn deliver<'a>(&'a self, message: &'a EmailMessage) -> BoxFuture<'a, Result<EmailSendResult>> {
        Box::pin(self.send(message))
    }
}
