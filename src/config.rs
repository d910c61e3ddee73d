use std::collections::HashMap;
use std::env;
use std::time::Duration;

use strum::IntoEnumIterator;

use crate::plans::PlanCode;

const DEFAULT_STRIPE_API_BASE: &str = "https://api.stripe.com";

/// Fixed-window limit for one rate-limit tier. A zero max or window disables the tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowLimit {
    pub max_requests: u32,
    pub window: Duration,
}

impl WindowLimit {
    pub const fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.max_requests == 0 || self.window.is_zero()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// License verification (default 20 per minute)
    pub verify: WindowLimit,
    /// General API: checkout, validation (default 100 per 15 minutes)
    pub general: WindowLimit,
    /// Sensitive endpoints: activation, downloads (default 5 per 5 minutes)
    pub sensitive: WindowLimit,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            verify: WindowLimit::new(20, Duration::from_secs(60)),
            general: WindowLimit::new(100, Duration::from_secs(15 * 60)),
            sensitive: WindowLimit::new(5, Duration::from_secs(5 * 60)),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    /// Overridable for tests and mock servers
    pub api_base: String,
    pub price_ids: HashMap<PlanCode, String>,
    /// Static pre-generated payment links, used when session creation fails
    pub payment_links: HashMap<PlanCode, String>,
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub resend_api_key: Option<String>,
    pub from_email: String,
    pub from_name: String,
    pub reply_to: Option<String>,
    pub alert_to: String,
    pub sending_enabled: bool,
}

impl EmailConfig {
    /// `Name <address>` when a display name is configured.
    pub fn from_header(&self) -> String {
        if self.from_name.is_empty() {
            self.from_email.clone()
        } else {
            format!("{} <{}>", self.from_name, self.from_email)
        }
    }
}

#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub origin: String,
    pub credentials: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DownloadConfig {
    pub secret: Option<String>,
    pub file_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub base_url: String,
    pub environment: String,
    pub version: String,
    pub stripe: StripeConfig,
    pub email: EmailConfig,
    pub rate_limit: RateLimitConfig,
    pub cors: CorsConfig,
    pub csp_report_uri: Option<String>,
    pub enterprise_enabled: bool,
    pub jwt_secret: Option<String>,
    pub license_term_days: Option<i32>,
    pub download: DownloadConfig,
}

fn parse_bool(value: Option<String>, default: bool) -> bool {
    match value {
        Some(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        None => default,
    }
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn window_limit(max_var: &str, window_var: &str, default: WindowLimit) -> WindowLimit {
    let max_requests = non_empty(max_var)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default.max_requests);
    let window = non_empty(window_var)
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default.window);
    WindowLimit::new(max_requests, window)
}

fn plan_map(suffix: &str) -> HashMap<PlanCode, String> {
    PlanCode::iter()
        .filter_map(|plan| {
            non_empty(&format!("STRIPE_{}_{}", plan.env_key(), suffix)).map(|v| (plan, v))
        })
        .collect()
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let base_url = env::var("BASE_URL").unwrap_or_else(|_| format!("http://{}:{}", host, port));

        let from_email =
            non_empty("EMAIL_FROM").unwrap_or_else(|| "noreply@rescuepcrepairs.com".to_string());
        let alert_to = non_empty("EMAIL_ALERT_TO")
            .or_else(|| non_empty("EMAIL_FROM"))
            .unwrap_or_else(|| "admin@rescuepcrepairs.com".to_string());

        let defaults = RateLimitConfig::default();

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "rescuepc_licensing.db".to_string()),
            base_url,
            environment: env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            version: env::var("APP_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            stripe: StripeConfig {
                secret_key: env::var("STRIPE_SECRET_KEY").unwrap_or_default(),
                webhook_secret: env::var("STRIPE_WEBHOOK_SECRET").unwrap_or_default(),
                api_base: non_empty("STRIPE_API_BASE")
                    .unwrap_or_else(|| DEFAULT_STRIPE_API_BASE.to_string()),
                price_ids: plan_map("PRICE_ID"),
                payment_links: plan_map("LICENSE_URL"),
            },
            email: EmailConfig {
                resend_api_key: non_empty("RESEND_API_KEY"),
                from_email,
                from_name: env::var("EMAIL_FROM_NAME")
                    .unwrap_or_else(|_| "RescuePC Toolkit".to_string()),
                reply_to: non_empty("EMAIL_REPLY_TO"),
                alert_to,
                sending_enabled: parse_bool(env::var("EMAIL_SENDING_ENABLED").ok(), true),
            },
            rate_limit: RateLimitConfig {
                verify: window_limit(
                    "VERIFY_RATE_LIMIT_MAX_REQUESTS",
                    "VERIFY_RATE_LIMIT_WINDOW_MS",
                    defaults.verify,
                ),
                general: window_limit(
                    "RATE_LIMIT_MAX_REQUESTS",
                    "RATE_LIMIT_WINDOW_MS",
                    defaults.general,
                ),
                sensitive: window_limit(
                    "SENSITIVE_RATE_LIMIT_MAX_REQUESTS",
                    "SENSITIVE_RATE_LIMIT_WINDOW_MS",
                    defaults.sensitive,
                ),
            },
            cors: CorsConfig {
                origin: non_empty("CORS_ORIGIN").unwrap_or_else(|| "*".to_string()),
                credentials: parse_bool(env::var("CORS_CREDENTIALS").ok(), false),
            },
            csp_report_uri: non_empty("CSP_REPORT_URI"),
            enterprise_enabled: parse_bool(env::var("FEATURE_ENTERPRISE_ENABLED").ok(), true),
            jwt_secret: non_empty("JWT_SECRET"),
            license_term_days: non_empty("LICENSE_TERM_DAYS")
                .and_then(|v| v.parse().ok())
                .filter(|days: &i32| *days > 0),
            download: DownloadConfig {
                secret: non_empty("DOWNLOAD_SECRET"),
                file_path: non_empty("DOWNLOAD_FILE_PATH"),
            },
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
