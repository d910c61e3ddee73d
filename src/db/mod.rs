pub mod from_row;
pub mod queries;
mod schema;

pub use schema::init_db;

use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::{DownloadConfig, StripeConfig};
use crate::email::Mailer;
use crate::rate_limit::RateLimiter;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Shared state for every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    /// Public base URL, used for checkout redirect targets
    pub base_url: String,
    pub environment: String,
    pub version: String,
    pub stripe: StripeConfig,
    /// Enterprise plan purchasable through /api/checkout
    pub enterprise_enabled: bool,
    /// HS256 secret for activation tokens. No token is issued when unset.
    pub jwt_secret: Option<String>,
    /// Term length for non-lifetime plans. `None` = no expiry.
    pub license_term_days: Option<i32>,
    pub download: DownloadConfig,
    /// Recipient of webhook failure notifications
    pub email_alert_to: String,
    pub rate_limiter: Arc<RateLimiter>,
    pub mailer: Arc<dyn Mailer>,
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path);
    Pool::builder().max_size(10).build(manager)
}
