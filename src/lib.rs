//! RescuePC licensing service
//!
//! Issues license keys from Stripe checkout webhooks, emails them to buyers, and
//! serves the verification and activation endpoints used by the desktop client.

pub mod config;
pub mod db;
pub mod email;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod jwt;
pub mod license_key;
pub mod middleware;
pub mod models;
pub mod payments;
pub mod plans;
pub mod rate_limit;
pub mod util;
