//! Fixed-window rate limiting for public endpoints.
//!
//! Each `(scope, client)` pair owns one counter. Counters live in process memory,
//! so a horizontally scaled deployment gets one independent limiter per instance.
//!
//! Tiers:
//! - Verify: /api/verify-license
//! - General: /api/checkout, /api/licenses/validate
//! - Sensitive: /api/activate, /api/download/secure

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::http::HeaderMap;

use crate::config::{RateLimitConfig, WindowLimit};
use crate::error::{AppError, Result};

/// Identity used when a request carries no client address headers.
/// All such clients share one bucket.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Endpoint scope; each scope has its own counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitScope {
    Verify,
    Activate,
    Checkout,
    Validate,
    Download,
}

impl RateLimitScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitScope::Verify => "verify",
            RateLimitScope::Activate => "activate",
            RateLimitScope::Checkout => "checkout",
            RateLimitScope::Validate => "validate",
            RateLimitScope::Download => "download",
        }
    }

    fn limit(&self, config: &RateLimitConfig) -> WindowLimit {
        match self {
            RateLimitScope::Verify => config.verify,
            RateLimitScope::Checkout | RateLimitScope::Validate => config.general,
            RateLimitScope::Activate | RateLimitScope::Download => config.sensitive,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited { retry_after_secs: u64 },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed)
    }
}

#[derive(Debug)]
struct Bucket {
    count: u32,
    expires_at: Instant,
}

/// Mutex-guarded fixed-window counters, shared through `AppState`.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Mutex<HashMap<(RateLimitScope, String), Bucket>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn check(&self, identity: &str, scope: RateLimitScope) -> RateLimitDecision {
        self.check_at(identity, scope, Instant::now())
    }

    /// Same as [`check`](Self::check) with an explicit clock reading.
    pub fn check_at(&self, identity: &str, scope: RateLimitScope, now: Instant) -> RateLimitDecision {
        let limit = scope.limit(&self.config);
        if limit.is_disabled() {
            return RateLimitDecision::Allowed;
        }

        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        let bucket = buckets
            .entry((scope, identity.to_string()))
            .or_insert(Bucket {
                count: 0,
                expires_at: now,
            });

        if now >= bucket.expires_at {
            bucket.count = 1;
            bucket.expires_at = now + limit.window;
            return RateLimitDecision::Allowed;
        }

        if bucket.count >= limit.max_requests {
            return RateLimitDecision::Limited {
                retry_after_secs: ceil_secs(bucket.expires_at - now),
            };
        }

        bucket.count += 1;
        RateLimitDecision::Allowed
    }

    /// Check and convert a rejection into `AppError::RateLimited`.
    pub fn enforce(&self, headers: &HeaderMap, scope: RateLimitScope) -> Result<()> {
        let identity = client_identity(headers);
        match self.check(&identity, scope) {
            RateLimitDecision::Allowed => Ok(()),
            RateLimitDecision::Limited { retry_after_secs } => {
                tracing::warn!(
                    scope = scope.as_str(),
                    client = %identity,
                    retry_after_secs,
                    "Rate limit exceeded"
                );
                Err(AppError::RateLimited {
                    retry_after: retry_after_secs,
                })
            }
        }
    }

    /// Drop buckets whose window has elapsed. Returns how many were removed.
    pub fn prune_expired(&self) -> usize {
        self.prune_expired_at(Instant::now())
    }

    pub fn prune_expired_at(&self, now: Instant) -> usize {
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        let before = buckets.len();
        buckets.retain(|_, bucket| bucket.expires_at > now);
        before - buckets.len()
    }

    pub fn tracked_buckets(&self) -> usize {
        self.buckets.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

fn ceil_secs(remaining: Duration) -> u64 {
    let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
    secs.max(1)
}

/// Client identity for rate limiting.
///
/// First entry of `x-forwarded-for`, then `x-real-ip`, then [`UNKNOWN_CLIENT`].
pub fn client_identity(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    if let Some(client) = forwarded {
        return client.to_string();
    }

    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(UNKNOWN_CLIENT)
        .to_string()
}
