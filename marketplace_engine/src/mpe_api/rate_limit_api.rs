use chrono::Duration;
use log::*;

use crate::traits::{RateLimitError, RateLimitStore};

/// Expiry-window rate limiting. The middleware in the server crate calls [`check`] before a
/// handler runs and [`record`] when the hit should count against the window.
///
/// [`check`]: RateLimitApi::check
/// [`record`]: RateLimitApi::record
#[derive(Debug, Clone)]
pub struct RateLimitApi<B> {
    db: B,
}

impl<B> RateLimitApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B: RateLimitStore> RateLimitApi<B> {
    /// The live hit count for (ip, path); 0 when no window is open.
    pub async fn check(&self, ip: &str, path: &str) -> Result<i64, RateLimitError> {
        self.db.check_rate_limit(ip, path).await
    }

    /// Count a hit and extend the window. Returns the new count.
    pub async fn record(&self, ip: &str, path: &str, window: Duration) -> Result<i64, RateLimitError> {
        self.db.record_rate_limit(ip, path, window).await
    }

    /// True when the caller has reached the limit and the request must be rejected.
    pub async fn is_limited(&self, ip: &str, path: &str, limit: i64) -> Result<bool, RateLimitError> {
        let count = self.check(ip, path).await?;
        if count >= limit {
            debug!("🚫️ Rate limit hit for {ip} on {path}: {count}/{limit}");
        }
        Ok(count >= limit)
    }

    /// Drop expired windows. Run by the scheduler.
    pub async fn cleanup(&self) -> Result<u64, RateLimitError> {
        let removed = self.db.cleanup_rate_limits().await?;
        if removed > 0 {
            debug!("🚫️🕰️ Removed {removed} expired rate limit windows");
        }
        Ok(removed)
    }
}
