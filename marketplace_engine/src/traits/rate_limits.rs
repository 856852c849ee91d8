use chrono::Duration;
use thiserror::Error;

/// Expiry-window rate limit counters keyed on (ip, path).
///
/// `record` serializes concurrent hits for the same key on the storage's unique-index row lock,
/// so counts never go missing under load.
#[allow(async_fn_in_trait)]
pub trait RateLimitStore: Clone {
    /// The current hit count for the key, or 0 when there is no live window. Non-mutating.
    async fn check_rate_limit(&self, ip: &str, path: &str) -> Result<i64, RateLimitError>;

    /// Registers a hit and pushes the window out to `now + window`. A hit on an expired window
    /// starts over at 1. Returns the new count.
    async fn record_rate_limit(&self, ip: &str, path: &str, window: Duration) -> Result<i64, RateLimitError>;

    /// Deletes expired windows. Returns the number of rows removed.
    async fn cleanup_rate_limits(&self) -> Result<u64, RateLimitError>;
}

#[derive(Debug, Clone, Error)]
pub enum RateLimitError {
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for RateLimitError {
    fn from(e: sqlx::Error) -> Self {
        RateLimitError::DatabaseError(e.to_string())
    }
}
