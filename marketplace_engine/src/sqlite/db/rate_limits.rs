//! Fixed-window request counters keyed by (client ip, path prefix).

use chrono::{Duration, Utc};
use log::trace;
use sqlx::SqliteConnection;

use crate::traits::RateLimitError;

/// Returns the current hit count for the window, or zero if no window is open. Expired rows are
/// ignored rather than deleted; [`cleanup_rate_limits`] reaps them.
pub async fn check_rate_limit(
    ip_address: &str,
    path: &str,
    conn: &mut SqliteConnection,
) -> Result<i64, RateLimitError> {
    let count: Option<(i64,)> = sqlx::query_as(
        r#"
            SELECT hit_count FROM rate_limits
            WHERE ip_address = $1 AND path = $2 AND unixepoch(expires_at) >= unixepoch(CURRENT_TIMESTAMP)
        "#,
    )
    .bind(ip_address)
    .bind(path)
    .fetch_optional(conn)
    .await?;
    Ok(count.map(|(c,)| c).unwrap_or(0))
}

/// Records a hit against the window and returns the new count. An expired row restarts the window
/// at one instead of carrying the stale count over.
pub async fn record_rate_limit(
    ip_address: &str,
    path: &str,
    window: Duration,
    conn: &mut SqliteConnection,
) -> Result<i64, RateLimitError> {
    let expires_at = Utc::now() + window;
    let (hit_count,): (i64,) = sqlx::query_as(
        r#"
            INSERT INTO rate_limits (ip_address, path, hit_count, expires_at) VALUES ($1, $2, 1, $3)
            ON CONFLICT (ip_address, path) DO UPDATE SET
                hit_count = CASE
                    WHEN unixepoch(expires_at) < unixepoch(CURRENT_TIMESTAMP) THEN 1
                    ELSE hit_count + 1
                END,
                expires_at = excluded.expires_at
            RETURNING hit_count
        "#,
    )
    .bind(ip_address)
    .bind(path)
    .bind(expires_at)
    .fetch_one(conn)
    .await?;
    trace!("🚫️ {ip_address} has hit {path} {hit_count} times this window");
    Ok(hit_count)
}

pub async fn cleanup_rate_limits(conn: &mut SqliteConnection) -> Result<u64, RateLimitError> {
    let result =
        sqlx::query("DELETE FROM rate_limits WHERE unixepoch(expires_at) < unixepoch(CURRENT_TIMESTAMP)")
            .execute(conn)
            .await?;
    Ok(result.rows_affected())
}
