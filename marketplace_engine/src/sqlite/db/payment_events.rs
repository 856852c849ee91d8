//! Processed payment event records. Provider webhooks are delivered at-least-once, so the event
//! id acts as an idempotency key: the first insert wins and replays are dropped.

use log::trace;
use sqlx::SqliteConnection;

use crate::db_types::PaymentEvent;

/// Records a payment event id. Returns `true` if the event is new, `false` if it was seen before.
pub async fn idempotent_insert(
    event_id: &str,
    event_type: &str,
    payload: &str,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("INSERT OR IGNORE INTO payment_events (id, event_type, payload) VALUES ($1, $2, $3)")
        .bind(event_id)
        .bind(event_type)
        .bind(payload)
        .execute(conn)
        .await?;
    let is_new = result.rows_affected() > 0;
    if !is_new {
        trace!("🗃️ Payment event [{event_id}] has already been recorded");
    }
    Ok(is_new)
}

pub async fn mark_processed(event_id: &str, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE payment_events SET processed = 1 WHERE id = $1")
        .bind(event_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn fetch_event(event_id: &str, conn: &mut SqliteConnection) -> Result<Option<PaymentEvent>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM payment_events WHERE id = $1").bind(event_id).fetch_optional(conn).await
}
