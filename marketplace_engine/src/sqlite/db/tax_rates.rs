//! Local tax rate table for the estimate path. Rates are keyed on (country, state, tax_code)
//! with NULL acting as a wildcard; lookups prefer the most specific match.

use log::debug;
use sqlx::SqliteConnection;

use crate::db_types::TaxRate;

/// Fetches the most specific rate for the key. A `(country, state, tax_code)` lookup falls back
/// to `(country, state, NULL)` and then `(country, NULL, NULL)` before giving up.
pub async fn fetch_tax_rate(
    country: &str,
    state: Option<&str>,
    tax_code: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<Option<TaxRate>, sqlx::Error> {
    sqlx::query_as(
        r#"
            SELECT * FROM tax_rates
            WHERE country = $1
              AND (state IS NULL OR state = $2)
              AND (tax_code IS NULL OR tax_code = $3)
            ORDER BY (state IS NOT NULL) DESC, (tax_code IS NOT NULL) DESC
            LIMIT 1
        "#,
    )
    .bind(country)
    .bind(state)
    .bind(tax_code)
    .fetch_optional(conn)
    .await
}

/// Inserts or replaces the rate for the exact key. The NULL-safe delete stands in for an upsert,
/// since the unique index over `IFNULL` expressions cannot be named in an ON CONFLICT clause.
pub async fn set_tax_rate(rate: &TaxRate, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM tax_rates WHERE country = $1 AND state IS $2 AND tax_code IS $3")
        .bind(&rate.country)
        .bind(&rate.state)
        .bind(&rate.tax_code)
        .execute(&mut *conn)
        .await?;
    sqlx::query("INSERT INTO tax_rates (country, state, tax_code, rate_bps) VALUES ($1, $2, $3, $4)")
        .bind(&rate.country)
        .bind(&rate.state)
        .bind(&rate.tax_code)
        .bind(rate.rate_bps)
        .execute(conn)
        .await?;
    debug!("💸️ Tax rate set: {rate:?}");
    Ok(())
}
