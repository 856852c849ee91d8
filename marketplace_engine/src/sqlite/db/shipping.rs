//! Shipping zones and exclusions.

use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{Address, ShippingExclusion, ShippingZone},
    helpers::IdGenerator,
    traits::ShippingError,
};

fn next_id() -> Result<i64, ShippingError> {
    IdGenerator::next_id().map_err(|e| ShippingError::DatabaseError(e.to_string()))
}

pub async fn fetch_shipping_zones(conn: &mut SqliteConnection) -> Result<Vec<ShippingZone>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM shipping_zones ORDER BY country, state_code, postal_code").fetch_all(conn).await
}

pub async fn insert_shipping_zone(
    country: &str,
    state_code: Option<&str>,
    postal_code: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<ShippingZone, ShippingError> {
    let zone: ShippingZone = sqlx::query_as(
        "INSERT INTO shipping_zones (id, country, state_code, postal_code) VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(next_id()?)
    .bind(country)
    .bind(state_code)
    .bind(postal_code)
    .fetch_one(conn)
    .await?;
    debug!("🚚️ Added shipping zone {zone:?}");
    Ok(zone)
}

pub async fn delete_shipping_zone(zone_id: i64, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM shipping_zones WHERE id = $1").bind(zone_id).execute(conn).await?;
    Ok(result.rows_affected() > 0)
}

pub async fn fetch_shipping_exclusions(conn: &mut SqliteConnection) -> Result<Vec<ShippingExclusion>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM shipping_exclusions ORDER BY country, postal_code").fetch_all(conn).await
}

pub async fn insert_shipping_exclusion(
    country: &str,
    postal_code: &str,
    conn: &mut SqliteConnection,
) -> Result<ShippingExclusion, ShippingError> {
    let exclusion: ShippingExclusion = sqlx::query_as(
        "INSERT INTO shipping_exclusions (id, country, postal_code) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(next_id()?)
    .bind(country)
    .bind(postal_code)
    .fetch_one(conn)
    .await?;
    debug!("🚚️ Added shipping exclusion {exclusion:?}");
    Ok(exclusion)
}

pub async fn delete_shipping_exclusion(exclusion_id: i64, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result =
        sqlx::query("DELETE FROM shipping_exclusions WHERE id = $1").bind(exclusion_id).execute(conn).await?;
    Ok(result.rows_affected() > 0)
}

/// An address is shippable when its (country, postal code) is not excluded and at least one zone
/// matches its country with wildcard-or-equal state and postal code.
pub async fn is_shippable(address: &Address, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let (excluded,): (bool,) = sqlx::query_as(
        "SELECT EXISTS (SELECT 1 FROM shipping_exclusions WHERE country = $1 AND postal_code = $2)",
    )
    .bind(&address.country)
    .bind(&address.postal_code)
    .fetch_one(&mut *conn)
    .await?;
    if excluded {
        return Ok(false);
    }
    let (matched,): (bool,) = sqlx::query_as(
        r#"
            SELECT EXISTS (
                SELECT 1 FROM shipping_zones
                WHERE country = $1
                  AND (state_code IS NULL OR state_code = $2)
                  AND (postal_code IS NULL OR postal_code = $3)
            )
        "#,
    )
    .bind(&address.country)
    .bind(&address.state)
    .bind(&address.postal_code)
    .fetch_one(conn)
    .await?;
    Ok(matched)
}
