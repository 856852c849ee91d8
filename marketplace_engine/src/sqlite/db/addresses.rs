//! Shipping addresses, deduplicated per user: inserting a byte-identical address returns the
//! existing row instead of creating another.

use sqlx::SqliteConnection;

use crate::{
    db_types::{Address, NewAddress},
    helpers::IdGenerator,
    traits::CatalogError,
};

pub async fn upsert_address(
    user_id: i64,
    address: NewAddress,
    conn: &mut SqliteConnection,
) -> Result<Address, CatalogError> {
    let existing: Option<Address> = sqlx::query_as(
        r#"
            SELECT * FROM addresses
            WHERE user_id = $1 AND country = $2 AND line1 = $3 AND line2 IS $4 AND city = $5
              AND state IS $6 AND postal_code = $7 AND email IS $8
        "#,
    )
    .bind(user_id)
    .bind(&address.country)
    .bind(&address.line1)
    .bind(&address.line2)
    .bind(&address.city)
    .bind(&address.state)
    .bind(&address.postal_code)
    .bind(&address.email)
    .fetch_optional(&mut *conn)
    .await?;
    if let Some(existing) = existing {
        return Ok(existing);
    }
    let id = IdGenerator::next_id().map_err(|e| CatalogError::DatabaseError(e.to_string()))?;
    let inserted = sqlx::query_as(
        r#"
            INSERT INTO addresses (id, user_id, country, line1, line2, city, state, postal_code, email)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
        "#,
    )
    .bind(id)
    .bind(user_id)
    .bind(&address.country)
    .bind(&address.line1)
    .bind(&address.line2)
    .bind(&address.city)
    .bind(&address.state)
    .bind(&address.postal_code)
    .bind(&address.email)
    .fetch_one(conn)
    .await?;
    Ok(inserted)
}

pub async fn fetch_address(address_id: i64, conn: &mut SqliteConnection) -> Result<Option<Address>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM addresses WHERE id = $1").bind(address_id).fetch_optional(conn).await
}

pub async fn fetch_addresses_for_user(user_id: i64, conn: &mut SqliteConnection) -> Result<Vec<Address>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM addresses WHERE user_id = $1 ORDER BY created_at DESC")
        .bind(user_id)
        .fetch_all(conn)
        .await
}
