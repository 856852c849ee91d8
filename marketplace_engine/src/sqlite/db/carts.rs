//! Cart lines, keyed (user_id, product_id). The UPSERT's unique-key row lock serializes
//! concurrent additions of the same product.

use log::trace;
use sqlx::SqliteConnection;

use crate::{
    db_types::{CartItem, Product},
    sqlite::db::products,
    traits::CartError,
};

pub async fn fetch_cart(user_id: i64, conn: &mut SqliteConnection) -> Result<Vec<CartItem>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM cart_items WHERE user_id = $1 ORDER BY created_at").bind(user_id).fetch_all(conn).await
}

async fn live_product(product_id: i64, conn: &mut SqliteConnection) -> Result<Product, CartError> {
    products::fetch_product(product_id, conn)
        .await?
        .filter(|p| !p.deleted)
        .ok_or(CartError::ProductNotFound(product_id))
}

fn check_inventory(product: &Product, requested: i64) -> Result<(), CartError> {
    if product.inventory < requested {
        return Err(CartError::InsufficientInventory {
            product_id: product.id,
            requested,
            available: product.inventory,
        });
    }
    Ok(())
}

/// Adds `quantity` to the user's line for the product, creating the line if needed. Snapshots the
/// product's current price onto the line.
pub async fn add_cart_item(
    user_id: i64,
    product_id: i64,
    quantity: i64,
    conn: &mut SqliteConnection,
) -> Result<CartItem, CartError> {
    let product = live_product(product_id, &mut *conn).await?;
    let current: Option<i64> =
        sqlx::query_scalar("SELECT quantity FROM cart_items WHERE user_id = $1 AND product_id = $2")
            .bind(user_id)
            .bind(product_id)
            .fetch_optional(&mut *conn)
            .await?;
    let new_quantity = current.unwrap_or(0) + quantity;
    check_inventory(&product, new_quantity)?;
    let item = sqlx::query_as(
        r#"
            INSERT INTO cart_items (user_id, product_id, quantity, unit_price) VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, product_id) DO UPDATE
                SET quantity = $3, unit_price = $4, updated_at = CURRENT_TIMESTAMP
            RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(product_id)
    .bind(new_quantity)
    .bind(product.price)
    .fetch_one(conn)
    .await?;
    trace!("🗃️ Cart line ({user_id}, {product_id}) now at quantity {new_quantity}");
    Ok(item)
}

/// Sets the quantity of an existing line.
pub async fn set_cart_item_quantity(
    user_id: i64,
    product_id: i64,
    quantity: i64,
    conn: &mut SqliteConnection,
) -> Result<CartItem, CartError> {
    let product = live_product(product_id, &mut *conn).await?;
    check_inventory(&product, quantity)?;
    let item: Option<CartItem> = sqlx::query_as(
        r#"
            UPDATE cart_items SET quantity = $3, updated_at = CURRENT_TIMESTAMP
            WHERE user_id = $1 AND product_id = $2
            RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(product_id)
    .bind(quantity)
    .fetch_optional(conn)
    .await?;
    item.ok_or(CartError::ItemNotInCart(product_id))
}

pub async fn delete_cart_item(user_id: i64, product_id: i64, conn: &mut SqliteConnection) -> Result<(), CartError> {
    let res = sqlx::query("DELETE FROM cart_items WHERE user_id = $1 AND product_id = $2")
        .bind(user_id)
        .bind(product_id)
        .execute(conn)
        .await?;
    if res.rows_affected() == 0 {
        return Err(CartError::ItemNotInCart(product_id));
    }
    Ok(())
}

pub async fn clear_cart(user_id: i64, conn: &mut SqliteConnection) -> Result<(), CartError> {
    sqlx::query("DELETE FROM cart_items WHERE user_id = $1").bind(user_id).execute(conn).await?;
    Ok(())
}
