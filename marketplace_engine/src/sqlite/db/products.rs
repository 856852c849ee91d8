//! Product catalog. Products are soft-deleted so order item snapshots keep a valid reference.

use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewProduct, Product},
    helpers::IdGenerator,
    traits::CatalogError,
};

pub async fn insert_product(product: NewProduct, conn: &mut SqliteConnection) -> Result<Product, CatalogError> {
    let id = IdGenerator::next_id().map_err(|e| CatalogError::DatabaseError(e.to_string()))?;
    let product: Product = sqlx::query_as(
        r#"
            INSERT INTO products (id, name, price, description, tax_code, thumbnail, inventory)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
        "#,
    )
    .bind(id)
    .bind(product.name)
    .bind(product.price)
    .bind(product.description)
    .bind(product.tax_code)
    .bind(product.thumbnail)
    .bind(product.inventory)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Product {} ({}) created", product.id, product.name);
    Ok(product)
}

pub async fn fetch_product(product_id: i64, conn: &mut SqliteConnection) -> Result<Option<Product>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM products WHERE id = $1").bind(product_id).fetch_optional(conn).await
}

pub async fn fetch_products(conn: &mut SqliteConnection) -> Result<Vec<Product>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM products WHERE deleted = 0 ORDER BY name").fetch_all(conn).await
}

pub async fn soft_delete_product(product_id: i64, conn: &mut SqliteConnection) -> Result<bool, CatalogError> {
    let res = sqlx::query("UPDATE products SET deleted = 1, updated_at = CURRENT_TIMESTAMP WHERE id = $1 AND deleted = 0")
        .bind(product_id)
        .execute(conn)
        .await?;
    Ok(res.rows_affected() > 0)
}
