use thiserror::Error;

use crate::db_types::{Address, NewAddress, NewProduct, Product};

/// Product and address storage. Products are soft-deleted; addresses are deduplicated per user,
/// so inserting a byte-identical address returns the existing row.
#[allow(async_fn_in_trait)]
pub trait CatalogManagement: Clone {
    async fn insert_product(&self, product: NewProduct) -> Result<Product, CatalogError>;

    async fn fetch_product(&self, product_id: i64) -> Result<Option<Product>, CatalogError>;

    async fn fetch_products(&self) -> Result<Vec<Product>, CatalogError>;

    /// Marks a product as deleted. Existing order items keep their snapshot.
    async fn delete_product(&self, product_id: i64) -> Result<bool, CatalogError>;

    /// Inserts the address, or returns the user's existing identical address.
    async fn upsert_address(&self, user_id: i64, address: NewAddress) -> Result<Address, CatalogError>;

    async fn fetch_address(&self, address_id: i64) -> Result<Option<Address>, CatalogError>;

    async fn fetch_addresses_for_user(&self, user_id: i64) -> Result<Vec<Address>, CatalogError>;
}

#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    #[error("Internal database error: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for CatalogError {
    fn from(e: sqlx::Error) -> Self {
        CatalogError::DatabaseError(e.to_string())
    }
}
