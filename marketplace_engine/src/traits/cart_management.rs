use thiserror::Error;

use crate::db_types::CartItem;

/// Cart storage. One cart per user, keyed (user_id, product_id).
#[allow(async_fn_in_trait)]
pub trait CartManagement: Clone {
    async fn fetch_cart(&self, user_id: i64) -> Result<Vec<CartItem>, CartError>;

    /// Adds a product to the cart, or adds to the quantity of an existing line. The product must
    /// exist, not be deleted, and have at least the resulting quantity in stock. The product's
    /// current price is snapshotted onto the line.
    async fn add_cart_item(&self, user_id: i64, product_id: i64, quantity: i64) -> Result<CartItem, CartError>;

    /// Sets the quantity of an existing cart line. The line must exist.
    async fn update_cart_item(&self, user_id: i64, product_id: i64, quantity: i64) -> Result<CartItem, CartError>;

    /// Removes a line from the cart. The line must exist.
    async fn remove_cart_item(&self, user_id: i64, product_id: i64) -> Result<(), CartError>;

    async fn clear_cart(&self, user_id: i64) -> Result<(), CartError>;
}

#[derive(Debug, Clone, Error)]
pub enum CartError {
    #[error("Internal database error: {0}")]
    DatabaseError(String),
    #[error("Product {0} does not exist")]
    ProductNotFound(i64),
    #[error("Only {available} of product {product_id} are in stock (requested {requested})")]
    InsufficientInventory { product_id: i64, requested: i64, available: i64 },
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(i64),
    #[error("Product {0} is not in the cart")]
    ItemNotInCart(i64),
}

impl From<sqlx::Error> for CartError {
    fn from(e: sqlx::Error) -> Self {
        CartError::DatabaseError(e.to_string())
    }
}
