use log::*;

use crate::{
    db_types::CartItem,
    traits::{CartError, CartManagement},
};

/// Thin API over cart storage. Quantity validation happens here; inventory and product existence
/// checks happen inside the backend's transaction.
#[derive(Debug, Clone)]
pub struct CartApi<B> {
    db: B,
}

impl<B> CartApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B: CartManagement> CartApi<B> {
    pub async fn fetch_cart(&self, user_id: i64) -> Result<Vec<CartItem>, CartError> {
        self.db.fetch_cart(user_id).await
    }

    pub async fn add_item(&self, user_id: i64, product_id: i64, quantity: i64) -> Result<CartItem, CartError> {
        if quantity < 1 {
            return Err(CartError::InvalidQuantity(quantity));
        }
        let item = self.db.add_cart_item(user_id, product_id, quantity).await?;
        debug!("🛒️ User {user_id} now has {} of product {product_id} in the cart", item.quantity);
        Ok(item)
    }

    pub async fn update_item(&self, user_id: i64, product_id: i64, quantity: i64) -> Result<CartItem, CartError> {
        if quantity < 1 {
            return Err(CartError::InvalidQuantity(quantity));
        }
        self.db.update_cart_item(user_id, product_id, quantity).await
    }

    pub async fn remove_item(&self, user_id: i64, product_id: i64) -> Result<(), CartError> {
        self.db.remove_cart_item(user_id, product_id).await
    }

    pub async fn clear(&self, user_id: i64) -> Result<(), CartError> {
        self.db.clear_cart(user_id).await
    }
}
