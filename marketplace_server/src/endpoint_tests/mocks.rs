use chrono::Duration;
use marketplace_engine::{
    db_types::{Address, CartItem, ShippingExclusion, ShippingZone},
    traits::{CartError, CartManagement, RateLimitError, RateLimitStore, ShippingError, ShippingManagement},
};
use mockall::mock;

mock! {
    pub CartBackend {}
    impl Clone for CartBackend {
        fn clone(&self) -> Self;
    }
    impl CartManagement for CartBackend {
        async fn fetch_cart(&self, user_id: i64) -> Result<Vec<CartItem>, CartError>;
        async fn add_cart_item(&self, user_id: i64, product_id: i64, quantity: i64) -> Result<CartItem, CartError>;
        async fn update_cart_item(&self, user_id: i64, product_id: i64, quantity: i64) -> Result<CartItem, CartError>;
        async fn remove_cart_item(&self, user_id: i64, product_id: i64) -> Result<(), CartError>;
        async fn clear_cart(&self, user_id: i64) -> Result<(), CartError>;
    }
}

mock! {
    pub ShippingBackend {}
    impl Clone for ShippingBackend {
        fn clone(&self) -> Self;
    }
    impl ShippingManagement for ShippingBackend {
        async fn fetch_shipping_zones(&self) -> Result<Vec<ShippingZone>, ShippingError>;
        async fn insert_shipping_zone<'a, 'b>(
            &self,
            country: &str,
            state_code: Option<&'a str>,
            postal_code: Option<&'b str>,
        ) -> Result<ShippingZone, ShippingError>;
        async fn delete_shipping_zone(&self, zone_id: i64) -> Result<bool, ShippingError>;
        async fn fetch_shipping_exclusions(&self) -> Result<Vec<ShippingExclusion>, ShippingError>;
        async fn insert_shipping_exclusion(&self, country: &str, postal_code: &str)
            -> Result<ShippingExclusion, ShippingError>;
        async fn delete_shipping_exclusion(&self, exclusion_id: i64) -> Result<bool, ShippingError>;
        async fn is_shippable(&self, address: &Address) -> Result<bool, ShippingError>;
    }
}

mock! {
    pub RateLimiter {}
    impl Clone for RateLimiter {
        fn clone(&self) -> Self;
    }
    impl RateLimitStore for RateLimiter {
        async fn check_rate_limit(&self, ip: &str, path: &str) -> Result<i64, RateLimitError>;
        async fn record_rate_limit(&self, ip: &str, path: &str, window: Duration) -> Result<i64, RateLimitError>;
        async fn cleanup_rate_limits(&self) -> Result<u64, RateLimitError>;
    }
}
