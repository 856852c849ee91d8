use thiserror::Error;

use crate::db_types::{Address, ShippingExclusion, ShippingZone};

/// Shipping destination storage and the eligibility check.
#[allow(async_fn_in_trait)]
pub trait ShippingManagement: Clone {
    async fn fetch_shipping_zones(&self) -> Result<Vec<ShippingZone>, ShippingError>;

    async fn insert_shipping_zone(
        &self,
        country: &str,
        state_code: Option<&str>,
        postal_code: Option<&str>,
    ) -> Result<ShippingZone, ShippingError>;

    /// Returns false if no zone with the given id existed.
    async fn delete_shipping_zone(&self, zone_id: i64) -> Result<bool, ShippingError>;

    async fn fetch_shipping_exclusions(&self) -> Result<Vec<ShippingExclusion>, ShippingError>;

    async fn insert_shipping_exclusion(&self, country: &str, postal_code: &str)
        -> Result<ShippingExclusion, ShippingError>;

    async fn delete_shipping_exclusion(&self, exclusion_id: i64) -> Result<bool, ShippingError>;

    /// Exclusion wins over inclusion: an address whose (country, postal_code) is excluded is
    /// never shippable, otherwise any zone matching the country with wildcard or equal state and
    /// postal code qualifies it.
    async fn is_shippable(&self, address: &Address) -> Result<bool, ShippingError>;
}

#[derive(Debug, Clone, Error)]
pub enum ShippingError {
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for ShippingError {
    fn from(e: sqlx::Error) -> Self {
        ShippingError::DatabaseError(e.to_string())
    }
}
