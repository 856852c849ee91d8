use log::*;

use crate::{
    db_types::{Address, ShippingExclusion, ShippingZone},
    traits::{ShippingError, ShippingManagement},
};

/// Administration of shipping zones and exclusions, plus the eligibility check used by order
/// creation.
#[derive(Debug, Clone)]
pub struct ShippingApi<B> {
    db: B,
}

impl<B> ShippingApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B: ShippingManagement> ShippingApi<B> {
    pub async fn zones(&self) -> Result<Vec<ShippingZone>, ShippingError> {
        self.db.fetch_shipping_zones().await
    }

    pub async fn add_zone(
        &self,
        country: &str,
        state_code: Option<&str>,
        postal_code: Option<&str>,
    ) -> Result<ShippingZone, ShippingError> {
        let zone = self.db.insert_shipping_zone(country, state_code, postal_code).await?;
        info!("🚚️ Shipping zone {} added: {country} {state_code:?} {postal_code:?}", zone.id);
        Ok(zone)
    }

    pub async fn remove_zone(&self, zone_id: i64) -> Result<bool, ShippingError> {
        self.db.delete_shipping_zone(zone_id).await
    }

    pub async fn exclusions(&self) -> Result<Vec<ShippingExclusion>, ShippingError> {
        self.db.fetch_shipping_exclusions().await
    }

    pub async fn add_exclusion(&self, country: &str, postal_code: &str) -> Result<ShippingExclusion, ShippingError> {
        let exclusion = self.db.insert_shipping_exclusion(country, postal_code).await?;
        info!("🚚️ Shipping exclusion {} added: {country} {postal_code}", exclusion.id);
        Ok(exclusion)
    }

    pub async fn remove_exclusion(&self, exclusion_id: i64) -> Result<bool, ShippingError> {
        self.db.delete_shipping_exclusion(exclusion_id).await
    }

    pub async fn is_shippable(&self, address: &Address) -> Result<bool, ShippingError> {
        self.db.is_shippable(address).await
    }
}
