//! Fixtures and provider stand-ins shared by the integration tests.

use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use marketplace_engine::{
    db_types::{Address, NewAddress, NewProduct, Product, User},
    traits::{
        AuthManagement,
        CatalogManagement,
        PaymentIntentInfo,
        PaymentProvider,
        ProviderError,
        ShippingManagement,
        TaxProvider,
    },
    SqliteDatabase,
};
use mps_common::Money;

pub async fn create_user(db: &SqliteDatabase, email: &str) -> User {
    let pending = db
        .create_pending_user(email, "unused-code-hash", Utc::now() + Duration::days(1))
        .await
        .expect("Error creating pending user");
    db.promote_pending_user(pending.id, "unused-password-hash").await.expect("Error promoting pending user")
}

pub async fn create_product(db: &SqliteDatabase, name: &str, price: i64, inventory: i64) -> Product {
    let product = NewProduct {
        name: name.to_string(),
        price: Money::from(price),
        description: format!("{name} (test stock)"),
        tax_code: Some("txcd_99999999".to_string()),
        thumbnail: None,
        inventory,
    };
    db.insert_product(product).await.expect("Error inserting product")
}

pub async fn us_address(db: &SqliteDatabase, user_id: i64) -> Address {
    let address = NewAddress {
        country: "US".to_string(),
        line1: "1 Infinite Loop".to_string(),
        line2: None,
        city: "Cupertino".to_string(),
        state: Some("CA".to_string()),
        postal_code: "95014".to_string(),
        email: None,
    };
    db.upsert_address(user_id, address).await.expect("Error upserting address")
}

pub async fn open_us_zone(db: &SqliteDatabase) {
    db.insert_shipping_zone("US", None, None).await.expect("Error inserting shipping zone");
}

/// A payment provider that mints deterministic intents and records cancellations.
#[derive(Default, Clone)]
pub struct TestPaymentProvider {
    pub canceled: Arc<Mutex<Vec<String>>>,
}

impl PaymentProvider for TestPaymentProvider {
    async fn create_intent(
        &self,
        order_id: i64,
        _amount: Money,
        _currency: &str,
    ) -> Result<PaymentIntentInfo, ProviderError> {
        Ok(PaymentIntentInfo {
            id: format!("pi_test_{order_id}"),
            client_secret: format!("pi_test_{order_id}_secret"),
            status: "requires_payment_method".to_string(),
        })
    }

    async fn cancel_intent(&self, intent_id: &str) -> Result<(), ProviderError> {
        self.canceled.lock().unwrap().push(intent_id.to_string());
        Ok(())
    }
}

/// A tax provider that always answers with the same amount.
#[derive(Clone)]
pub struct FixedTaxProvider {
    pub tax: Money,
}

impl TaxProvider for FixedTaxProvider {
    async fn calculate_tax(
        &self,
        _order_ref: i64,
        _currency: &str,
        _address: &Address,
        _items: &[marketplace_engine::db_types::OrderItem],
    ) -> Result<Money, ProviderError> {
        Ok(self.tax)
    }
}
