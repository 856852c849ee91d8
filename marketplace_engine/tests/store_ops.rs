//! Rate limiting, job scheduling, tax estimates and cart edge cases, against a real database.

use chrono::Duration;
use marketplace_engine::{
    db_types::{OrderItem, TaxRate},
    traits::{CartError, JobScheduler, OrderManagement},
    CartApi,
    RateLimitApi,
    SqliteDatabase,
    TaxApi,
};
use mps_common::Money;
use sqlx::{migrate::MigrateDatabase, Sqlite};

use crate::support::{
    prepare_env::{prepare_test_env, random_db_path},
    seed::{create_product, create_user, us_address},
};

mod support;

async fn setup() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database")
}

async fn tear_down(db: SqliteDatabase) {
    Sqlite::drop_database(db.url()).await.unwrap();
}

#[tokio::test]
async fn rate_limit_windows_count_and_reset() {
    let db = setup().await;
    let api = RateLimitApi::new(db.clone());
    let window = Duration::seconds(60);
    assert_eq!(api.check("10.0.0.1", "/auth").await.unwrap(), 0);
    assert_eq!(api.record("10.0.0.1", "/auth", window).await.unwrap(), 1);
    assert_eq!(api.record("10.0.0.1", "/auth", window).await.unwrap(), 2);
    assert_eq!(api.record("10.0.0.1", "/auth", window).await.unwrap(), 3);
    assert_eq!(api.check("10.0.0.1", "/auth").await.unwrap(), 3);
    // Keys are (ip, path); neither a different ip nor a different path shares the count.
    assert_eq!(api.record("10.0.0.2", "/auth", window).await.unwrap(), 1);
    assert_eq!(api.record("10.0.0.1", "/orders", window).await.unwrap(), 1);
    assert!(api.is_limited("10.0.0.1", "/auth", 3).await.unwrap());
    assert!(!api.is_limited("10.0.0.1", "/auth", 5).await.unwrap());

    // An expired window restarts the count instead of carrying it over.
    api.record("10.0.0.3", "/auth", Duration::seconds(-1)).await.unwrap();
    api.record("10.0.0.3", "/auth", Duration::seconds(-1)).await.unwrap();
    assert_eq!(api.check("10.0.0.3", "/auth").await.unwrap(), 0);
    assert_eq!(api.record("10.0.0.3", "/auth", window).await.unwrap(), 1);

    // Cleanup only reaps expired rows.
    api.record("10.0.0.4", "/auth", Duration::seconds(-1)).await.unwrap();
    let reaped = api.cleanup().await.unwrap();
    assert_eq!(reaped, 1);
    assert_eq!(api.check("10.0.0.1", "/auth").await.unwrap(), 3);
    tear_down(db).await;
}

#[tokio::test]
async fn job_lease_admits_one_runner_per_interval() {
    let db = setup().await;
    assert!(db.try_run("stale_order_sweep", Duration::hours(1)).await.unwrap());
    assert!(!db.try_run("stale_order_sweep", Duration::hours(1)).await.unwrap());
    // Different jobs hold independent leases.
    assert!(db.try_run("auth_purge", Duration::hours(1)).await.unwrap());
    // A zero interval always admits.
    assert!(db.try_run("stale_order_sweep", Duration::zero()).await.unwrap());
    tear_down(db).await;
}

fn line(unit_price: i64, quantity: i64, tax_code: Option<&str>) -> OrderItem {
    OrderItem {
        order_id: 1,
        product_id: 1,
        quantity,
        unit_price: Money::from(unit_price),
        product_name: "Widget".to_string(),
        thumbnail: None,
        tax_code: tax_code.map(String::from),
    }
}

#[tokio::test]
async fn tax_estimates_prefer_the_most_specific_bucket() {
    let db = setup().await;
    let api = TaxApi::new(db.clone());
    let user = create_user(&db, "taxpayer@example.com").await;
    let address = us_address(&db, user.id).await;

    let country_wide = TaxRate { country: "US".into(), state: None, tax_code: None, rate_bps: 500 };
    let state_rate = TaxRate { country: "US".into(), state: Some("CA".into()), tax_code: None, rate_bps: 825 };
    let code_rate =
        TaxRate { country: "US".into(), state: Some("CA".into()), tax_code: Some("txcd_10000000".into()), rate_bps: 0 };
    api.set_rate(&country_wide).await.unwrap();
    api.set_rate(&state_rate).await.unwrap();
    api.set_rate(&code_rate).await.unwrap();

    // (CA, specific code) hits the zero-rated bucket; (CA, other code) falls back to the state
    // rate; quantities multiply through.
    let items = vec![line(10_000, 1, Some("txcd_10000000")), line(10_000, 2, Some("txcd_99999999"))];
    let tax = api.estimate_tax(&address, &items).await.unwrap();
    assert_eq!(tax, Money::from(1_650));

    // An address outside any bucket estimates zero.
    let user2 = create_user(&db, "abroad@example.com").await;
    let mut foreign = us_address(&db, user2.id).await;
    foreign.country = "DE".to_string();
    foreign.state = None;
    let tax = api.estimate_tax(&foreign, &items).await.unwrap();
    assert_eq!(tax, Money::from(0));

    // Re-setting a bucket replaces the rate.
    let bumped = TaxRate { country: "US".into(), state: Some("CA".into()), tax_code: None, rate_bps: 900 };
    api.set_rate(&bumped).await.unwrap();
    let items = vec![line(10_000, 1, Some("txcd_99999999"))];
    assert_eq!(api.estimate_tax(&address, &items).await.unwrap(), Money::from(900));
    tear_down(db).await;
}

#[tokio::test]
async fn carts_enforce_inventory_and_quantity_rules() {
    let db = setup().await;
    let cart = CartApi::new(db.clone());
    let user = create_user(&db, "shopper@example.com").await;
    let product = create_product(&db, "Widget", 2_500, 3).await;

    let err = cart.add_item(user.id, product.id, 0).await.unwrap_err();
    assert!(matches!(err, CartError::InvalidQuantity(0)));
    let err = cart.add_item(user.id, 9_999, 1).await.unwrap_err();
    assert!(matches!(err, CartError::ProductNotFound(9_999)));
    let err = cart.add_item(user.id, product.id, 4).await.unwrap_err();
    assert!(matches!(err, CartError::InsufficientInventory { available: 3, requested: 4, .. }));

    // Adding twice accumulates, and the cap applies to the accumulated quantity.
    cart.add_item(user.id, product.id, 2).await.unwrap();
    let item = cart.add_item(user.id, product.id, 1).await.unwrap();
    assert_eq!(item.quantity, 3);
    let err = cart.add_item(user.id, product.id, 1).await.unwrap_err();
    assert!(matches!(err, CartError::InsufficientInventory { .. }));

    let item = cart.update_item(user.id, product.id, 1).await.unwrap();
    assert_eq!(item.quantity, 1);
    cart.remove_item(user.id, product.id).await.unwrap();
    let err = cart.update_item(user.id, product.id, 1).await.unwrap_err();
    assert!(matches!(err, CartError::ItemNotInCart(_)));
    let err = cart.remove_item(user.id, product.id).await.unwrap_err();
    assert!(matches!(err, CartError::ItemNotInCart(_)));
    assert!(cart.fetch_cart(user.id).await.unwrap().is_empty());
    tear_down(db).await;
}
