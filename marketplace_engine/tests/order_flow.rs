use std::{
    sync::{
        atomic::{AtomicI32, Ordering},
        Arc,
    },
    time::Duration as StdDuration,
};

use chrono::Duration;
use log::*;
use marketplace_engine::{
    db_types::OrderStatus,
    events::{EventHandlers, EventHooks, EventProducers},
    traits::{
        CatalogManagement,
        OrderEngineError,
        OrderManagement,
        PaymentEventPayload,
        ShippingManagement,
        WebhookOutcome,
    },
    CartApi,
    OrderFlowApi,
    SqliteDatabase,
};
use mps_common::Money;
use sqlx::{migrate::MigrateDatabase, Sqlite};

use crate::support::{
    prepare_env::{prepare_test_env, random_db_path},
    seed::{create_product, create_user, open_us_zone, us_address, FixedTaxProvider, TestPaymentProvider},
};

mod support;

type TestApi = OrderFlowApi<SqliteDatabase, TestPaymentProvider, FixedTaxProvider>;

async fn setup(producers: EventProducers) -> (TestApi, TestPaymentProvider) {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    let payment = TestPaymentProvider::default();
    let tax = FixedTaxProvider { tax: Money::from(100) };
    (OrderFlowApi::new(db, payment.clone(), tax, producers), payment)
}

async fn tear_down(api: TestApi) {
    let url = api.db().url().to_string();
    Sqlite::drop_database(&url).await.unwrap();
}

fn succeeded_event(event_id: &str, intent_id: &str) -> PaymentEventPayload {
    PaymentEventPayload {
        id: event_id.to_string(),
        event_type: "payment_intent.succeeded".to_string(),
        payment_intent_id: Some(intent_id.to_string()),
        refund_amount: None,
        failure_reason: None,
        raw: "{}".to_string(),
    }
}

#[tokio::test]
async fn order_happy_path() {
    let (api, _) = setup(EventProducers::default()).await;
    let db = api.db().clone();
    let cart = CartApi::new(db.clone());
    let user = create_user(&db, "alice@example.com").await;
    let widget = create_product(&db, "Widget", 2_500, 10).await;
    let gadget = create_product(&db, "Gadget", 10_000, 3).await;
    let address = us_address(&db, user.id).await;
    open_us_zone(&db).await;

    cart.add_item(user.id, widget.id, 2).await.unwrap();
    cart.add_item(user.id, gadget.id, 1).await.unwrap();

    let created = api.create_order(user.id, address.id).await.expect("Error creating order");
    assert_eq!(created.order.status, OrderStatus::Pending);
    assert_eq!(created.order.amount, Money::from(15_000));
    assert_eq!(created.items.len(), 2);

    let intent = api.confirm_order(user.id, created.order.id).await.expect("Error confirming order");
    assert_eq!(intent.id, format!("pi_test_{}", created.order.id));
    // Confirmation clears the cart and locks in tax and total.
    assert!(cart.fetch_cart(user.id).await.unwrap().is_empty());
    let confirmed = api.fetch_order(created.order.id).await.unwrap().unwrap();
    assert_eq!(confirmed.order.tax_amount, Money::from(100));
    assert_eq!(confirmed.order.total_amount, Money::from(15_100));

    let outcome = api.apply_webhook_event(succeeded_event("evt_1", &intent.id)).await.unwrap();
    let order = match outcome {
        WebhookOutcome::Applied(order) => order,
        other => panic!("Expected Applied, got {other:?}"),
    };
    assert_eq!(order.status, OrderStatus::Paid);
    // The delivery is in the idempotency log and flagged as applied.
    let event = db.fetch_payment_event("evt_1").await.unwrap().unwrap();
    assert!(event.processed);
    // Inventory only moves when the order is paid.
    let widget = db.fetch_product(widget.id).await.unwrap().unwrap();
    let gadget = db.fetch_product(gadget.id).await.unwrap().unwrap();
    assert_eq!(widget.inventory, 8);
    assert_eq!(gadget.inventory, 2);
    tear_down(api).await;
}

#[tokio::test]
async fn duplicate_webhook_deliveries_are_dropped() {
    let (api, _) = setup(EventProducers::default()).await;
    let db = api.db().clone();
    let cart = CartApi::new(db.clone());
    let user = create_user(&db, "bob@example.com").await;
    let product = create_product(&db, "Widget", 2_500, 10).await;
    let address = us_address(&db, user.id).await;
    open_us_zone(&db).await;
    cart.add_item(user.id, product.id, 1).await.unwrap();
    let order = api.create_order(user.id, address.id).await.unwrap().order;
    let intent = api.confirm_order(user.id, order.id).await.unwrap();

    let first = api.apply_webhook_event(succeeded_event("evt_dup", &intent.id)).await.unwrap();
    assert!(matches!(first, WebhookOutcome::Applied(_)));
    let second = api.apply_webhook_event(succeeded_event("evt_dup", &intent.id)).await.unwrap();
    assert!(matches!(second, WebhookOutcome::Duplicate));
    // A redelivery with a fresh event id hits the terminal-state guard instead.
    let third = api.apply_webhook_event(succeeded_event("evt_dup2", &intent.id)).await.unwrap();
    assert!(matches!(third, WebhookOutcome::Ignored(_)));
    // Only the delivery that changed the order is flagged as applied.
    assert!(db.fetch_payment_event("evt_dup").await.unwrap().unwrap().processed);
    assert!(!db.fetch_payment_event("evt_dup2").await.unwrap().unwrap().processed);
    // The inventory was decremented exactly once.
    let product = db.fetch_product(product.id).await.unwrap().unwrap();
    assert_eq!(product.inventory, 9);
    tear_down(api).await;
}

#[tokio::test]
async fn orders_need_a_shippable_address_and_a_non_empty_cart() {
    let (api, _) = setup(EventProducers::default()).await;
    let db = api.db().clone();
    let cart = CartApi::new(db.clone());
    let user = create_user(&db, "carol@example.com").await;
    let product = create_product(&db, "Widget", 2_500, 10).await;
    let address = us_address(&db, user.id).await;
    cart.add_item(user.id, product.id, 1).await.unwrap();

    // No zones at all yet.
    let err = api.create_order(user.id, address.id).await.unwrap_err();
    assert!(matches!(err, OrderEngineError::Unshippable));

    open_us_zone(&db).await;
    // An exclusion for the exact postal code wins over the open zone.
    db.insert_shipping_exclusion("US", "95014").await.unwrap();
    let err = api.create_order(user.id, address.id).await.unwrap_err();
    assert!(matches!(err, OrderEngineError::Unshippable));

    cart.clear(user.id).await.unwrap();
    let exclusions = db.fetch_shipping_exclusions().await.unwrap();
    db.delete_shipping_exclusion(exclusions[0].id).await.unwrap();
    let err = api.create_order(user.id, address.id).await.unwrap_err();
    assert!(matches!(err, OrderEngineError::EmptyCart));
    tear_down(api).await;
}

#[tokio::test]
async fn intent_attachment_is_write_once() {
    let (api, _) = setup(EventProducers::default()).await;
    let db = api.db().clone();
    let cart = CartApi::new(db.clone());
    let user = create_user(&db, "dave@example.com").await;
    let product = create_product(&db, "Widget", 2_500, 10).await;
    let address = us_address(&db, user.id).await;
    open_us_zone(&db).await;
    cart.add_item(user.id, product.id, 1).await.unwrap();
    let order = api.create_order(user.id, address.id).await.unwrap().order;

    let first = api.confirm_order(user.id, order.id).await.unwrap();
    // A retry converges on the same intent thanks to the provider idempotency key.
    let second = api.confirm_order(user.id, order.id).await.unwrap();
    assert_eq!(first.id, second.id);
    // A different intent id is refused outright.
    let err = db.attach_payment_intent(order.id, Money::from(0), order.total_amount, "pi_rogue").await.unwrap_err();
    assert!(matches!(err, OrderEngineError::IntentMismatch));
    tear_down(api).await;
}

#[tokio::test]
async fn refunds_accumulate_and_restock_on_full_refund() {
    let (api, _) = setup(EventProducers::default()).await;
    let db = api.db().clone();
    let cart = CartApi::new(db.clone());
    let user = create_user(&db, "erin@example.com").await;
    let product = create_product(&db, "Widget", 5_000, 10).await;
    let address = us_address(&db, user.id).await;
    open_us_zone(&db).await;
    cart.add_item(user.id, product.id, 2).await.unwrap();
    let order = api.create_order(user.id, address.id).await.unwrap().order;
    let intent = api.confirm_order(user.id, order.id).await.unwrap();
    api.apply_webhook_event(succeeded_event("evt_pay", &intent.id)).await.unwrap();

    let partial = PaymentEventPayload {
        id: "evt_refund_1".to_string(),
        event_type: "refund.created".to_string(),
        payment_intent_id: Some(intent.id.clone()),
        refund_amount: Some(Money::from(1_000)),
        failure_reason: None,
        raw: "{}".to_string(),
    };
    let outcome = api.apply_webhook_event(partial).await.unwrap();
    let order_after = match outcome {
        WebhookOutcome::Applied(o) => o,
        other => panic!("Expected Applied, got {other:?}"),
    };
    assert_eq!(order_after.status, OrderStatus::Paid);
    assert_eq!(order_after.refunded_amount, Money::from(1_000));

    // A refund event with no amount refunds the remainder.
    let full = PaymentEventPayload {
        id: "evt_refund_2".to_string(),
        event_type: "refund.created".to_string(),
        payment_intent_id: Some(intent.id.clone()),
        refund_amount: None,
        failure_reason: None,
        raw: "{}".to_string(),
    };
    let outcome = api.apply_webhook_event(full).await.unwrap();
    let order_after = match outcome {
        WebhookOutcome::Applied(o) => o,
        other => panic!("Expected Applied, got {other:?}"),
    };
    assert_eq!(order_after.status, OrderStatus::Refunded);
    assert_eq!(order_after.refunded_amount, order_after.total_amount);
    let product = db.fetch_product(product.id).await.unwrap().unwrap();
    assert_eq!(product.inventory, 10);
    tear_down(api).await;
}

#[tokio::test]
async fn payment_failure_records_the_reason_and_keeps_the_order_payable() {
    let (api, _) = setup(EventProducers::default()).await;
    let db = api.db().clone();
    let cart = CartApi::new(db.clone());
    let user = create_user(&db, "frank@example.com").await;
    let product = create_product(&db, "Widget", 2_500, 10).await;
    let address = us_address(&db, user.id).await;
    open_us_zone(&db).await;
    cart.add_item(user.id, product.id, 1).await.unwrap();
    let order = api.create_order(user.id, address.id).await.unwrap().order;
    let intent = api.confirm_order(user.id, order.id).await.unwrap();

    let failed = PaymentEventPayload {
        id: "evt_fail".to_string(),
        event_type: "payment_intent.payment_failed".to_string(),
        payment_intent_id: Some(intent.id.clone()),
        refund_amount: None,
        failure_reason: Some("card_declined".to_string()),
        raw: "{}".to_string(),
    };
    api.apply_webhook_event(failed).await.unwrap();
    let order = api.fetch_order(order.id).await.unwrap().unwrap().order;
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.failure_reason.as_deref(), Some("card_declined"));

    // A successful retry still goes through.
    let outcome = api.apply_webhook_event(succeeded_event("evt_retry", &intent.id)).await.unwrap();
    assert!(matches!(outcome, WebhookOutcome::Applied(_)));
    tear_down(api).await;
}

#[tokio::test]
async fn stale_pending_orders_are_swept_and_their_intents_canceled() {
    let (api, payment) = setup(EventProducers::default()).await;
    let db = api.db().clone();
    let cart = CartApi::new(db.clone());
    let user = create_user(&db, "grace@example.com").await;
    let product = create_product(&db, "Widget", 2_500, 10).await;
    let address = us_address(&db, user.id).await;
    open_us_zone(&db).await;
    cart.add_item(user.id, product.id, 1).await.unwrap();
    let order = api.create_order(user.id, address.id).await.unwrap().order;
    let intent = api.confirm_order(user.id, order.id).await.unwrap();

    // Nothing is stale yet.
    let swept = api.cancel_stale_orders(Duration::hours(1)).await.unwrap();
    assert!(swept.is_empty());

    tokio::time::sleep(StdDuration::from_secs(2)).await;
    let swept = api.cancel_stale_orders(Duration::seconds(1)).await.unwrap();
    assert_eq!(swept.len(), 1);
    assert_eq!(swept[0].status, OrderStatus::Canceled);
    assert_eq!(payment.canceled.lock().unwrap().as_slice(), &[intent.id.clone()]);

    // The sweep is idempotent.
    let swept = api.cancel_stale_orders(Duration::seconds(1)).await.unwrap();
    assert!(swept.is_empty());
    tear_down(api).await;
}

#[tokio::test]
async fn order_paid_hook_fires_once_per_paid_order() {
    let paid_count = Arc::new(AtomicI32::new(0));
    let counter = Arc::clone(&paid_count);
    let mut hooks = EventHooks::default();
    hooks.on_order_paid(move |event| {
        info!("🪝️ {:?}", event.order.id);
        counter.fetch_add(1, Ordering::Relaxed);
        Box::pin(async {})
    });
    let handlers = EventHandlers::new(10, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let (api, _) = setup(producers).await;
    let db = api.db().clone();
    let cart = CartApi::new(db.clone());
    let user = create_user(&db, "heidi@example.com").await;
    let product = create_product(&db, "Widget", 2_500, 10).await;
    let address = us_address(&db, user.id).await;
    open_us_zone(&db).await;
    cart.add_item(user.id, product.id, 1).await.unwrap();
    let order = api.create_order(user.id, address.id).await.unwrap().order;
    let intent = api.confirm_order(user.id, order.id).await.unwrap();
    api.apply_webhook_event(succeeded_event("evt_hook", &intent.id)).await.unwrap();
    api.apply_webhook_event(succeeded_event("evt_hook", &intent.id)).await.unwrap();

    // The handler runs on its own task; give it a beat to drain the channel.
    let mut waited = 0;
    while paid_count.load(Ordering::Relaxed) == 0 && waited < 100 {
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        waited += 1;
    }
    assert_eq!(paid_count.load(Ordering::Relaxed), 1);
    tear_down(api).await;
}
