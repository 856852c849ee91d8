use chrono::Duration;
use mps_common::Money;
use thiserror::Error;

use crate::{
    db_types::{Order, OrderItem, PaymentEvent},
    mpe_api::order_objects::OrderQueryFilter,
    traits::{data_objects::TransitionOutcome, CartError, ProviderError},
};

/// This trait defines the storage contract for the order engine.
///
/// All mutating methods are single atomic transactions. Transition methods re-read the order's
/// status inside the transaction before acting, so concurrent webhook deliveries for the same
/// order serialize on the database and the losing delivery sees the new status.
#[allow(async_fn_in_trait)]
pub trait OrderManagement: Clone {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Creates an order from the user's current cart, in a single atomic transaction:
    /// * reads the cart rows; fails with [`OrderEngineError::EmptyCart`] if there are none;
    /// * re-reads each product and snapshots `unit_price`, `name`, `thumbnail` and `tax_code`
    ///   into order items;
    /// * computes `amount` from the snapshot and inserts the order with `Pending` status, zero
    ///   tax and shipping, and `total_amount = amount`.
    ///
    /// Inventory is NOT decremented here; that happens when the order is paid.
    async fn create_order_from_cart(
        &self,
        user_id: i64,
        shipping_address_id: i64,
        currency: &str,
    ) -> Result<Order, OrderEngineError>;

    async fn fetch_order(&self, order_id: i64) -> Result<Option<Order>, OrderEngineError>;

    async fn fetch_order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, OrderEngineError>;

    async fn fetch_orders_for_user(&self, user_id: i64) -> Result<Vec<Order>, OrderEngineError>;

    /// Fetches orders according to criteria specified in the `OrderQueryFilter`.
    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderEngineError>;

    async fn fetch_order_by_intent(&self, intent_id: &str) -> Result<Option<Order>, OrderEngineError>;

    /// Writes the confirmation results onto a pending order: the calculated tax, the new total,
    /// and the payment intent id.
    ///
    /// The intent id is write-once. Re-confirming with the same intent id is a no-op; a different
    /// intent id fails with [`OrderEngineError::IntentMismatch`]. Orders past `Pending` fail with
    /// [`OrderEngineError::InvalidState`].
    async fn attach_payment_intent(
        &self,
        order_id: i64,
        tax: Money,
        total: Money,
        intent_id: &str,
    ) -> Result<Order, OrderEngineError>;

    /// Inserts a row into the payment event log. Returns `false` (and changes nothing) when the
    /// event id is already present. This is the webhook idempotency gate.
    async fn insert_payment_event(&self, id: &str, event_type: &str, payload: &str) -> Result<bool, OrderEngineError>;

    /// Flags a logged payment event as applied to an order.
    async fn mark_payment_event_processed(&self, id: &str) -> Result<(), OrderEngineError>;

    /// The logged payment event, if the id has been seen.
    async fn fetch_payment_event(&self, id: &str) -> Result<Option<PaymentEvent>, OrderEngineError>;

    /// `Pending -> Paid`. Decrements inventory for every order item in the same transaction.
    /// Returns an unchanged outcome if the order has already left `Pending`.
    async fn mark_order_paid(&self, order_id: i64) -> Result<TransitionOutcome, OrderEngineError>;

    /// Records a payment failure reason on a pending order. The status does not change; the order
    /// remains payable until it goes stale.
    async fn record_payment_failure(&self, order_id: i64, reason: &str) -> Result<TransitionOutcome, OrderEngineError>;

    /// `Pending -> Canceled`. Returns an unchanged outcome if the order has already left
    /// `Pending`.
    async fn cancel_order(&self, order_id: i64) -> Result<TransitionOutcome, OrderEngineError>;

    /// Applies a refund to a paid order. A refund that brings the cumulative refunded amount up
    /// to the order total transitions `Paid -> Refunded` and restocks the inventory; a smaller
    /// one records the partial amount and leaves the order `Paid`.
    async fn apply_refund(&self, order_id: i64, amount: Money) -> Result<TransitionOutcome, OrderEngineError>;

    /// Cancels every pending order older than `ttl`, returning the orders that were canceled.
    async fn cancel_stale_orders(&self, ttl: Duration) -> Result<Vec<Order>, OrderEngineError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), OrderEngineError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum OrderEngineError {
    #[error("Internal database error: {0}")]
    DatabaseError(String),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(i64),
    #[error("The shipping address {0} does not exist")]
    AddressNotFound(i64),
    #[error("The cart is empty; there is nothing to order")]
    EmptyCart,
    #[error("The order total must be positive")]
    AmountNotPositive,
    #[error("We do not ship to the given address")]
    Unshippable,
    #[error("The order is not in a state that allows this operation: {0}")]
    InvalidState(String),
    #[error("The order already has a different payment intent attached")]
    IntentMismatch,
    #[error("The webhook event type is not supported: {0}")]
    UnsupportedEvent(String),
    #[error("{0}")]
    CartError(#[from] CartError),
    #[error("Payment provider error: {0}")]
    ProviderError(#[from] ProviderError),
}

impl From<sqlx::Error> for OrderEngineError {
    fn from(e: sqlx::Error) -> Self {
        OrderEngineError::DatabaseError(e.to_string())
    }
}

impl From<crate::traits::CatalogError> for OrderEngineError {
    fn from(e: crate::traits::CatalogError) -> Self {
        OrderEngineError::DatabaseError(e.to_string())
    }
}

impl From<crate::traits::ShippingError> for OrderEngineError {
    fn from(e: crate::traits::ShippingError) -> Self {
        OrderEngineError::DatabaseError(e.to_string())
    }
}
