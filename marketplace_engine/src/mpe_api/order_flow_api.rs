use std::fmt::Debug;

use chrono::Duration;
use log::*;
use mps_common::Money;

use crate::{
    db_types::{Order, OrderStatus},
    events::{EventProducers, OrderAnnulledEvent, OrderPaidEvent},
    mpe_api::order_objects::{OrderQueryFilter, OrderWithItems},
    traits::{
        CartManagement,
        CatalogManagement,
        OrderEngineError,
        OrderManagement,
        PaymentEventPayload,
        PaymentIntentInfo,
        PaymentProvider,
        ShippingManagement,
        TaxProvider,
        WebhookOutcome,
    },
};

/// `OrderFlowApi` is the primary API for the order lifecycle: creation from the cart,
/// confirmation against the payment provider, webhook-driven state transitions and stale-order
/// cleanup.
pub struct OrderFlowApi<B, P, T> {
    db: B,
    payment: P,
    tax: T,
    producers: EventProducers,
}

impl<B, P, T> Debug for OrderFlowApi<B, P, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B, P, T> OrderFlowApi<B, P, T> {
    pub fn new(db: B, payment: P, tax: T, producers: EventProducers) -> Self {
        Self { db, payment, tax, producers }
    }
}

impl<B, P, T> OrderFlowApi<B, P, T>
where
    B: OrderManagement + CartManagement + CatalogManagement + ShippingManagement,
    P: PaymentProvider,
    T: TaxProvider,
{
    /// Create a pending order from the user's cart.
    ///
    /// The shipping address must belong to the user and be inside a shipping zone. Cart lines are
    /// snapshotted into order items; inventory is untouched until the order is paid.
    pub async fn create_order(&self, user_id: i64, shipping_address_id: i64) -> Result<OrderWithItems, OrderEngineError> {
        let address = self
            .db
            .fetch_address(shipping_address_id)
            .await?
            .filter(|a| a.user_id == user_id)
            .ok_or(OrderEngineError::AddressNotFound(shipping_address_id))?;
        if !self.db.is_shippable(&address).await? {
            debug!("🔄️📦️ Address {} ({}, {}) is outside our shipping zones", address.id, address.country, address.postal_code);
            return Err(OrderEngineError::Unshippable);
        }
        let order = self.db.create_order_from_cart(user_id, shipping_address_id, mps_common::DEFAULT_CURRENCY).await?;
        let items = self.db.fetch_order_items(order.id).await?;
        debug!("🔄️📦️ Order {} created for user {user_id} with {} items, amount {}", order.id, items.len(), order.amount);
        Ok(OrderWithItems { order, items })
    }

    /// Confirm a pending order: calculate the authoritative tax, create the payment intent and
    /// attach it to the order, then clear the cart.
    ///
    /// The provider-side idempotency key makes a retry after a transport failure return the same
    /// intent, and the write-once intent id on the order makes the database update converge.
    pub async fn confirm_order(&self, user_id: i64, order_id: i64) -> Result<PaymentIntentInfo, OrderEngineError> {
        let order = self
            .db
            .fetch_order(order_id)
            .await?
            .filter(|o| o.user_id == user_id)
            .ok_or(OrderEngineError::OrderNotFound(order_id))?;
        if order.status != OrderStatus::Pending {
            return Err(OrderEngineError::InvalidState(format!(
                "Order {order_id} is {} and can no longer be confirmed",
                order.status
            )));
        }
        let address = self
            .db
            .fetch_address(order.shipping_address_id)
            .await?
            .ok_or(OrderEngineError::AddressNotFound(order.shipping_address_id))?;
        let items = self.db.fetch_order_items(order_id).await?;
        let tax = self.tax.calculate_tax(order_id, &order.currency, &address, &items).await?;
        let total = order.amount + tax + order.shipping_amount;
        trace!("🔄️📦️ Order {order_id}: amount {} + tax {tax} + shipping {} = {total}", order.amount, order.shipping_amount);
        let intent = self.payment.create_intent(order_id, total, &order.currency).await?;
        self.db.attach_payment_intent(order_id, tax, total, &intent.id).await?;
        self.db.clear_cart(user_id).await?;
        debug!("🔄️📦️ Order {order_id} confirmed with intent [{}], total {total}", intent.id);
        Ok(intent)
    }

    /// Apply a provider webhook event to the order it references.
    ///
    /// The event is first written to the idempotency log; a duplicate id short-circuits without
    /// touching any order. Transitions follow the state table, with terminal states sticky:
    ///
    /// | Current | Event                         | New      | Side effect                        |
    /// |---------|-------------------------------|----------|-------------------------------------|
    /// | pending | payment_intent.succeeded      | paid     | inventory decremented per item      |
    /// | pending | payment_intent.payment_failed | pending  | failure reason recorded             |
    /// | pending | payment_intent.canceled       | canceled | none                                |
    /// | paid    | refund.created (full)         | refunded | inventory restocked                 |
    /// | paid    | refund.created (partial)      | paid     | partial refund amount recorded      |
    pub async fn apply_webhook_event(&self, event: PaymentEventPayload) -> Result<WebhookOutcome, OrderEngineError> {
        let inserted = self.db.insert_payment_event(&event.id, &event.event_type, &event.raw).await?;
        if !inserted {
            debug!("🔄️💰️ Event [{}] has already been processed. Ignoring the redelivery.", event.id);
            return Ok(WebhookOutcome::Duplicate);
        }
        let Some(intent_id) = event.payment_intent_id.as_deref() else {
            debug!("🔄️💰️ Event [{}] ({}) carries no payment intent. Stored but not applied.", event.id, event.event_type);
            return Ok(WebhookOutcome::OrderNotFound);
        };
        let Some(order) = self.db.fetch_order_by_intent(intent_id).await? else {
            warn!("🔄️💰️ Event [{}] references intent [{intent_id}], but no order matches it.", event.id);
            return Ok(WebhookOutcome::OrderNotFound);
        };
        let outcome = match event.event_type.as_str() {
            "payment_intent.succeeded" => self.handle_payment_succeeded(&event, &order).await?,
            "payment_intent.payment_failed" => self.handle_payment_failed(&event, &order).await?,
            "payment_intent.canceled" => self.handle_intent_canceled(&event, &order).await?,
            "refund.created" => self.handle_refund_created(&event, &order).await?,
            other => {
                debug!("🔄️💰️ Event [{}] ({other}) requires no transition for order {}.", event.id, order.id);
                WebhookOutcome::Ignored(order)
            },
        };
        if matches!(outcome, WebhookOutcome::Applied(_)) {
            self.db.mark_payment_event_processed(&event.id).await?;
        }
        Ok(outcome)
    }

    async fn handle_payment_succeeded(
        &self,
        event: &PaymentEventPayload,
        order: &Order,
    ) -> Result<WebhookOutcome, OrderEngineError> {
        let outcome = self.db.mark_order_paid(order.id).await?;
        if outcome.changed {
            info!("🔄️💰️ Order {} is paid (event [{}]).", order.id, event.id);
            self.call_order_paid_hook(&outcome.order).await;
            Ok(WebhookOutcome::Applied(outcome.order))
        } else {
            warn!(
                "🔄️💰️ Payment succeeded for order {} but its status is already {}. The money has been taken; an \
                 operator should reconcile this order.",
                order.id, outcome.order.status
            );
            Ok(WebhookOutcome::Ignored(outcome.order))
        }
    }

    async fn handle_payment_failed(
        &self,
        event: &PaymentEventPayload,
        order: &Order,
    ) -> Result<WebhookOutcome, OrderEngineError> {
        let reason = event.failure_reason.as_deref().unwrap_or("unspecified");
        let outcome = self.db.record_payment_failure(order.id, reason).await?;
        if outcome.changed {
            info!("🔄️💰️ Payment failed for order {}: {reason}. The order stays pending and can be retried.", order.id);
            Ok(WebhookOutcome::Applied(outcome.order))
        } else {
            debug!("🔄️💰️ Payment failure for order {} arrived after the order left pending. Ignored.", order.id);
            Ok(WebhookOutcome::Ignored(outcome.order))
        }
    }

    async fn handle_intent_canceled(
        &self,
        event: &PaymentEventPayload,
        order: &Order,
    ) -> Result<WebhookOutcome, OrderEngineError> {
        let outcome = self.db.cancel_order(order.id).await?;
        if outcome.changed {
            info!("🔄️💰️ Order {} canceled by the provider (event [{}]).", order.id, event.id);
            self.call_order_annulled_hook(&outcome.order).await;
            Ok(WebhookOutcome::Applied(outcome.order))
        } else {
            debug!("🔄️💰️ Cancel event for order {} in status {}. Ignored.", order.id, outcome.order.status);
            Ok(WebhookOutcome::Ignored(outcome.order))
        }
    }

    async fn handle_refund_created(
        &self,
        event: &PaymentEventPayload,
        order: &Order,
    ) -> Result<WebhookOutcome, OrderEngineError> {
        // A refund event without an amount refunds whatever remains on the order.
        let amount = event.refund_amount.unwrap_or(order.total_amount - order.refunded_amount);
        let outcome = self.db.apply_refund(order.id, amount).await?;
        if outcome.changed {
            if outcome.order.status == OrderStatus::Refunded {
                info!("🔄️💰️ Order {} fully refunded ({amount}); inventory restocked.", order.id);
                self.call_order_annulled_hook(&outcome.order).await;
            } else {
                info!("🔄️💰️ Order {} partially refunded: {amount} of {}.", order.id, outcome.order.total_amount);
            }
            Ok(WebhookOutcome::Applied(outcome.order))
        } else {
            debug!("🔄️💰️ Refund event for order {} in status {}. Ignored.", order.id, outcome.order.status);
            Ok(WebhookOutcome::Ignored(outcome.order))
        }
    }

    /// Cancel every pending order older than `ttl` and best-effort cancel its payment intent.
    /// Provider failures are logged and swallowed; the local cancellation is authoritative.
    pub async fn cancel_stale_orders(&self, ttl: Duration) -> Result<Vec<Order>, OrderEngineError> {
        let canceled = self.db.cancel_stale_orders(ttl).await?;
        for order in &canceled {
            if let Some(intent_id) = order.payment_intent_id.as_deref() {
                if let Err(e) = self.payment.cancel_intent(intent_id).await {
                    warn!("🔄️🕰️ Could not cancel intent [{intent_id}] for stale order {}: {e}", order.id);
                }
            }
            self.call_order_annulled_hook(order).await;
        }
        if !canceled.is_empty() {
            info!("🔄️🕰️ Canceled {} stale orders", canceled.len());
        }
        Ok(canceled)
    }

    pub async fn fetch_order(&self, order_id: i64) -> Result<Option<OrderWithItems>, OrderEngineError> {
        let Some(order) = self.db.fetch_order(order_id).await? else {
            return Ok(None);
        };
        let items = self.db.fetch_order_items(order_id).await?;
        Ok(Some(OrderWithItems { order, items }))
    }

    /// The order, with items, if it exists and belongs to the user.
    pub async fn fetch_order_for_user(
        &self,
        user_id: i64,
        order_id: i64,
    ) -> Result<Option<OrderWithItems>, OrderEngineError> {
        Ok(self.fetch_order(order_id).await?.filter(|o| o.order.user_id == user_id))
    }

    pub async fn fetch_orders_for_user(&self, user_id: i64) -> Result<Vec<Order>, OrderEngineError> {
        self.db.fetch_orders_for_user(user_id).await
    }

    pub async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderEngineError> {
        self.db.search_orders(query).await
    }

    async fn call_order_paid_hook(&self, order: &Order) {
        for emitter in &self.producers.order_paid_producer {
            trace!("🔄️📦️ Notifying order paid hook subscribers");
            emitter.publish_event(OrderPaidEvent::new(order.clone())).await;
        }
    }

    async fn call_order_annulled_hook(&self, order: &Order) {
        for emitter in &self.producers.order_annulled_producer {
            trace!("🔄️📦️ Notifying order annulled hook subscribers");
            emitter.publish_event(OrderAnnulledEvent::new(order.clone())).await;
        }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

/// A zero-tax stand-in for environments without a tax provider configured (tests, development).
#[derive(Debug, Clone, Default)]
pub struct NullTaxProvider;

impl TaxProvider for NullTaxProvider {
    async fn calculate_tax(
        &self,
        _order_ref: i64,
        _currency: &str,
        _address: &crate::db_types::Address,
        _items: &[crate::db_types::OrderItem],
    ) -> Result<Money, crate::traits::ProviderError> {
        Ok(Money::from(0))
    }
}
