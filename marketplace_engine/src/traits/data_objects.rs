use mps_common::Money;
use serde::{Deserialize, Serialize};

use crate::db_types::Order;

/// The slice of a provider payment intent the engine cares about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntentInfo {
    pub id: String,
    pub client_secret: String,
    pub status: String,
}

/// A provider webhook event, normalized by the server layer before it reaches the engine. The
/// engine never parses provider JSON; it works off these fields plus the raw payload kept for the
/// idempotency log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentEventPayload {
    /// The provider's unique event id. Primary key of the idempotency log.
    pub id: String,
    /// e.g. `payment_intent.succeeded`, `refund.created`
    pub event_type: String,
    /// The payment intent the event refers to, when the provider includes one.
    pub payment_intent_id: Option<String>,
    /// Refund amount in minor units, for `refund.*` events.
    pub refund_amount: Option<Money>,
    /// Failure detail, for `payment_intent.payment_failed`.
    pub failure_reason: Option<String>,
    /// The raw request body, stored verbatim in the event log.
    pub raw: String,
}

/// The result of offering a single status transition to the database.
///
/// `changed == false` means the order was already past the requested transition; callers treat
/// this as a no-op rather than an error, because webhook retries and races make it routine.
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub order: Order,
    pub changed: bool,
}

impl TransitionOutcome {
    pub fn changed(order: Order) -> Self {
        Self { order, changed: true }
    }

    pub fn unchanged(order: Order) -> Self {
        Self { order, changed: false }
    }
}

/// What became of a webhook delivery after the idempotency gate.
#[derive(Debug, Clone)]
pub enum WebhookOutcome {
    /// The event id was already in the log. Nothing was applied.
    Duplicate,
    /// The event carried no intent id, or no order matches it. The event is persisted anyway.
    OrderNotFound,
    /// The transition in the state table was applied.
    Applied(Order),
    /// The order was found but its current status absorbs the event (terminal states are sticky).
    Ignored(Order),
}
