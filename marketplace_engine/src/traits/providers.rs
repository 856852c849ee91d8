use mps_common::Money;
use thiserror::Error;

use crate::{
    db_types::{Address, OrderItem},
    traits::data_objects::PaymentIntentInfo,
};

/// The payment provider seam. The server crate implements this over the provider's HTTP API; the
/// order flow only ever sees the trait, which keeps the engine testable without a network.
#[allow(async_fn_in_trait)]
pub trait PaymentProvider: Clone {
    /// Create (or, thanks to the idempotency key, re-fetch) the payment intent for an order.
    /// Calling this twice with the same order id returns the same intent.
    async fn create_intent(&self, order_id: i64, amount: Money, currency: &str)
        -> Result<PaymentIntentInfo, ProviderError>;

    /// Best-effort cancellation of an intent that will never be paid.
    async fn cancel_intent(&self, intent_id: &str) -> Result<(), ProviderError>;
}

/// The authoritative tax calculation seam.
#[allow(async_fn_in_trait)]
pub trait TaxProvider: Clone {
    /// Returns the total tax (inclusive + exclusive) for the order, in minor units.
    async fn calculate_tax(
        &self,
        order_ref: i64,
        currency: &str,
        address: &Address,
        items: &[OrderItem],
    ) -> Result<Money, ProviderError>;
}

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("Provider returned {status}: {message}")]
    Upstream { status: u16, message: String },
    #[error("Transport error talking to the provider: {0}")]
    Transport(String),
}

impl ProviderError {
    /// Transport failures are safe to retry because every mutating call carries an idempotency
    /// key. Upstream rejections are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Transport(_))
    }
}
