//! Glue between the engine's provider seams and the `stripe_tools` client.
//!
//! [`StripeGateway`] implements both [`PaymentProvider`] and [`TaxProvider`], so one instance is
//! plugged into the order flow for intent creation, intent cancellation and authoritative tax.

use marketplace_engine::{
    db_types::{Address, OrderItem},
    traits::{PaymentEventPayload, PaymentIntentInfo, PaymentProvider, ProviderError, TaxProvider},
};
use mps_common::Money;
use stripe_tools::{StripeAddress, StripeApi, StripeApiError, StripeConfig, StripeEvent, TaxLineItem};

use crate::errors::ServerError;

#[derive(Clone)]
pub struct StripeGateway {
    api: StripeApi,
}

impl StripeGateway {
    pub fn new(config: StripeConfig) -> Result<Self, ServerError> {
        let api = StripeApi::new(config).map_err(|e| ServerError::InitializeError(e.to_string()))?;
        Ok(Self { api })
    }

    pub fn api(&self) -> &StripeApi {
        &self.api
    }
}

impl PaymentProvider for StripeGateway {
    async fn create_intent(
        &self,
        order_id: i64,
        amount: Money,
        currency: &str,
    ) -> Result<PaymentIntentInfo, ProviderError> {
        let intent = self.api.create_payment_intent(order_id, amount, currency).await.map_err(provider_error)?;
        Ok(PaymentIntentInfo { id: intent.id, client_secret: intent.client_secret, status: intent.status })
    }

    async fn cancel_intent(&self, intent_id: &str) -> Result<(), ProviderError> {
        self.api.cancel_payment_intent(intent_id).await.map(|_| ()).map_err(provider_error)
    }
}

impl TaxProvider for StripeGateway {
    async fn calculate_tax(
        &self,
        order_ref: i64,
        currency: &str,
        address: &Address,
        items: &[OrderItem],
    ) -> Result<Money, ProviderError> {
        let lines = items.iter().map(|item| tax_line(order_ref, item)).collect::<Vec<TaxLineItem>>();
        let calc = self
            .api
            .create_tax_calculation(order_ref, currency, &stripe_address(address), &lines)
            .await
            .map_err(provider_error)?;
        Ok(calc.total_tax())
    }
}

fn provider_error(e: StripeApiError) -> ProviderError {
    match e {
        StripeApiError::ProviderError { status, message } => ProviderError::Upstream { status, message },
        other => ProviderError::Transport(other.to_string()),
    }
}

fn stripe_address(address: &Address) -> StripeAddress {
    StripeAddress {
        country: address.country.clone(),
        line1: address.line1.clone(),
        line2: address.line2.clone(),
        city: address.city.clone(),
        state: address.state.clone(),
        postal_code: address.postal_code.clone(),
    }
}

fn tax_line(order_ref: i64, item: &OrderItem) -> TaxLineItem {
    TaxLineItem {
        amount: item.unit_price * item.quantity,
        quantity: item.quantity,
        tax_code: item.tax_code.clone(),
        reference: format!("{order_ref}:{}", item.product_id),
    }
}

/// Normalize a verified provider event into the engine's webhook payload. The raw body travels
/// along for the idempotency log.
pub fn payload_from_event(event: &StripeEvent, raw: &str) -> PaymentEventPayload {
    PaymentEventPayload {
        id: event.id.clone(),
        event_type: event.event_type.clone(),
        payment_intent_id: event.payment_intent_id().map(str::to_string),
        refund_amount: event.refund().map(|r| r.amount),
        failure_reason: event.failure_reason(),
        raw: raw.to_string(),
    }
}
