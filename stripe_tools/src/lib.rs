//! # Stripe tools
//!
//! A narrow client for the slice of the Stripe API the payment server uses:
//! payment intents, tax calculations, and webhook event verification.
//!
//! Requests are `application/x-www-form-urlencoded` (Stripe convention);
//! responses are JSON. Every mutating call carries an `Idempotency-Key`
//! header so transport-level retries converge on the same provider object.
mod api;
mod config;
mod error;
mod webhook;

mod data_objects;

pub use api::StripeApi;
pub use config::StripeConfig;
pub use data_objects::{
    PaymentIntent,
    StripeAddress,
    StripeEvent,
    StripeEventObject,
    TaxCalculation,
    TaxLineItem,
    WebhookRefund,
};
pub use error::StripeApiError;
pub use webhook::{is_supported_event, verify_webhook_signature, DEFAULT_SIGNATURE_TOLERANCE_SECS};
