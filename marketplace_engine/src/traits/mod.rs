//! # Database management and control.
//!
//! This module defines the interface contracts that storage backends must implement to act as the
//! engine's database, plus the provider seams for the external payment and tax services.
//!
//! * [`OrderManagement`] is the heart of the engine: order creation, the payment state machine and
//!   the webhook idempotency log.
//! * [`CartManagement`] and [`CatalogManagement`] cover the cart, products and addresses.
//! * [`AuthManagement`] covers users, registration codes, password resets and refresh tokens.
//! * [`ShippingManagement`], [`RateLimitStore`], [`JobScheduler`] and [`TaxRateStore`] cover the
//!   remaining persistent services.
//! * [`PaymentProvider`] and [`TaxProvider`] are implemented over an HTTP client by the server
//!   crate; the engine only sees the trait.

mod auth_management;
mod cart_management;
mod catalog_management;
mod data_objects;
mod job_schedule;
mod order_management;
mod providers;
mod rate_limits;
mod shipping_management;
mod tax_rates;

pub use auth_management::{AuthApiError, AuthManagement};
pub use cart_management::{CartError, CartManagement};
pub use catalog_management::{CatalogError, CatalogManagement};
pub use data_objects::{PaymentEventPayload, PaymentIntentInfo, TransitionOutcome, WebhookOutcome};
pub use job_schedule::{JobScheduleError, JobScheduler};
pub use order_management::{OrderEngineError, OrderManagement};
pub use providers::{PaymentProvider, ProviderError, TaxProvider};
pub use rate_limits::{RateLimitError, RateLimitStore};
pub use shipping_management::{ShippingError, ShippingManagement};
pub use tax_rates::{TaxRateError, TaxRateStore};
