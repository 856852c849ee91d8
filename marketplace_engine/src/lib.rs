//! Marketplace Payment Engine
//!
//! This library contains the core logic for the marketplace backend: the order and payment state
//! machine, carts, authentication records, shipping eligibility, rate limiting, tax estimates and
//! the persistent job scheduler. It is HTTP-framework agnostic and payment-provider agnostic.
//!
//! The library is divided into two main sections:
//! 1. Storage contracts and their SQLite implementation ([`mod@traits`] / `SqliteDatabase`). You
//!    should never need to access the database directly; use the public APIs instead. The
//!    exception is the data types stored in the database, which live in [`mod@db_types`] and are
//!    public.
//! 2. The engine public APIs ([`OrderFlowApi`], [`AuthApi`], [`CartApi`] and friends). These are
//!    generic over the storage traits, so any backend implementing the traits can drive them.
//!
//! The engine also emits events (order paid, order annulled, confirmation email requests) through
//! a small actor framework so callers can hook side effects without the engine knowing about
//! them.

pub mod db_types;
pub mod events;
pub mod helpers;
mod mpe_api;
pub mod traits;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use mpe_api::{
    auth_api::AuthApi,
    cart_api::CartApi,
    order_flow_api::{NullTaxProvider, OrderFlowApi},
    order_objects,
    rate_limit_api::RateLimitApi,
    shipping_api::ShippingApi,
    tax_api::TaxApi,
};
