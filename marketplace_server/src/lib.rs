//! # Marketplace payment server
//!
//! The HTTP surface over [`marketplace_engine`]. It is responsible for:
//! * Account endpoints: registration with emailed confirmation codes, login, refresh-token
//!   rotation and password resets.
//! * Cart and order endpoints for authenticated users, including order confirmation against the
//!   payment provider.
//! * Receiving and verifying provider webhook events and feeding them to the order engine.
//! * Admin endpoints for order search and shipping zone management.
//! * The background scheduler that sweeps stale orders and purges expired auth records.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for the
//! full list.

pub mod auth;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod helpers;
pub mod integrations;
pub mod middleware;
pub mod routes;
pub mod scheduler;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
