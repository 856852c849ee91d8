//! The engine's public APIs. Each API is generic over the storage traits in [`crate::traits`],
//! holding a backend instance plus whatever event producers or secrets it needs.
pub mod auth_api;
pub mod cart_api;
pub mod order_flow_api;
pub mod order_objects;
pub mod rate_limit_api;
pub mod shipping_api;
pub mod tax_api;
