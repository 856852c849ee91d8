mod stripe;

pub use stripe::{payload_from_event, StripeGateway};
