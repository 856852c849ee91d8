use log::*;
use mps_common::Secret;

pub const DEFAULT_STRIPE_BASE_URL: &str = "https://api.stripe.com";

#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// Base URL for the Stripe API. Overridable so tests can point at a stub server.
    pub base_url: String,
    pub secret_key: Secret<String>,
    pub webhook_signing_secret: Secret<String>,
    /// Per-call timeout for outbound requests, in seconds.
    pub timeout_secs: u64,
}

impl Default for StripeConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_STRIPE_BASE_URL.to_string(),
            secret_key: Secret::default(),
            webhook_signing_secret: Secret::default(),
            timeout_secs: 10,
        }
    }
}

impl StripeConfig {
    pub fn new_from_env_or_default() -> Self {
        let base_url = std::env::var("STRIPE_BASE_URL").unwrap_or_else(|_| DEFAULT_STRIPE_BASE_URL.to_string());
        let secret_key = Secret::new(std::env::var("STRIPE_SECRET_KEY").unwrap_or_else(|_| {
            warn!("STRIPE_SECRET_KEY not set. Calls against the payment provider will be rejected.");
            String::default()
        }));
        let webhook_signing_secret = Secret::new(std::env::var("STRIPE_WEBHOOK_SIGNING_SECRET").unwrap_or_else(|_| {
            warn!("STRIPE_WEBHOOK_SIGNING_SECRET not set. Incoming webhook events cannot be verified.");
            String::default()
        }));
        Self { base_url, secret_key, webhook_signing_secret, timeout_secs: 10 }
    }
}
