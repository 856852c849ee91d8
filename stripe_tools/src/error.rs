use thiserror::Error;

#[derive(Debug, Error)]
pub enum StripeApiError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("Could not deserialize JSON: {0}")]
    JsonError(String),
    #[error("Provider returned an error. Status {status}. {message}")]
    ProviderError { status: u16, message: String },
    #[error("Request to provider timed out or failed in transit: {0}")]
    Transport(String),
    #[error("Webhook signature header is malformed: {0}")]
    MalformedSignature(String),
    #[error("Webhook signature did not verify")]
    BadSignature,
    #[error("Webhook timestamp is outside the accepted tolerance")]
    StaleSignature,
}

impl StripeApiError {
    /// Transport-level failures are safe to retry with the same idempotency
    /// key; provider rejections are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
