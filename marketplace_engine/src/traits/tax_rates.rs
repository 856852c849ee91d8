use thiserror::Error;

use crate::db_types::TaxRate;

/// Local tax rate table, used for the non-authoritative estimate path.
#[allow(async_fn_in_trait)]
pub trait TaxRateStore: Clone {
    /// Fetch the most specific rate for the key, falling back
    /// `(country, state, code) -> (country, state, NULL) -> (country, NULL, NULL)`.
    async fn fetch_tax_rate(
        &self,
        country: &str,
        state: Option<&str>,
        tax_code: Option<&str>,
    ) -> Result<Option<TaxRate>, TaxRateError>;

    /// Insert or replace the rate for the exact key.
    async fn set_tax_rate(&self, rate: &TaxRate) -> Result<(), TaxRateError>;
}

#[derive(Debug, Clone, Error)]
pub enum TaxRateError {
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for TaxRateError {
    fn from(e: sqlx::Error) -> Self {
        TaxRateError::DatabaseError(e.to_string())
    }
}
