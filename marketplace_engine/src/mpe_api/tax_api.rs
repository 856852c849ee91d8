use log::*;
use mps_common::Money;

use crate::{
    db_types::{Address, OrderItem, TaxRate},
    traits::{TaxRateError, TaxRateStore},
};

/// Local, non-authoritative tax estimates from the `tax_rates` table. The authoritative number
/// comes from the tax provider at order confirmation; this API only powers the estimate endpoint.
#[derive(Debug, Clone)]
pub struct TaxApi<B> {
    db: B,
}

impl<B> TaxApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B: TaxRateStore> TaxApi<B> {
    /// Estimate the tax for the items shipped to the address. Each line falls back from the most
    /// specific rate bucket to the country-wide one; lines with no matching bucket contribute
    /// zero.
    pub async fn estimate_tax(&self, address: &Address, items: &[OrderItem]) -> Result<Money, TaxRateError> {
        let mut total = Money::from(0);
        for item in items {
            let rate = self
                .db
                .fetch_tax_rate(&address.country, address.state.as_deref(), item.tax_code.as_deref())
                .await?;
            match rate {
                Some(rate) => {
                    // rate is in basis points
                    let line = item.unit_price.value() * item.quantity * rate.rate_bps / 10_000;
                    total += Money::from(line);
                },
                None => {
                    trace!(
                        "💸️ No tax rate for ({}, {:?}, {:?}); the line contributes no tax",
                        address.country, address.state, item.tax_code
                    );
                },
            }
        }
        Ok(total)
    }

    pub async fn set_rate(&self, rate: &TaxRate) -> Result<(), TaxRateError> {
        self.db.set_tax_rate(rate).await
    }
}
