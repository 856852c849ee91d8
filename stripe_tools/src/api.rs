use std::{sync::Arc, time::Duration};

use log::*;
use mps_common::Money;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION},
    Client,
    Method,
};
use serde::de::DeserializeOwned;

use crate::{
    config::StripeConfig,
    data_objects::{PaymentIntent, StripeAddress, TaxCalculation, TaxLineItem},
    StripeApiError,
};

#[derive(Clone)]
pub struct StripeApi {
    config: StripeConfig,
    client: Arc<Client>,
}

impl StripeApi {
    pub fn new(config: StripeConfig) -> Result<Self, StripeApiError> {
        let mut headers = HeaderMap::with_capacity(1);
        let bearer = format!("Bearer {}", config.secret_key.reveal());
        let val = HeaderValue::from_str(&bearer).map_err(|e| StripeApiError::Initialization(e.to_string()))?;
        headers.insert(AUTHORIZATION, val);
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StripeApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    pub fn webhook_signing_secret(&self) -> &str {
        self.config.webhook_signing_secret.reveal()
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }

    /// Sends a form-encoded request and deserializes the JSON response.
    ///
    /// Non-2xx responses become [`StripeApiError::ProviderError`] with the
    /// upstream status and body. Timeouts and connection failures become
    /// [`StripeApiError::Transport`], which callers may retry with the same
    /// idempotency key.
    pub async fn form_query<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        form: &[(String, String)],
        idempotency_key: Option<&str>,
    ) -> Result<T, StripeApiError> {
        let url = self.url(path);
        trace!("Sending provider request: {method} {url}");
        let mut req = self.client.request(method, url).form(form);
        if let Some(key) = idempotency_key {
            req = req.header("Idempotency-Key", key);
        }
        let response = req.send().await.map_err(|e| StripeApiError::Transport(e.to_string()))?;
        if response.status().is_success() {
            trace!("Provider request successful. {}", response.status());
            response.json::<T>().await.map_err(|e| StripeApiError::JsonError(e.to_string()))
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.map_err(|e| StripeApiError::Transport(e.to_string()))?;
            Err(StripeApiError::ProviderError { status, message })
        }
    }

    /// Creates (or, on retry, re-fetches) the payment intent for an order.
    ///
    /// The idempotency key is derived from the order id, so calling this
    /// twice for the same order always yields the same intent.
    pub async fn create_payment_intent(
        &self,
        order_id: i64,
        amount: Money,
        currency: &str,
    ) -> Result<PaymentIntent, StripeApiError> {
        let form = vec![
            ("amount".to_string(), amount.value().to_string()),
            ("currency".to_string(), currency.to_string()),
            ("automatic_payment_methods[enabled]".to_string(), "true".to_string()),
            ("metadata[order_id]".to_string(), order_id.to_string()),
        ];
        let key = format!("order-{order_id}");
        debug!("Creating payment intent for order {order_id} ({amount} {currency})");
        let intent: PaymentIntent =
            self.form_query(Method::POST, "/v1/payment_intents", &form, Some(key.as_str())).await?;
        info!("Created payment intent {} for order {order_id}", intent.id);
        Ok(intent)
    }

    /// Cancels a payment intent. Used by the stale-order reclamation job; the
    /// cancellation is local-authoritative, so callers usually swallow errors.
    pub async fn cancel_payment_intent(&self, intent_id: &str) -> Result<PaymentIntent, StripeApiError> {
        let path = format!("/v1/payment_intents/{intent_id}/cancel");
        debug!("Cancelling payment intent {intent_id}");
        let intent: PaymentIntent = self.form_query(Method::POST, &path, &[], None).await?;
        info!("Cancelled payment intent {intent_id}");
        Ok(intent)
    }

    /// Computes authoritative tax for an order against the provider.
    ///
    /// The idempotency key is derived from `order_ref`, so retries after a
    /// transport failure return the original calculation.
    pub async fn create_tax_calculation(
        &self,
        order_ref: i64,
        currency: &str,
        address: &StripeAddress,
        items: &[TaxLineItem],
    ) -> Result<TaxCalculation, StripeApiError> {
        let mut form = vec![
            ("currency".to_string(), currency.to_string()),
            ("customer_details[address_source]".to_string(), "shipping".to_string()),
            ("customer_details[address][country]".to_string(), address.country.clone()),
            ("customer_details[address][line1]".to_string(), address.line1.clone()),
            ("customer_details[address][city]".to_string(), address.city.clone()),
            ("customer_details[address][postal_code]".to_string(), address.postal_code.clone()),
        ];
        if let Some(line2) = &address.line2 {
            form.push(("customer_details[address][line2]".to_string(), line2.clone()));
        }
        if let Some(state) = &address.state {
            form.push(("customer_details[address][state]".to_string(), state.clone()));
        }
        for (i, item) in items.iter().enumerate() {
            form.push((format!("line_items[{i}][amount]"), item.amount.value().to_string()));
            form.push((format!("line_items[{i}][quantity]"), item.quantity.to_string()));
            form.push((format!("line_items[{i}][reference]"), item.reference.clone()));
            form.push((format!("line_items[{i}][tax_behavior]"), "exclusive".to_string()));
            if let Some(code) = &item.tax_code {
                form.push((format!("line_items[{i}][tax_code]"), code.clone()));
            }
        }
        let key = format!("tax-calculation-{order_ref}");
        debug!("Requesting tax calculation for order {order_ref} ({} line items)", items.len());
        let calc: TaxCalculation =
            self.form_query(Method::POST, "/v1/tax/calculations", &form, Some(key.as_str())).await?;
        info!("Tax calculation for order {order_ref}: {} total tax", calc.total_tax());
        Ok(calc)
    }
}
