use mps_common::Money;
use serde::{Deserialize, Serialize};
use serde_json::Value;

//--------------------------------------   PaymentIntent   ------------------------------------------------------------
/// The subset of a Stripe payment-intent object the order flow needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
    pub status: String,
    #[serde(default)]
    pub amount: Money,
    #[serde(default)]
    pub currency: String,
}

//--------------------------------------   TaxCalculation   -----------------------------------------------------------
/// Result of a `/v1/tax/calculations` call. Amounts are minor units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxCalculation {
    pub id: String,
    pub tax_amount_inclusive: Money,
    pub tax_amount_exclusive: Money,
    #[serde(default)]
    pub amount_total: Money,
}

impl TaxCalculation {
    /// The total tax to add to the order.
    pub fn total_tax(&self) -> Money {
        self.tax_amount_inclusive + self.tax_amount_exclusive
    }
}

/// A line item submitted to the tax calculation endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct TaxLineItem {
    /// `unit_price × quantity`, in minor units.
    pub amount: Money,
    pub quantity: i64,
    pub tax_code: Option<String>,
    /// `"<order_ref>:<product_id>"`, so calculation lines can be traced back.
    pub reference: String,
}

/// A shipping destination in the provider's address format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeAddress {
    pub country: String,
    pub line1: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    pub city: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub postal_code: String,
}

//--------------------------------------   Webhook events   -----------------------------------------------------------
/// A webhook event envelope as delivered by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeEvent {
    /// The provider's unique event id (`evt_…`). This is the idempotency key
    /// for webhook delivery retries.
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub created: i64,
    pub data: StripeEventData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeEventData {
    pub object: StripeEventObject,
}

/// The `data.object` of a webhook event. Stripe sends different object types
/// per event family; the fields here cover payment intents and refunds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeEventObject {
    /// `"payment_intent"` or `"refund"`.
    #[serde(default)]
    pub object: String,
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub amount: Money,
    /// Set on refund objects: the intent the refund applies to.
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub last_payment_error: Option<Value>,
}

impl StripeEvent {
    /// The payment intent id this event pertains to, regardless of whether
    /// the payload object is the intent itself or a refund against it.
    pub fn payment_intent_id(&self) -> Option<&str> {
        match self.data.object.object.as_str() {
            "payment_intent" => Some(self.data.object.id.as_str()),
            _ => self.data.object.payment_intent.as_deref(),
        }
    }

    pub fn is_refund_event(&self) -> bool {
        self.event_type.starts_with("refund.")
    }

    /// Human-readable failure reason from `last_payment_error`, if present.
    pub fn failure_reason(&self) -> Option<String> {
        self.data.object.last_payment_error.as_ref().map(|e| {
            e.get("message").and_then(Value::as_str).map(str::to_string).unwrap_or_else(|| e.to_string())
        })
    }
}

/// The refund details of a `refund.*` event, if the payload carries them.
#[derive(Debug, Clone)]
pub struct WebhookRefund {
    pub refund_id: String,
    pub payment_intent_id: String,
    pub amount: Money,
    pub status: String,
}

impl StripeEvent {
    pub fn refund(&self) -> Option<WebhookRefund> {
        if !self.is_refund_event() {
            return None;
        }
        let intent = self.data.object.payment_intent.clone()?;
        Some(WebhookRefund {
            refund_id: self.data.object.id.clone(),
            payment_intent_id: intent,
            amount: self.data.object.amount,
            status: self.data.object.status.clone(),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const INTENT_EVENT: &str = r#"{
        "id": "evt_1",
        "type": "payment_intent.succeeded",
        "created": 1717171717,
        "data": { "object": {
            "object": "payment_intent",
            "id": "pi_abc",
            "status": "succeeded",
            "amount": 3698,
            "currency": "usd"
        }}
    }"#;

    const REFUND_EVENT: &str = r#"{
        "id": "evt_2",
        "type": "refund.created",
        "data": { "object": {
            "object": "refund",
            "id": "re_1",
            "status": "succeeded",
            "amount": 3698,
            "payment_intent": "pi_abc"
        }}
    }"#;

    #[test]
    fn deserialize_intent_event() {
        let ev: StripeEvent = serde_json::from_str(INTENT_EVENT).unwrap();
        assert_eq!(ev.id, "evt_1");
        assert_eq!(ev.event_type, "payment_intent.succeeded");
        assert_eq!(ev.payment_intent_id(), Some("pi_abc"));
        assert!(!ev.is_refund_event());
        assert!(ev.refund().is_none());
    }

    #[test]
    fn deserialize_refund_event() {
        let ev: StripeEvent = serde_json::from_str(REFUND_EVENT).unwrap();
        assert_eq!(ev.payment_intent_id(), Some("pi_abc"));
        let refund = ev.refund().unwrap();
        assert_eq!(refund.refund_id, "re_1");
        assert_eq!(refund.amount, Money::from(3698));
    }
}
