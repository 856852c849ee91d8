use serde::{Deserialize, Serialize};

use crate::db_types::{Order, OrderStatus};

/// Fired when an order reaches `Paid` through the webhook flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPaidEvent {
    pub order: Order,
}

impl OrderPaidEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// Fired when an order is canceled or refunded, by whatever path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAnnulledEvent {
    pub order: Order,
    pub status: OrderStatus,
}

impl OrderAnnulledEvent {
    pub fn new(order: Order) -> Self {
        let status = order.status;
        Self { order, status }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailPurpose {
    RegistrationCode,
    PasswordResetCode,
}

/// A request to deliver a confirmation code out-of-band. The engine never sends mail itself; a
/// hook subscriber owns delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailEvent {
    pub to: String,
    pub purpose: EmailPurpose,
    pub code: String,
}

impl EmailEvent {
    pub fn registration(to: String, code: String) -> Self {
        Self { to, purpose: EmailPurpose::RegistrationCode, code }
    }

    pub fn password_reset(to: String, code: String) -> Self {
        Self { to, purpose: EmailPurpose::PasswordResetCode, code }
    }
}

#[cfg(test)]
mod test {
    use chrono::Utc;
    use mps_common::Money;

    use super::*;

    fn paid_order() -> Order {
        Order {
            id: 42,
            user_id: 7,
            shipping_address_id: 1,
            currency: "usd".to_string(),
            amount: Money::from(2_500),
            tax_amount: Money::from(200),
            shipping_amount: Money::from(0),
            total_amount: Money::from(2_700),
            status: OrderStatus::Paid,
            payment_intent_id: Some("pi_42".to_string()),
            failure_reason: None,
            refunded_amount: Money::from(0),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn events_round_trip_through_serde() {
        let event = OrderAnnulledEvent::new(paid_order());
        let json = serde_json::to_string(&event).unwrap();
        let back: OrderAnnulledEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);

        let event = OrderPaidEvent::new(paid_order());
        let json = serde_json::to_string(&event).unwrap();
        let back: OrderPaidEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
    }
}
