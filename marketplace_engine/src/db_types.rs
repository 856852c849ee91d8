use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use log::error;
use mps_common::Money;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

//--------------------------------------        Role          ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Guest,
    User,
    Admin,
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Guest => write!(f, "guest"),
            Role::User => write!(f, "user"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid role: {0}")]
pub struct RoleConversionError(String);

impl FromStr for Role {
    type Err = RoleConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "guest" => Ok(Role::Guest),
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            s => Err(RoleConversionError(s.to_string())),
        }
    }
}

//--------------------------------------        User          ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------     PendingUser      ---------------------------------------------------------
/// A registration that has been started but not yet confirmed with the emailed code.
#[derive(Debug, Clone, FromRow)]
pub struct PendingUser {
    pub id: i64,
    pub email: String,
    pub code_hash: String,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

impl PendingUser {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

//--------------------------------------  PasswordResetCode   ---------------------------------------------------------
#[derive(Debug, Clone, FromRow)]
pub struct PasswordResetCode {
    pub id: i64,
    pub user_id: i64,
    pub code_hash: String,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

impl PasswordResetCode {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

//--------------------------------------    RefreshToken      ---------------------------------------------------------
/// The server-side record of a refresh token. Only the HMAC of the secret is stored; the secret
/// itself is handed to the client once and never persisted.
#[derive(Debug, Clone, FromRow)]
pub struct RefreshToken {
    pub id: i64,
    pub user_id: i64,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub last_used: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------       Product        ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub price: Money,
    pub description: String,
    pub tax_code: Option<String>,
    pub thumbnail: Option<String>,
    pub inventory: i64,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub price: Money,
    pub description: String,
    pub tax_code: Option<String>,
    pub thumbnail: Option<String>,
    pub inventory: i64,
}

//--------------------------------------      CartItem        ---------------------------------------------------------
/// A line in a user's cart. `unit_price` is a snapshot taken when the item was added; the
/// authoritative price is re-read from the product at order creation.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CartItem {
    pub user_id: i64,
    pub product_id: i64,
    pub quantity: i64,
    pub unit_price: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------       Address        ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Address {
    pub id: i64,
    pub user_id: i64,
    /// ISO-3166-1 alpha-2 country code
    pub country: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub state: Option<String>,
    pub postal_code: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAddress {
    pub country: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub state: Option<String>,
    pub postal_code: String,
    pub email: Option<String>,
}

//--------------------------------------     OrderStatus      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Fulfilled,
    Shipped,
    Delivered,
    Refunded,
    Canceled,
}

impl OrderStatus {
    /// Terminal statuses never transition again, with the single exception of `Paid -> Refunded`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }

    /// The forward fulfilment chain and the two annulment edges:
    ///
    /// | From \ To | Paid | Fulfilled | Shipped | Delivered | Refunded | Canceled |
    /// |-----------|------|-----------|---------|-----------|----------|----------|
    /// | Pending   | yes  |           |         |           |          | yes      |
    /// | Paid      |      | yes       |         |           | yes      |          |
    /// | Fulfilled |      |           | yes     |           |          |          |
    /// | Shipped   |      |           |         | yes       |          |          |
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Paid) | (Pending, Canceled) | (Paid, Fulfilled) | (Paid, Refunded) | (Fulfilled, Shipped) | (Shipped, Delivered)
        )
    }
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Fulfilled => "fulfilled",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Refunded => "refunded",
            OrderStatus::Canceled => "canceled",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid order status: {0}")]
pub struct StatusConversionError(String);

impl FromStr for OrderStatus {
    type Err = StatusConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "fulfilled" => Ok(Self::Fulfilled),
            "shipped" => Ok(Self::Shipped),
            "delivered" => Ok(Self::Delivered),
            "refunded" => Ok(Self::Refunded),
            "canceled" => Ok(Self::Canceled),
            s => Err(StatusConversionError(s.to_string())),
        }
    }
}

impl From<String> for OrderStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid order status stored in the database: {value}. Defaulting to Pending");
            OrderStatus::Pending
        })
    }
}

//--------------------------------------        Order         ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub shipping_address_id: i64,
    pub currency: String,
    /// Sum of `unit_price * quantity` over the order items
    pub amount: Money,
    pub tax_amount: Money,
    pub shipping_amount: Money,
    /// `amount + tax_amount + shipping_amount` once the order is confirmed
    pub total_amount: Money,
    pub status: OrderStatus,
    pub payment_intent_id: Option<String>,
    pub failure_reason: Option<String>,
    pub refunded_amount: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------      OrderItem       ---------------------------------------------------------
/// A snapshot of a cart line frozen at order creation. Prices are copied from the product at that
/// moment and never re-read.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OrderItem {
    pub order_id: i64,
    pub product_id: i64,
    pub quantity: i64,
    pub unit_price: Money,
    pub product_name: String,
    pub thumbnail: Option<String>,
    pub tax_code: Option<String>,
}

//--------------------------------------    PaymentEvent      ---------------------------------------------------------
/// The idempotency log for webhook deliveries. The primary key is the provider's event id, so a
/// redelivery fails the insert and is dropped without touching any order.
#[derive(Debug, Clone, FromRow)]
pub struct PaymentEvent {
    pub id: String,
    pub event_type: String,
    pub payload: String,
    pub processed: bool,
    pub received_at: DateTime<Utc>,
}

//--------------------------------------   RateLimitEntry     ---------------------------------------------------------
#[derive(Debug, Clone, FromRow)]
pub struct RateLimitEntry {
    pub ip_address: String,
    pub path: String,
    pub hit_count: i64,
    pub expires_at: DateTime<Utc>,
}

//--------------------------------------     JobSchedule      ---------------------------------------------------------
#[derive(Debug, Clone, FromRow)]
pub struct JobSchedule {
    pub job_name: String,
    pub last_run_at: DateTime<Utc>,
}

//--------------------------------------    ShippingZone      ---------------------------------------------------------
/// A destination the store ships to. `state_code` and `postal_code` of `None` act as wildcards.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ShippingZone {
    pub id: i64,
    pub country: String,
    pub state_code: Option<String>,
    pub postal_code: Option<String>,
}

/// A (country, postal_code) pair the store refuses to ship to, even if a zone matches.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ShippingExclusion {
    pub id: i64,
    pub country: String,
    pub postal_code: String,
}

//--------------------------------------      TaxRate         ---------------------------------------------------------
/// A local tax rate in basis points, keyed on (country, state?, tax_code?) with NULLs acting as
/// fallback buckets.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TaxRate {
    pub country: String,
    pub state: Option<String>,
    pub tax_code: Option<String>,
    pub rate_bps: i64,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_round_trip() {
        for s in ["pending", "paid", "fulfilled", "shipped", "delivered", "refunded", "canceled"] {
            let status = s.parse::<OrderStatus>().unwrap();
            assert_eq!(status.to_string(), s);
        }
        assert!("payed".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn transition_table() {
        use OrderStatus::*;
        assert!(Pending.can_transition_to(Paid));
        assert!(Pending.can_transition_to(Canceled));
        assert!(Paid.can_transition_to(Refunded));
        assert!(Paid.can_transition_to(Fulfilled));
        assert!(Fulfilled.can_transition_to(Shipped));
        assert!(Shipped.can_transition_to(Delivered));
        // no regressions
        assert!(!Paid.can_transition_to(Pending));
        assert!(!Delivered.can_transition_to(Refunded));
        assert!(!Canceled.can_transition_to(Paid));
        assert!(!Refunded.can_transition_to(Paid));
    }

    #[test]
    fn terminal_statuses() {
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(OrderStatus::Paid.is_terminal());
        assert!(OrderStatus::Canceled.is_terminal());
        assert!(OrderStatus::Refunded.is_terminal());
    }

    #[test]
    fn role_round_trip() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("guest".parse::<Role>().unwrap(), Role::Guest);
        assert_eq!(Role::User.to_string(), "user");
        assert_eq!(Role::Guest.to_string(), "guest");
        assert!("root".parse::<Role>().is_err());
    }
}
