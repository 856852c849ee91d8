//! Request and response bodies for the HTTP surface.

use chrono::{DateTime, Utc};
use marketplace_engine::{
    db_types::{Order, OrderStatus},
    order_objects::OrderQueryFilter,
};
use mps_common::Money;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmRegisterRequest {
    pub email: String,
    pub code: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmPasswordResetRequest {
    pub email: String,
    pub code: String,
    pub new_password: String,
}

/// The token pair handed out on confirmed registration, login and refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

impl TokenResponse {
    pub fn bearer(access_token: String, refresh_token: String, expires_in: i64) -> Self {
        Self { access_token, refresh_token, token_type: "Bearer".to_string(), expires_in }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItemRequest {
    pub quantity: i64,
}

/// Order creation takes the shipping address off the query string: `POST /orders?shipping_id=…`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrderParams {
    pub shipping_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxEstimateParams {
    pub country: String,
    pub state: Option<String>,
}

/// Admin order search parameters. Flat so it can come straight off the query string; `status`
/// takes a single value per request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderSearchParams {
    pub user_id: Option<i64>,
    pub currency: Option<String>,
    pub payment_intent_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub status: Option<OrderStatus>,
}

impl From<OrderSearchParams> for OrderQueryFilter {
    fn from(params: OrderSearchParams) -> Self {
        let mut query = OrderQueryFilter {
            user_id: params.user_id,
            currency: params.currency,
            payment_intent_id: params.payment_intent_id,
            since: params.since,
            until: params.until,
            status: None,
        };
        if let Some(status) = params.status {
            query = query.with_status(status);
        }
        query
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewShippingZoneRequest {
    pub country: String,
    pub state_code: Option<String>,
    pub postal_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewShippingExclusionRequest {
    pub country: String,
    pub postal_code: String,
}

/// The unauthenticated view of an order: enough for a payment-status page, nothing that
/// identifies the buyer or the goods.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicOrderSummary {
    pub id: i64,
    pub status: OrderStatus,
    pub currency: String,
    pub total_amount: Money,
    pub created_at: DateTime<Utc>,
}

impl From<&Order> for PublicOrderSummary {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id,
            status: order.status,
            currency: order.currency.clone(),
            total_amount: order.total_amount,
            created_at: order.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxEstimateResponse {
    pub currency: String,
    pub tax_amount: Money,
}

/// Generic message body for endpoints with nothing better to say.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub message: String,
}

impl JsonResponse {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self { message: message.into() }
    }
}

#[cfg(test)]
mod test {
    use actix_web::web::Query;

    use super::*;

    #[test]
    fn order_creation_takes_the_shipping_address_off_the_query_string() {
        let params = Query::<NewOrderParams>::from_query("shipping_id=42").unwrap();
        assert_eq!(params.shipping_id, 42);
        assert!(Query::<NewOrderParams>::from_query("").is_err());
    }

    #[test]
    fn tax_estimates_take_a_destination_off_the_query_string() {
        let params = Query::<TaxEstimateParams>::from_query("country=US&state=CA").unwrap();
        assert_eq!(params.country, "US");
        assert_eq!(params.state.as_deref(), Some("CA"));
        // State is optional; country is not.
        let params = Query::<TaxEstimateParams>::from_query("country=DE").unwrap();
        assert!(params.state.is_none());
        assert!(Query::<TaxEstimateParams>::from_query("state=CA").is_err());
    }
}
