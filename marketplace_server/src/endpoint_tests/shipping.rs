use actix_web::{http::StatusCode, web, web::ServiceConfig};
use chrono::{Days, Utc};
use marketplace_engine::{db_types::Role, ShippingApi};

use super::helpers::{get_request, issue_token};
use crate::{auth::JwtClaims, endpoint_tests::mocks::MockShippingBackend, routes::ShippingZonesRoute};

#[actix_web::test]
async fn shipping_zones_require_a_token() {
    let _ = env_logger::try_init().ok();
    let (status, body) = get_request("", "/shipping/zones", configure).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.contains("No access token was provided"), "{body}");
}

#[actix_web::test]
async fn shipping_zones_reject_non_admins() {
    let _ = env_logger::try_init().ok();
    let claims = JwtClaims { sub: 42, email: "alice@example.com".to_string(), role: Role::User };
    let token = issue_token(claims, Utc::now() + Days::new(1));
    let (status, body) = get_request(&token, "/shipping/zones", configure).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body.contains("Insufficient Permissions"), "{body}");
}

#[actix_web::test]
async fn shipping_zones_allow_admins() {
    let _ = env_logger::try_init().ok();
    let claims = JwtClaims { sub: 1, email: "root@example.com".to_string(), role: Role::Admin };
    let token = issue_token(claims, Utc::now() + Days::new(1));
    let (status, body) = get_request(&token, "/shipping/zones", configure).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "[]");
}

fn configure(cfg: &mut ServiceConfig) {
    let mut shipping = MockShippingBackend::new();
    shipping.expect_fetch_shipping_zones().returning(|| Ok(vec![]));
    let shipping_api = ShippingApi::new(shipping);
    cfg.service(ShippingZonesRoute::<MockShippingBackend>::new()).app_data(web::Data::new(shipping_api));
}
