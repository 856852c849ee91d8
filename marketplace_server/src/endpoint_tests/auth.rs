use actix_web::{http::StatusCode, web, web::ServiceConfig};
use chrono::{Days, Utc};
use ed25519_dalek::SigningKey;
use jwt_compact::{alg::Ed25519, AlgorithmExt, Claims, Header};
use log::debug;
use marketplace_engine::{db_types::Role, CartApi};

use super::helpers::{get_request, issue_token};
use crate::{auth::JwtClaims, endpoint_tests::mocks::MockCartBackend, routes::CartRoute};

fn user_claims() -> JwtClaims {
    JwtClaims { sub: 42, email: "alice@example.com".to_string(), role: Role::User }
}

#[actix_web::test]
async fn fetch_cart_no_token() {
    let _ = env_logger::try_init().ok();
    let (status, body) = get_request("", "/carts", configure).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.contains("No access token was provided"), "{body}");
}

#[actix_web::test]
async fn fetch_cart_garbage_token() {
    let _ = env_logger::try_init().ok();
    let (status, body) = get_request("not-a-jwt-at-all", "/carts", configure).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("not in the correct format"), "{body}");
}

#[actix_web::test]
async fn fetch_cart_expired_token() {
    let _ = env_logger::try_init().ok();
    let expired = Utc::now() - Days::new(1);
    let token = issue_token(user_claims(), expired);
    debug!("Calling /carts with expired token");
    let (status, body) = get_request(&token, "/carts", configure).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.contains("Access token is invalid"), "{body}");
}

#[actix_web::test]
async fn fetch_cart_token_from_unknown_key() {
    let _ = env_logger::try_init().ok();
    // Signed with a key the server has never seen.
    let rogue_key = SigningKey::from_bytes(&[7u8; 32]);
    let header = Header::empty().with_token_type("JWT");
    let mut claims = Claims::new(user_claims());
    claims.expiration = Some(Utc::now() + Days::new(1));
    let token = Ed25519.token(&header, &claims, &rogue_key).unwrap();
    let (status, body) = get_request(&token, "/carts", configure).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.contains("Access token is invalid"), "{body}");
}

#[actix_web::test]
async fn fetch_cart_valid_token() {
    let _ = env_logger::try_init().ok();
    let token = issue_token(user_claims(), Utc::now() + Days::new(1));
    let (status, body) = get_request(&token, "/carts", configure).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "[]");
}

fn configure(cfg: &mut ServiceConfig) {
    let mut cart = MockCartBackend::new();
    cart.expect_fetch_cart().returning(|_| Ok(vec![]));
    let cart_api = CartApi::new(cart);
    cfg.service(CartRoute::<MockCartBackend>::new()).app_data(web::Data::new(cart_api));
}
