use actix_web::{http::StatusCode, web, web::ServiceConfig, HttpResponse};
use chrono::Duration;
use marketplace_engine::RateLimitApi;

use super::helpers::get_request;
use crate::{endpoint_tests::mocks::MockRateLimiter, middleware::RateLimitMiddlewareFactory};

async fn ping() -> HttpResponse {
    HttpResponse::Ok().body("pong")
}

#[actix_web::test]
async fn requests_under_the_limit_pass() {
    let _ = env_logger::try_init().ok();
    let (status, body) = get_request("", "/ping", configure_under_limit).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "pong");
}

#[actix_web::test]
async fn requests_over_the_limit_get_429() {
    let _ = env_logger::try_init().ok();
    let (status, body) = get_request("", "/ping", configure_over_limit).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(body.contains("Too many requests"), "{body}");
}

fn configure_under_limit(cfg: &mut ServiceConfig) {
    let mut limiter = MockRateLimiter::new();
    limiter.expect_check_rate_limit().returning(|_, _| Ok(0));
    limiter.expect_record_rate_limit().returning(|_, _, _| Ok(1));
    let api = RateLimitApi::new(limiter);
    cfg.service(
        web::resource("/ping")
            .wrap(RateLimitMiddlewareFactory::<MockRateLimiter>::new("ping", 3, Duration::hours(1)))
            .route(web::get().to(ping)),
    )
    .app_data(web::Data::new(api));
}

fn configure_over_limit(cfg: &mut ServiceConfig) {
    let mut limiter = MockRateLimiter::new();
    limiter.expect_check_rate_limit().returning(|_, _| Ok(3));
    let api = RateLimitApi::new(limiter);
    cfg.service(
        web::resource("/ping")
            .wrap(RateLimitMiddlewareFactory::<MockRateLimiter>::new("ping", 3, Duration::hours(1)))
            .route(web::get().to(ping)),
    )
    .app_data(web::Data::new(api));
}
