use actix_web::{http::StatusCode, test, test::TestRequest, App};

use crate::routes::health;

#[actix_web::test]
async fn health_check() {
    let app = App::new().service(health);
    let service = test::init_service(app).await;
    let req = TestRequest::get().uri("/health").to_request();
    let res = test::call_service(&service, req).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body = test::read_body(res).await;
    assert_eq!(body, "👍️\n");
}
