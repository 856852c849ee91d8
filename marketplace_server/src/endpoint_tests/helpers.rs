use actix_web::{body::MessageBody, http::StatusCode, test, test::TestRequest, web, web::ServiceConfig, App};
use chrono::{DateTime, Duration, Utc};
use ed25519_dalek::SigningKey;
use jwt_compact::{alg::Ed25519, AlgorithmExt, Claims, Header};
use log::debug;
use mps_common::Secret;

use crate::{
    auth::{JwtClaims, TokenIssuer},
    config::AuthConfig,
};

// Creates a test `AuthConfig` for issuing tokens. DO NOT re-use this key anywhere.
pub fn get_auth_config() -> AuthConfig {
    let seed: [u8; 32] = hex::decode("9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60")
        .unwrap()
        .try_into()
        .unwrap();
    let jwt_signing_key = SigningKey::from_bytes(&seed);
    let jwt_verification_key = jwt_signing_key.verifying_key();
    AuthConfig {
        jwt_signing_key,
        jwt_verification_key,
        hmac_secret: Secret::new("endpoint-test-hmac-secret".to_string()),
        access_token_expiry: Duration::minutes(15),
        refresh_token_expiry: Duration::days(30),
    }
}

pub fn issue_token(claims: JwtClaims, expiry: DateTime<Utc>) -> String {
    let config = get_auth_config();
    let header = Header::empty().with_token_type("JWT");
    let mut claims = Claims::new(claims);
    claims.expiration = Some(expiry);
    Ed25519.token(&header, &claims, &config.jwt_signing_key).expect("Failed to sign token")
}

pub async fn get_request(token: &str, path: &str, configure: fn(&mut ServiceConfig)) -> (StatusCode, String) {
    let mut req = TestRequest::get().uri(path);
    if !token.is_empty() {
        req = req.insert_header(("Authorization", format!("Bearer {token}")));
    }
    let req = req.to_request();
    let config = get_auth_config();
    let jwt_signer = TokenIssuer::new(&config);
    let app = App::new().app_data(web::Data::new(jwt_signer)).configure(configure);

    let service = test::init_service(app).await;
    debug!("Making request to {path}");
    let res = match test::try_call_service(&service, req).await {
        Ok(res) => res.into_parts().1,
        // Middleware rejections surface as service errors; render them the way the server would.
        Err(e) => e.error_response(),
    };
    let status = res.status();
    let body = String::from_utf8_lossy(&res.into_body().try_into_bytes().unwrap()).into_owned();
    (status, body)
}
