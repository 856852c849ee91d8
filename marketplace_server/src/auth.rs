//! Access token issuance and validation.
//!
//! Access tokens are Ed25519-signed JWTs carrying `{sub, email, role}` plus the standard
//! issued-at and expiry claims. Validation rejects any token whose header names a different
//! algorithm, so an HS256 token signed with the (public!) verification key never verifies.
//!
//! Handlers receive the validated claims by taking a [`JwtClaims`] parameter; the extractor
//! reads the `Authorization: Bearer` header. The ACL middleware performs the same validation for
//! role-guarded routes and caches the claims in the request extensions.

use std::future::{ready, Ready};

use actix_web::{dev::Payload, http::header, web, FromRequest, HttpMessage, HttpRequest};
use jwt_compact::{alg::Ed25519, AlgorithmExt, Claims, Header, TimeOptions, UntrustedToken};
use log::*;
use marketplace_engine::db_types::{Role, User};
use serde::{Deserialize, Serialize};

use crate::{
    config::AuthConfig,
    errors::{AuthError, ServerError},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: i64,
    pub email: String,
    pub role: Role,
}

impl JwtClaims {
    pub fn new(user: &User) -> Self {
        Self { sub: user.id, email: user.email.clone(), role: user.role }
    }
}

pub struct TokenIssuer {
    signing_key: ed25519_dalek::SigningKey,
    verification_key: ed25519_dalek::VerifyingKey,
    expiry: chrono::Duration,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            signing_key: config.jwt_signing_key.clone(),
            verification_key: config.jwt_verification_key,
            expiry: config.access_token_expiry,
        }
    }

    pub fn expiry_secs(&self) -> i64 {
        self.expiry.num_seconds()
    }

    /// Issue a signed access token for the user. The caller must have authenticated the user
    /// (password login, confirmed registration, or refresh-token rotation) before calling this.
    pub fn issue_token(&self, user: &User) -> Result<String, ServerError> {
        let time_options = TimeOptions::default();
        let claims = Claims::new(JwtClaims::new(user)).set_duration_and_issuance(&time_options, self.expiry);
        let header = Header::empty().with_token_type("JWT");
        Ed25519
            .token(&header, &claims, &self.signing_key)
            .map_err(|e| ServerError::BackendError(format!("Could not sign access token. {e}")))
    }

    /// Validate the signature, algorithm and expiry of an access token and return its claims.
    pub fn validate_token(&self, token: &str) -> Result<JwtClaims, AuthError> {
        let untrusted = UntrustedToken::new(token).map_err(|e| AuthError::PoorlyFormattedToken(e.to_string()))?;
        let token = Ed25519
            .validator::<JwtClaims>(&self.verification_key)
            .validate(&untrusted)
            .map_err(|e| AuthError::ValidationError(e.to_string()))?;
        token
            .claims()
            .validate_expiration(&TimeOptions::default())
            .map_err(|e| AuthError::ValidationError(e.to_string()))?;
        Ok(token.claims().custom.clone())
    }
}

/// Validate the bearer token on the request and return its claims, caching them in the request
/// extensions so the validation runs at most once per request.
pub fn claims_from_request(req: &HttpRequest) -> Result<JwtClaims, ServerError> {
    if let Some(claims) = req.extensions().get::<JwtClaims>() {
        return Ok(claims.clone());
    }
    let issuer = req
        .app_data::<web::Data<TokenIssuer>>()
        .ok_or_else(|| ServerError::InitializeError("No token issuer is configured".to_string()))?;
    let header = req.headers().get(header::AUTHORIZATION).ok_or(AuthError::MissingToken)?;
    let value = header.to_str().map_err(|e| AuthError::PoorlyFormattedToken(e.to_string()))?;
    let token = value
        .strip_prefix("Bearer ")
        .ok_or_else(|| AuthError::PoorlyFormattedToken("expected a Bearer token".to_string()))?;
    let claims = issuer.validate_token(token.trim()).map_err(|e| {
        debug!("🔐️ Access token rejected. {e}");
        e
    })?;
    req.extensions_mut().insert(claims.clone());
    Ok(claims)
}

impl FromRequest for JwtClaims {
    type Error = ServerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(claims_from_request(req))
    }
}

#[cfg(test)]
mod test {
    use chrono::Duration;
    use marketplace_engine::db_types::Role;

    use super::*;

    fn test_user() -> User {
        User {
            id: 42,
            email: "alice@example.com".to_string(),
            password_hash: String::new(),
            role: Role::User,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    fn test_config() -> AuthConfig {
        let mut config = AuthConfig::default();
        config.access_token_expiry = Duration::minutes(15);
        config
    }

    #[test]
    fn issued_tokens_validate() {
        let issuer = TokenIssuer::new(&test_config());
        let token = issuer.issue_token(&test_user()).unwrap();
        let claims = issuer.validate_token(&token).unwrap();
        assert_eq!(claims.sub, 42);
        assert_eq!(claims.email, "alice@example.com");
        assert_eq!(claims.role, Role::User);
    }

    #[test]
    fn tokens_from_another_key_are_rejected() {
        let issuer = TokenIssuer::new(&test_config());
        let stranger = TokenIssuer::new(&test_config());
        let token = stranger.issue_token(&test_user()).unwrap();
        assert!(matches!(issuer.validate_token(&token), Err(AuthError::ValidationError(_))));
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let mut config = test_config();
        config.access_token_expiry = Duration::seconds(-10);
        let issuer = TokenIssuer::new(&config);
        let token = issuer.issue_token(&test_user()).unwrap();
        assert!(matches!(issuer.validate_token(&token), Err(AuthError::ValidationError(_))));
    }

    #[test]
    fn hs256_tokens_never_validate() {
        // A forged token claiming HS256, signed-ish with the public verification key. The
        // validator must reject it on the algorithm name before any signature math.
        let issuer = TokenIssuer::new(&test_config());
        let forged = format!(
            "{}.{}.c2lnbmF0dXJl",
            base64url(br#"{"alg":"HS256","typ":"JWT"}"#),
            base64url(br#"{"sub":1,"email":"a@b.co","role":"admin"}"#)
        );
        assert!(issuer.validate_token(&forged).is_err());
    }

    fn base64url(data: &[u8]) -> String {
        // Minimal unpadded base64url for test fixtures.
        const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";
        let mut out = String::new();
        for chunk in data.chunks(3) {
            let b = [chunk[0], *chunk.get(1).unwrap_or(&0), *chunk.get(2).unwrap_or(&0)];
            let n = u32::from_be_bytes([0, b[0], b[1], b[2]]);
            for i in 0..=chunk.len() {
                out.push(ALPHABET[((n >> (18 - 6 * i)) & 0x3f) as usize] as char);
            }
        }
        out
    }
}
