//! Account lifecycle: registration with emailed confirmation codes, login, password reset and
//! refresh-token rotation.
//!
//! Passwords are hashed with Argon2id. Confirmation codes and refresh-token secrets are stored
//! only as HMAC-SHA256 digests keyed with the server secret, so the database never holds anything
//! that can be replayed.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use log::*;
use mps_common::{helpers::hmac_sha256_hex, Secret};
use rand::RngCore;

use crate::{
    db_types::User,
    events::{EmailEvent, EventProducers},
    helpers::{hash_code, new_confirmation_code, verify_code},
    traits::{AuthApiError, AuthManagement},
};

const MIN_PASSWORD_LENGTH: usize = 8;

/// Registration codes stay valid for three days.
pub fn registration_code_ttl() -> Duration {
    Duration::days(3)
}

/// Password reset codes stay valid for fifteen minutes.
pub fn reset_code_ttl() -> Duration {
    Duration::minutes(15)
}

pub struct AuthApi<B> {
    db: B,
    hmac_key: Secret<String>,
    refresh_expiry: Duration,
    producers: EventProducers,
}

impl<B> AuthApi<B> {
    pub fn new(db: B, hmac_key: Secret<String>, refresh_expiry: Duration, producers: EventProducers) -> Self {
        Self { db, hmac_key, refresh_expiry, producers }
    }
}

impl<B: AuthManagement> AuthApi<B> {
    /// Start a registration: store a pending user with a hashed confirmation code and hand the
    /// code to the email hook. Fails with `AlreadyExists` for known emails.
    pub async fn register(&self, email: &str) -> Result<(), AuthApiError> {
        let email = normalize_email(email)?;
        let code = new_confirmation_code();
        let code_hash = hash_code(&code, self.hmac_key.reveal());
        let expires_at = Utc::now() + registration_code_ttl();
        let pending = self.db.create_pending_user(&email, &code_hash, expires_at).await?;
        debug!("🔐️ Registration started for pending user {}", pending.id);
        self.send_email(EmailEvent::registration(email, code)).await;
        Ok(())
    }

    /// Complete a registration: verify the emailed code, hash the chosen password and create the
    /// user. When a guest id is given, the guest row is promoted instead, so its carts and orders
    /// follow it into the new account.
    pub async fn confirm_registration(
        &self,
        email: &str,
        code: &str,
        password: &str,
        guest_id: Option<i64>,
    ) -> Result<User, AuthApiError> {
        let email = normalize_email(email)?;
        let pending = self.db.fetch_pending_user(&email).await?.ok_or(AuthApiError::CodeNotFound)?;
        if pending.used {
            return Err(AuthApiError::CodeUsed);
        }
        if pending.is_expired(Utc::now()) {
            return Err(AuthApiError::CodeExpired);
        }
        if !verify_code(code, &pending.code_hash, self.hmac_key.reveal()) {
            return Err(AuthApiError::InvalidCode);
        }
        validate_password(password)?;
        let password_hash = hash_password(password)?;
        let user = match guest_id {
            Some(guest_id) => self.db.promote_guest(guest_id, pending.id, &password_hash).await?,
            None => self.db.promote_pending_user(pending.id, &password_hash).await?,
        };
        info!("🔐️ User {} registered", user.id);
        Ok(user)
    }

    /// Create an anonymous guest account. Guests shop with a regular token pair; registering
    /// later promotes the same row.
    pub async fn create_guest(&self) -> Result<User, AuthApiError> {
        let guest = self.db.create_guest().await?;
        info!("🔐️ Guest {} created", guest.id);
        Ok(guest)
    }

    /// Verify the email/password pair. Both unknown email and bad password report
    /// `InvalidCredentials`, so callers cannot probe which emails exist.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, AuthApiError> {
        let email = normalize_email(email)?;
        let user = self.db.fetch_user_by_email(&email).await?.ok_or(AuthApiError::InvalidCredentials)?;
        verify_password(password, &user.password_hash)?;
        debug!("🔐️ User {} logged in", user.id);
        Ok(user)
    }

    /// Mint a fresh refresh token for the user and return the secret. Only its HMAC is stored.
    pub async fn issue_refresh_token(&self, user_id: i64) -> Result<String, AuthApiError> {
        let secret = new_token_secret();
        let token_hash = hmac_sha256_hex(self.hmac_key.reveal(), secret.as_bytes());
        let record = self.db.insert_refresh_token(user_id, &token_hash, Utc::now() + self.refresh_expiry).await?;
        trace!("🔐️ Refresh token {} issued for user {user_id}", record.id);
        Ok(secret)
    }

    /// Exchange a presented refresh token for a new one (rotation). The presented token is
    /// revoked in the same transaction, so it can never be replayed, even if the response is
    /// lost.
    pub async fn rotate_refresh_token(&self, presented_secret: &str) -> Result<(User, String), AuthApiError> {
        let presented_hash = hmac_sha256_hex(self.hmac_key.reveal(), presented_secret.trim().as_bytes());
        let replacement_secret = new_token_secret();
        let replacement_hash = hmac_sha256_hex(self.hmac_key.reveal(), replacement_secret.as_bytes());
        let (user, record) = self
            .db
            .rotate_refresh_token(&presented_hash, &replacement_hash, Utc::now() + self.refresh_expiry)
            .await?;
        debug!("🔐️ Refresh token rotated for user {}; replacement record {}", user.id, record.id);
        Ok((user, replacement_secret))
    }

    /// Revoke every refresh token for the user (logout everywhere).
    pub async fn revoke_refresh_tokens(&self, user_id: i64) -> Result<u64, AuthApiError> {
        let revoked = self.db.revoke_refresh_tokens(user_id).await?;
        info!("🔐️ Revoked {revoked} refresh tokens for user {user_id}");
        Ok(revoked)
    }

    /// Start a password reset. Unknown emails succeed silently so the endpoint does not leak
    /// which addresses are registered.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), AuthApiError> {
        let email = normalize_email(email)?;
        let Some(user) = self.db.fetch_user_by_email(&email).await? else {
            debug!("🔐️ Password reset requested for an unknown email. Dropping the request.");
            return Ok(());
        };
        let code = new_confirmation_code();
        let code_hash = hash_code(&code, self.hmac_key.reveal());
        self.db.create_password_reset(user.id, &code_hash, Utc::now() + reset_code_ttl()).await?;
        debug!("🔐️ Password reset code created for user {}", user.id);
        self.send_email(EmailEvent::password_reset(email, code)).await;
        Ok(())
    }

    /// Complete a password reset: verify the code, write the new password hash, and revoke all
    /// refresh tokens so stolen sessions die with the old password.
    pub async fn confirm_password_reset(&self, email: &str, code: &str, new_password: &str) -> Result<(), AuthApiError> {
        let email = normalize_email(email)?;
        let user = self.db.fetch_user_by_email(&email).await?.ok_or(AuthApiError::CodeNotFound)?;
        let reset = self.db.fetch_active_password_reset(user.id).await?.ok_or(AuthApiError::CodeNotFound)?;
        if reset.used {
            return Err(AuthApiError::CodeUsed);
        }
        if reset.is_expired(Utc::now()) {
            return Err(AuthApiError::CodeExpired);
        }
        if !verify_code(code, &reset.code_hash, self.hmac_key.reveal()) {
            return Err(AuthApiError::InvalidCode);
        }
        validate_password(new_password)?;
        let password_hash = hash_password(new_password)?;
        self.db.complete_password_reset(reset.id, user.id, &password_hash).await?;
        self.db.revoke_refresh_tokens(user.id).await?;
        info!("🔐️ Password reset completed for user {}", user.id);
        Ok(())
    }

    pub async fn fetch_user(&self, user_id: i64) -> Result<Option<User>, AuthApiError> {
        self.db.fetch_user_by_id(user_id).await
    }

    /// Delete expired refresh tokens and stale confirmation codes. Run by the scheduler.
    pub async fn purge_expired(&self) -> Result<u64, AuthApiError> {
        let purged = self.db.purge_expired_auth_records().await?;
        if purged > 0 {
            info!("🔐️🕰️ Purged {purged} expired auth records");
        }
        Ok(purged)
    }

    async fn send_email(&self, event: EmailEvent) {
        for emitter in &self.producers.email_producer {
            emitter.publish_event(event.clone()).await;
        }
    }
}

fn normalize_email(email: &str) -> Result<String, AuthApiError> {
    let email = email.trim().to_ascii_lowercase();
    let valid = email.len() >= 3 && email.len() <= 254 && email.split_once('@').is_some_and(|(l, d)| !l.is_empty() && d.contains('.'));
    if valid {
        Ok(email)
    } else {
        Err(AuthApiError::InvalidEmail)
    }
}

fn validate_password(password: &str) -> Result<(), AuthApiError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(AuthApiError::WeakPassword(format!("must be at least {MIN_PASSWORD_LENGTH} characters")));
    }
    Ok(())
}

/// Hash a password using Argon2id.
fn hash_password(password: &str) -> Result<String, AuthApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthApiError::HashingError(e.to_string()))
}

/// Verify a password against a stored Argon2 hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthApiError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthApiError::InvalidCredentials)?;
    Argon2::default().verify_password(password.as_bytes(), &parsed_hash).map_err(|_| AuthApiError::InvalidCredentials)
}

/// 32 random bytes, hex encoded. The client stores this; the server stores only its HMAC.
fn new_token_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("correct horse battery staple").unwrap();
        assert!(verify_password("correct horse battery staple", &hash).is_ok());
        assert!(verify_password("incorrect horse", &hash).is_err());
    }

    #[test]
    fn short_passwords_are_rejected() {
        assert!(matches!(validate_password("hunter2"), Err(AuthApiError::WeakPassword(_))));
        assert!(validate_password("hunter22").is_ok());
    }

    #[test]
    fn email_normalization() {
        assert_eq!(normalize_email("  Alice@Example.COM ").unwrap(), "alice@example.com");
        assert!(matches!(normalize_email("not-an-email"), Err(AuthApiError::InvalidEmail)));
        assert!(matches!(normalize_email("@example.com"), Err(AuthApiError::InvalidEmail)));
        assert!(matches!(normalize_email("a@b"), Err(AuthApiError::InvalidEmail)));
    }

    #[test]
    fn token_secrets_are_64_hex_chars() {
        let a = new_token_secret();
        let b = new_token_secret();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
