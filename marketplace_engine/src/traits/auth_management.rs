use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db_types::{PasswordResetCode, PendingUser, RefreshToken, User};

/// Storage contract for users, registration, password resets and refresh tokens.
///
/// The trait deals exclusively in hashes. Code hashing, password hashing and refresh-token HMACs
/// all happen in the API layer; nothing secret crosses this boundary in the clear.
#[allow(async_fn_in_trait)]
pub trait AuthManagement: Clone {
    /// Starts a registration. Fails with [`AuthApiError::AlreadyExists`] if the email is present
    /// in `users` or has an unexpired, unused pending registration.
    async fn create_pending_user(
        &self,
        email: &str,
        code_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<PendingUser, AuthApiError>;

    async fn fetch_pending_user(&self, email: &str) -> Result<Option<PendingUser>, AuthApiError>;

    /// Completes a registration in one transaction: marks the pending row used and inserts the
    /// user. Fails with [`AuthApiError::AlreadyExists`] if the email landed in `users` in the
    /// meantime.
    async fn promote_pending_user(&self, pending_id: i64, password_hash: &str) -> Result<User, AuthApiError>;

    /// Creates an anonymous guest account. Guests have no credentials but own carts, addresses
    /// and orders like any other user.
    async fn create_guest(&self) -> Result<User, AuthApiError>;

    /// Completes a registration by promoting an existing guest instead of inserting a new user:
    /// marks the pending row used and writes the email and password hash onto the guest row, in
    /// one transaction. The guest keeps its id, so its carts and orders carry over.
    async fn promote_guest(&self, guest_id: i64, pending_id: i64, password_hash: &str) -> Result<User, AuthApiError>;

    async fn fetch_user_by_email(&self, email: &str) -> Result<Option<User>, AuthApiError>;

    async fn fetch_user_by_id(&self, user_id: i64) -> Result<Option<User>, AuthApiError>;

    async fn update_password(&self, user_id: i64, password_hash: &str) -> Result<(), AuthApiError>;

    async fn create_password_reset(
        &self,
        user_id: i64,
        code_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<PasswordResetCode, AuthApiError>;

    /// The most recent unused reset code for the user, if any.
    async fn fetch_active_password_reset(&self, user_id: i64) -> Result<Option<PasswordResetCode>, AuthApiError>;

    /// Marks the code used and writes the new password hash, in one transaction.
    async fn complete_password_reset(
        &self,
        code_id: i64,
        user_id: i64,
        password_hash: &str,
    ) -> Result<(), AuthApiError>;

    async fn insert_refresh_token(
        &self,
        user_id: i64,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshToken, AuthApiError>;

    /// Verifies a presented refresh token hash and rotates it, in one transaction:
    /// * missing hash fails with [`AuthApiError::InvalidToken`];
    /// * a revoked row fails with [`AuthApiError::TokenRevoked`];
    /// * an expired row fails with [`AuthApiError::TokenExpired`];
    /// * otherwise the presented row is revoked (`last_used` updated) and a new row is inserted.
    ///
    /// Returns the token's user together with the replacement record.
    async fn rotate_refresh_token(
        &self,
        presented_hash: &str,
        replacement_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(User, RefreshToken), AuthApiError>;

    /// Revokes every refresh token for the user. Returns the number of rows touched.
    async fn revoke_refresh_tokens(&self, user_id: i64) -> Result<u64, AuthApiError>;

    /// Deletes expired refresh tokens and expired or used registration and reset codes. Returns
    /// the number of rows removed.
    async fn purge_expired_auth_records(&self) -> Result<u64, AuthApiError>;
}

#[derive(Debug, Clone, Error)]
pub enum AuthApiError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("The email address is already registered")]
    AlreadyExists,
    #[error("User not found")]
    UserNotFound,
    #[error("No matching confirmation code was found")]
    CodeNotFound,
    #[error("The confirmation code has expired")]
    CodeExpired,
    #[error("The confirmation code has already been used")]
    CodeUsed,
    #[error("The confirmation code does not match")]
    InvalidCode,
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("The refresh token is not valid")]
    InvalidToken,
    #[error("The refresh token has been revoked")]
    TokenRevoked,
    #[error("The refresh token has expired")]
    TokenExpired,
    #[error("Not a valid email address")]
    InvalidEmail,
    #[error("Password does not meet the minimum requirements: {0}")]
    WeakPassword(String),
    #[error("Password hashing failed: {0}")]
    HashingError(String),
}

impl From<sqlx::Error> for AuthApiError {
    fn from(e: sqlx::Error) -> Self {
        AuthApiError::DatabaseError(e.to_string())
    }
}
