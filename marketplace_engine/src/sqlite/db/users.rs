//! Users, pending registrations, password reset codes and refresh tokens.

use chrono::{DateTime, Utc};
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{PasswordResetCode, PendingUser, RefreshToken, Role, User},
    helpers::IdGenerator,
    traits::AuthApiError,
};

fn next_id() -> Result<i64, AuthApiError> {
    IdGenerator::next_id().map_err(|e| AuthApiError::DatabaseError(e.to_string()))
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error().map(|db| db.is_unique_violation()).unwrap_or(false)
}

//--------------------------------------  Pending registrations  -----------------------------------------------------

/// Inserts a pending registration. Fails with `AlreadyExists` when the email is present in
/// `users` or already has a pending row.
pub async fn create_pending_user(
    email: &str,
    code_hash: &str,
    expires_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<PendingUser, AuthApiError> {
    if fetch_user_by_email(email, &mut *conn).await?.is_some() {
        return Err(AuthApiError::AlreadyExists);
    }
    let id = next_id()?;
    let pending = sqlx::query_as(
        "INSERT INTO pending_users (id, email, code_hash, expires_at) VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(id)
    .bind(email)
    .bind(code_hash)
    .bind(expires_at)
    .fetch_one(conn)
    .await
    .map_err(|e| if is_unique_violation(&e) { AuthApiError::AlreadyExists } else { e.into() })?;
    Ok(pending)
}

pub async fn fetch_pending_user(email: &str, conn: &mut SqliteConnection) -> Result<Option<PendingUser>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM pending_users WHERE email = $1").bind(email).fetch_optional(conn).await
}

pub async fn fetch_pending_user_by_id(
    id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<PendingUser>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM pending_users WHERE id = $1").bind(id).fetch_optional(conn).await
}

pub async fn mark_pending_user_used(id: i64, conn: &mut SqliteConnection) -> Result<(), AuthApiError> {
    sqlx::query("UPDATE pending_users SET used = 1 WHERE id = $1").bind(id).execute(conn).await?;
    Ok(())
}

//--------------------------------------        Users         --------------------------------------------------------

pub async fn insert_user(
    email: &str,
    password_hash: &str,
    role: Role,
    conn: &mut SqliteConnection,
) -> Result<User, AuthApiError> {
    let id = next_id()?;
    let user: User = sqlx::query_as("INSERT INTO users (id, email, password_hash, role) VALUES ($1, $2, $3, $4) RETURNING *")
        .bind(id)
        .bind(email)
        .bind(password_hash)
        .bind(role)
        .fetch_one(conn)
        .await
        .map_err(|e| if is_unique_violation(&e) { AuthApiError::AlreadyExists } else { e.into() })?;
    debug!("🗃️ User {} created for {email}", user.id);
    Ok(user)
}

/// Inserts an anonymous guest account. Guests carry carts and orders without credentials; the
/// partial unique index on email does not apply to them.
pub async fn insert_guest(conn: &mut SqliteConnection) -> Result<User, AuthApiError> {
    let id = next_id()?;
    let user: User = sqlx::query_as("INSERT INTO users (id, role) VALUES ($1, 'guest') RETURNING *")
        .bind(id)
        .fetch_one(conn)
        .await?;
    debug!("🗃️ Guest {} created", user.id);
    Ok(user)
}

/// Promotes a guest to a full account by setting its credentials. Fails with `UserNotFound` when
/// the row is missing or is not a guest, and `AlreadyExists` when the email is taken.
pub async fn promote_guest(
    guest_id: i64,
    email: &str,
    password_hash: &str,
    conn: &mut SqliteConnection,
) -> Result<User, AuthApiError> {
    let user: Option<User> = sqlx::query_as(
        r#"
            UPDATE users SET email = $1, password_hash = $2, role = 'user', updated_at = CURRENT_TIMESTAMP
            WHERE id = $3 AND role = 'guest'
            RETURNING *
        "#,
    )
    .bind(email)
    .bind(password_hash)
    .bind(guest_id)
    .fetch_optional(conn)
    .await
    .map_err(|e| if is_unique_violation(&e) { AuthApiError::AlreadyExists } else { e.into() })?;
    let user = user.ok_or(AuthApiError::UserNotFound)?;
    debug!("🗃️ Guest {guest_id} promoted to user for {email}");
    Ok(user)
}

pub async fn fetch_user_by_email(email: &str, conn: &mut SqliteConnection) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM users WHERE email = $1").bind(email).fetch_optional(conn).await
}

pub async fn fetch_user_by_id(user_id: i64, conn: &mut SqliteConnection) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM users WHERE id = $1").bind(user_id).fetch_optional(conn).await
}

pub async fn update_password(
    user_id: i64,
    password_hash: &str,
    conn: &mut SqliteConnection,
) -> Result<(), AuthApiError> {
    let res = sqlx::query("UPDATE users SET password_hash = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2")
        .bind(password_hash)
        .bind(user_id)
        .execute(conn)
        .await?;
    if res.rows_affected() == 0 {
        return Err(AuthApiError::UserNotFound);
    }
    Ok(())
}

//--------------------------------------  Password reset codes  ------------------------------------------------------

pub async fn create_password_reset(
    user_id: i64,
    code_hash: &str,
    expires_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<PasswordResetCode, AuthApiError> {
    let id = next_id()?;
    let code = sqlx::query_as(
        "INSERT INTO password_reset_codes (id, user_id, code_hash, expires_at) VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(id)
    .bind(user_id)
    .bind(code_hash)
    .bind(expires_at)
    .fetch_one(conn)
    .await?;
    Ok(code)
}

/// The newest unused reset code for the user, expired or not. The caller decides what an expired
/// code means.
pub async fn fetch_active_password_reset(
    user_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<PasswordResetCode>, sqlx::Error> {
    sqlx::query_as(
        "SELECT * FROM password_reset_codes WHERE user_id = $1 AND used = 0 ORDER BY created_at DESC, id DESC LIMIT 1",
    )
    .bind(user_id)
    .fetch_optional(conn)
    .await
}

pub async fn mark_reset_code_used(code_id: i64, conn: &mut SqliteConnection) -> Result<(), AuthApiError> {
    sqlx::query("UPDATE password_reset_codes SET used = 1 WHERE id = $1").bind(code_id).execute(conn).await?;
    Ok(())
}

//--------------------------------------    Refresh tokens    --------------------------------------------------------

pub async fn insert_refresh_token(
    user_id: i64,
    token_hash: &str,
    expires_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<RefreshToken, AuthApiError> {
    let id = next_id()?;
    let token = sqlx::query_as(
        "INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at) VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(id)
    .bind(user_id)
    .bind(token_hash)
    .bind(expires_at)
    .fetch_one(conn)
    .await?;
    Ok(token)
}

pub async fn fetch_refresh_token_by_hash(
    token_hash: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<RefreshToken>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM refresh_tokens WHERE token_hash = $1").bind(token_hash).fetch_optional(conn).await
}

pub async fn revoke_refresh_token(token_id: i64, conn: &mut SqliteConnection) -> Result<(), AuthApiError> {
    sqlx::query("UPDATE refresh_tokens SET revoked = 1, last_used = CURRENT_TIMESTAMP WHERE id = $1")
        .bind(token_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn revoke_all_refresh_tokens(user_id: i64, conn: &mut SqliteConnection) -> Result<u64, AuthApiError> {
    let res = sqlx::query("UPDATE refresh_tokens SET revoked = 1 WHERE user_id = $1 AND revoked = 0")
        .bind(user_id)
        .execute(conn)
        .await?;
    Ok(res.rows_affected())
}

/// Deletes expired refresh tokens and expired or used registration and reset codes.
pub async fn purge_expired_auth_records(conn: &mut SqliteConnection) -> Result<u64, AuthApiError> {
    let mut purged = 0u64;
    let res = sqlx::query(
        "DELETE FROM refresh_tokens WHERE revoked = 1 OR unixepoch(expires_at) < unixepoch(CURRENT_TIMESTAMP)",
    )
    .execute(&mut *conn)
    .await?;
    purged += res.rows_affected();
    let res = sqlx::query(
        "DELETE FROM pending_users WHERE used = 1 OR unixepoch(expires_at) < unixepoch(CURRENT_TIMESTAMP)",
    )
    .execute(&mut *conn)
    .await?;
    purged += res.rows_affected();
    let res = sqlx::query(
        "DELETE FROM password_reset_codes WHERE used = 1 OR unixepoch(expires_at) < unixepoch(CURRENT_TIMESTAMP)",
    )
    .execute(&mut *conn)
    .await?;
    purged += res.rows_affected();
    Ok(purged)
}
