use std::{
    sync::{Arc, Mutex},
    time::Duration as StdDuration,
};

use chrono::Duration;
use log::*;
use marketplace_engine::{
    db_types::Role,
    events::{EmailEvent, EmailPurpose, EventHandlers, EventHooks},
    traits::AuthApiError,
    AuthApi,
    CartApi,
    SqliteDatabase,
};
use mps_common::Secret;
use sqlx::{migrate::MigrateDatabase, Sqlite};

use crate::support::{
    prepare_env::{prepare_test_env, random_db_path},
    seed::create_product,
};

mod support;

#[derive(Default, Clone)]
struct Mailbox {
    mail: Arc<Mutex<Vec<EmailEvent>>>,
}

impl Mailbox {
    fn push(&self, event: EmailEvent) {
        self.mail.lock().unwrap().push(event);
    }

    /// Waits for the nth email to land. Delivery runs on the handler task, so a short poll is
    /// needed before reading the code out.
    async fn wait_for(&self, n: usize) -> EmailEvent {
        for _ in 0..100 {
            if let Some(event) = self.mail.lock().unwrap().get(n - 1) {
                return event.clone();
            }
            tokio::time::sleep(StdDuration::from_millis(50)).await;
        }
        panic!("Email {n} never arrived");
    }
}

async fn setup() -> (AuthApi<SqliteDatabase>, Mailbox, String) {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    let mailbox = Mailbox::default();
    let mailbox_copy = mailbox.clone();
    let mut hooks = EventHooks::default();
    hooks.on_email(move |event| {
        info!("📧️ Code for {}: {}", event.to, event.code);
        mailbox_copy.push(event);
        Box::pin(async {})
    });
    let handlers = EventHandlers::new(10, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;
    let api = AuthApi::new(db, Secret::new("test-hmac-key".to_string()), Duration::days(30), producers);
    (api, mailbox, url)
}

async fn tear_down(url: String) {
    Sqlite::drop_database(&url).await.unwrap();
}

#[tokio::test]
async fn registration_login_and_token_rotation() {
    let (api, mailbox, url) = setup().await;
    api.register("Alice@Example.com").await.expect("Error starting registration");
    let mail = mailbox.wait_for(1).await;
    assert_eq!(mail.to, "alice@example.com");
    assert_eq!(mail.purpose, EmailPurpose::RegistrationCode);

    // Wrong code, weak password, then success.
    let err = api.confirm_registration("alice@example.com", "XXXXXX", "hunter22hunter22", None).await.unwrap_err();
    assert!(matches!(err, AuthApiError::InvalidCode));
    let err = api.confirm_registration("alice@example.com", &mail.code, "short", None).await.unwrap_err();
    assert!(matches!(err, AuthApiError::WeakPassword(_)));
    let user = api.confirm_registration("alice@example.com", &mail.code, "hunter22hunter22", None).await.unwrap();
    assert_eq!(user.email, "alice@example.com");

    // The code is single-use.
    let err = api.confirm_registration("alice@example.com", &mail.code, "hunter22hunter22", None).await.unwrap_err();
    assert!(matches!(err, AuthApiError::CodeUsed));
    // And the email cannot register again.
    let err = api.register("alice@example.com").await.unwrap_err();
    assert!(matches!(err, AuthApiError::AlreadyExists));

    let err = api.login("alice@example.com", "wrong password").await.unwrap_err();
    assert!(matches!(err, AuthApiError::InvalidCredentials));
    let err = api.login("mallory@example.com", "hunter22hunter22").await.unwrap_err();
    assert!(matches!(err, AuthApiError::InvalidCredentials));
    let user = api.login(" ALICE@example.com ", "hunter22hunter22").await.unwrap();

    let secret = api.issue_refresh_token(user.id).await.unwrap();
    let (rotated_user, replacement) = api.rotate_refresh_token(&secret).await.unwrap();
    assert_eq!(rotated_user.id, user.id);
    assert_ne!(secret, replacement);
    // The old secret was revoked by the rotation.
    let err = api.rotate_refresh_token(&secret).await.unwrap_err();
    assert!(matches!(err, AuthApiError::TokenRevoked));
    // The replacement still works.
    let (_, _) = api.rotate_refresh_token(&replacement).await.unwrap();
    // Garbage is rejected without leaking whether it ever existed.
    let err = api.rotate_refresh_token("deadbeef").await.unwrap_err();
    assert!(matches!(err, AuthApiError::InvalidToken));
    tear_down(url).await;
}

#[tokio::test]
async fn password_reset_revokes_every_session() {
    let (api, mailbox, url) = setup().await;
    api.register("bob@example.com").await.unwrap();
    let mail = mailbox.wait_for(1).await;
    let user = api.confirm_registration("bob@example.com", &mail.code, "original-password", None).await.unwrap();
    let secret = api.issue_refresh_token(user.id).await.unwrap();

    // Unknown emails succeed silently and send nothing.
    api.request_password_reset("nobody@example.com").await.unwrap();
    api.request_password_reset("bob@example.com").await.unwrap();
    let mail = mailbox.wait_for(2).await;
    assert_eq!(mail.purpose, EmailPurpose::PasswordResetCode);

    let err = api.confirm_password_reset("bob@example.com", "XXXXXX", "brand-new-password").await.unwrap_err();
    assert!(matches!(err, AuthApiError::InvalidCode));
    api.confirm_password_reset("bob@example.com", &mail.code, "brand-new-password").await.unwrap();

    // Old password and old sessions are both dead.
    let err = api.login("bob@example.com", "original-password").await.unwrap_err();
    assert!(matches!(err, AuthApiError::InvalidCredentials));
    let err = api.rotate_refresh_token(&secret).await.unwrap_err();
    assert!(matches!(err, AuthApiError::TokenRevoked));
    api.login("bob@example.com", "brand-new-password").await.unwrap();
    // The reset code is single-use.
    let err = api.confirm_password_reset("bob@example.com", &mail.code, "yet-another-password").await.unwrap_err();
    assert!(matches!(err, AuthApiError::CodeUsed));
    tear_down(url).await;
}

#[tokio::test]
async fn guests_keep_their_cart_through_promotion() {
    let (api, mailbox, url) = setup().await;
    let guest = api.create_guest().await.unwrap();
    assert_eq!(guest.role, Role::Guest);
    assert!(guest.email.is_empty());
    // Anonymous accounts can coexist; email uniqueness only binds real accounts.
    let other = api.create_guest().await.unwrap();
    assert_ne!(guest.id, other.id);

    // Guests shop like anyone else.
    let db = SqliteDatabase::new_with_url(&url, 5).await.unwrap();
    let cart = CartApi::new(db.clone());
    let widget = create_product(&db, "Widget", 2_500, 10).await;
    cart.add_item(guest.id, widget.id, 2).await.unwrap();

    api.register("dora@example.com").await.unwrap();
    let mail = mailbox.wait_for(1).await;
    let user =
        api.confirm_registration("dora@example.com", &mail.code, "a-decent-password", Some(guest.id)).await.unwrap();
    // Promotion keeps the id, so the cart rides along into the new account.
    assert_eq!(user.id, guest.id);
    assert_eq!(user.role, Role::User);
    assert_eq!(user.email, "dora@example.com");
    let lines = cart.fetch_cart(user.id).await.unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].product_id, widget.id);
    // The promoted account logs in like any other.
    api.login("dora@example.com", "a-decent-password").await.unwrap();

    // Promoting a non-guest id is refused.
    api.register("evan@example.com").await.unwrap();
    let mail = mailbox.wait_for(2).await;
    let err =
        api.confirm_registration("evan@example.com", &mail.code, "a-decent-password", Some(user.id)).await.unwrap_err();
    assert!(matches!(err, AuthApiError::UserNotFound));
    tear_down(url).await;
}

#[tokio::test]
async fn purge_removes_spent_auth_records() {
    let (api, mailbox, url) = setup().await;
    api.register("carol@example.com").await.unwrap();
    let mail = mailbox.wait_for(1).await;
    let user = api.confirm_registration("carol@example.com", &mail.code, "a-decent-password", None).await.unwrap();
    let secret = api.issue_refresh_token(user.id).await.unwrap();
    api.revoke_refresh_tokens(user.id).await.unwrap();

    // The used pending row and the revoked token are both reaped.
    let purged = api.purge_expired().await.unwrap();
    assert!(purged >= 2, "Expected at least 2 purged records, got {purged}");
    let err = api.rotate_refresh_token(&secret).await.unwrap_err();
    assert!(matches!(err, AuthApiError::InvalidToken));
    tear_down(url).await;
}
