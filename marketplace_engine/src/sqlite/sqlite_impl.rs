//! `SqliteDatabase` is the concrete SQLite implementation of the marketplace storage traits.
//!
//! It implements every trait defined in the [`crate::traits`] module over a shared connection
//! pool. Multi-step flows run in a single `begin()` transaction; plain reads take a connection
//! from the pool.

use std::fmt::Debug;

use chrono::{DateTime, Duration, Utc};
use log::*;
use mps_common::Money;
use sqlx::SqlitePool;

use super::db::{
    addresses,
    carts,
    db_url,
    job_schedule,
    new_pool,
    orders,
    payment_events,
    products,
    rate_limits,
    shipping,
    tax_rates,
    users,
};
use crate::{
    db_types::{
        Address,
        CartItem,
        NewAddress,
        NewProduct,
        Order,
        OrderItem,
        PasswordResetCode,
        PaymentEvent,
        PendingUser,
        Product,
        RefreshToken,
        Role,
        ShippingExclusion,
        ShippingZone,
        TaxRate,
        User,
    },
    mpe_api::order_objects::OrderQueryFilter,
    traits::{
        AuthApiError,
        AuthManagement,
        CartError,
        CartManagement,
        CatalogError,
        CatalogManagement,
        JobScheduleError,
        JobScheduler,
        OrderEngineError,
        OrderManagement,
        RateLimitError,
        RateLimitStore,
        ShippingError,
        ShippingManagement,
        TaxRateError,
        TaxRateStore,
        TransitionOutcome,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new connection pool using the URL from the `DATABASE_URL` environment variable.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl OrderManagement for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn create_order_from_cart(
        &self,
        user_id: i64,
        shipping_address_id: i64,
        currency: &str,
    ) -> Result<Order, OrderEngineError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::create_order_from_cart(user_id, shipping_address_id, currency, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order {} has been created for user {user_id}", order.id);
        Ok(order)
    }

    async fn fetch_order(&self, order_id: i64) -> Result<Option<Order>, OrderEngineError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order(order_id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, OrderEngineError> {
        let mut conn = self.pool.acquire().await?;
        let items = orders::fetch_order_items(order_id, &mut conn).await?;
        Ok(items)
    }

    async fn fetch_orders_for_user(&self, user_id: i64) -> Result<Vec<Order>, OrderEngineError> {
        let mut conn = self.pool.acquire().await?;
        let result = orders::fetch_orders_for_user(user_id, &mut conn).await?;
        Ok(result)
    }

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderEngineError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::search_orders(query, &mut conn).await?;
        Ok(orders)
    }

    async fn fetch_order_by_intent(&self, intent_id: &str) -> Result<Option<Order>, OrderEngineError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_intent(intent_id, &mut conn).await?;
        Ok(order)
    }

    async fn attach_payment_intent(
        &self,
        order_id: i64,
        tax: Money,
        total: Money,
        intent_id: &str,
    ) -> Result<Order, OrderEngineError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::attach_payment_intent(order_id, tax, total, intent_id, &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn insert_payment_event(&self, id: &str, event_type: &str, payload: &str) -> Result<bool, OrderEngineError> {
        let mut conn = self.pool.acquire().await?;
        let is_new = payment_events::idempotent_insert(id, event_type, payload, &mut conn).await?;
        Ok(is_new)
    }

    async fn mark_payment_event_processed(&self, id: &str) -> Result<(), OrderEngineError> {
        let mut conn = self.pool.acquire().await?;
        payment_events::mark_processed(id, &mut conn).await?;
        Ok(())
    }

    async fn fetch_payment_event(&self, id: &str) -> Result<Option<PaymentEvent>, OrderEngineError> {
        let mut conn = self.pool.acquire().await?;
        let event = payment_events::fetch_event(id, &mut conn).await?;
        Ok(event)
    }

    async fn mark_order_paid(&self, order_id: i64) -> Result<TransitionOutcome, OrderEngineError> {
        let mut tx = self.pool.begin().await?;
        let outcome = orders::mark_order_paid(order_id, &mut tx).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    async fn record_payment_failure(&self, order_id: i64, reason: &str) -> Result<TransitionOutcome, OrderEngineError> {
        let mut tx = self.pool.begin().await?;
        let outcome = orders::record_payment_failure(order_id, reason, &mut tx).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    async fn cancel_order(&self, order_id: i64) -> Result<TransitionOutcome, OrderEngineError> {
        let mut tx = self.pool.begin().await?;
        let outcome = orders::cancel_order(order_id, &mut tx).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    async fn apply_refund(&self, order_id: i64, amount: Money) -> Result<TransitionOutcome, OrderEngineError> {
        let mut tx = self.pool.begin().await?;
        let outcome = orders::apply_refund(order_id, amount, &mut tx).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    async fn cancel_stale_orders(&self, ttl: Duration) -> Result<Vec<Order>, OrderEngineError> {
        let mut tx = self.pool.begin().await?;
        let canceled = orders::cancel_stale_orders(ttl, &mut tx).await?;
        tx.commit().await?;
        if !canceled.is_empty() {
            info!("🗃️ {} stale order(s) have been canceled", canceled.len());
        }
        Ok(canceled)
    }

    async fn close(&mut self) -> Result<(), OrderEngineError> {
        self.pool.close().await;
        Ok(())
    }
}

impl CartManagement for SqliteDatabase {
    async fn fetch_cart(&self, user_id: i64) -> Result<Vec<CartItem>, CartError> {
        let mut conn = self.pool.acquire().await?;
        let cart = carts::fetch_cart(user_id, &mut conn).await?;
        Ok(cart)
    }

    async fn add_cart_item(&self, user_id: i64, product_id: i64, quantity: i64) -> Result<CartItem, CartError> {
        if quantity < 1 {
            return Err(CartError::InvalidQuantity(quantity));
        }
        let mut tx = self.pool.begin().await?;
        let item = carts::add_cart_item(user_id, product_id, quantity, &mut tx).await?;
        tx.commit().await?;
        Ok(item)
    }

    async fn update_cart_item(&self, user_id: i64, product_id: i64, quantity: i64) -> Result<CartItem, CartError> {
        if quantity < 1 {
            return Err(CartError::InvalidQuantity(quantity));
        }
        let mut tx = self.pool.begin().await?;
        let item = carts::set_cart_item_quantity(user_id, product_id, quantity, &mut tx).await?;
        tx.commit().await?;
        Ok(item)
    }

    async fn remove_cart_item(&self, user_id: i64, product_id: i64) -> Result<(), CartError> {
        let mut conn = self.pool.acquire().await?;
        carts::delete_cart_item(user_id, product_id, &mut conn).await
    }

    async fn clear_cart(&self, user_id: i64) -> Result<(), CartError> {
        let mut conn = self.pool.acquire().await?;
        carts::clear_cart(user_id, &mut conn).await
    }
}

impl CatalogManagement for SqliteDatabase {
    async fn insert_product(&self, product: NewProduct) -> Result<Product, CatalogError> {
        let mut conn = self.pool.acquire().await?;
        products::insert_product(product, &mut conn).await
    }

    async fn fetch_product(&self, product_id: i64) -> Result<Option<Product>, CatalogError> {
        let mut conn = self.pool.acquire().await?;
        let product = products::fetch_product(product_id, &mut conn).await?;
        Ok(product)
    }

    async fn fetch_products(&self) -> Result<Vec<Product>, CatalogError> {
        let mut conn = self.pool.acquire().await?;
        let result = products::fetch_products(&mut conn).await?;
        Ok(result)
    }

    async fn delete_product(&self, product_id: i64) -> Result<bool, CatalogError> {
        let mut conn = self.pool.acquire().await?;
        products::soft_delete_product(product_id, &mut conn).await
    }

    async fn upsert_address(&self, user_id: i64, address: NewAddress) -> Result<Address, CatalogError> {
        let mut tx = self.pool.begin().await?;
        let address = addresses::upsert_address(user_id, address, &mut tx).await?;
        tx.commit().await?;
        Ok(address)
    }

    async fn fetch_address(&self, address_id: i64) -> Result<Option<Address>, CatalogError> {
        let mut conn = self.pool.acquire().await?;
        let address = addresses::fetch_address(address_id, &mut conn).await?;
        Ok(address)
    }

    async fn fetch_addresses_for_user(&self, user_id: i64) -> Result<Vec<Address>, CatalogError> {
        let mut conn = self.pool.acquire().await?;
        let result = addresses::fetch_addresses_for_user(user_id, &mut conn).await?;
        Ok(result)
    }
}

impl AuthManagement for SqliteDatabase {
    async fn create_pending_user(
        &self,
        email: &str,
        code_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<PendingUser, AuthApiError> {
        let mut tx = self.pool.begin().await?;
        // A second registration attempt replaces an unused pending row rather than failing, so
        // users can request a fresh code.
        if let Some(existing) = users::fetch_pending_user(email, &mut tx).await? {
            if existing.used {
                return Err(AuthApiError::AlreadyExists);
            }
            sqlx::query("DELETE FROM pending_users WHERE id = $1").bind(existing.id).execute(&mut *tx).await?;
        }
        let pending = users::create_pending_user(email, code_hash, expires_at, &mut tx).await?;
        tx.commit().await?;
        Ok(pending)
    }

    async fn fetch_pending_user(&self, email: &str) -> Result<Option<PendingUser>, AuthApiError> {
        let mut conn = self.pool.acquire().await?;
        let pending = users::fetch_pending_user(email, &mut conn).await?;
        Ok(pending)
    }

    async fn promote_pending_user(&self, pending_id: i64, password_hash: &str) -> Result<User, AuthApiError> {
        let mut tx = self.pool.begin().await?;
        let pending =
            users::fetch_pending_user_by_id(pending_id, &mut tx).await?.ok_or(AuthApiError::CodeNotFound)?;
        users::mark_pending_user_used(pending_id, &mut tx).await?;
        let user = users::insert_user(&pending.email, password_hash, Role::User, &mut tx).await?;
        tx.commit().await?;
        info!("🔐️ Registration for {} completed", pending.email);
        Ok(user)
    }

    async fn create_guest(&self) -> Result<User, AuthApiError> {
        let mut conn = self.pool.acquire().await?;
        let user = users::insert_guest(&mut conn).await?;
        Ok(user)
    }

    async fn promote_guest(&self, guest_id: i64, pending_id: i64, password_hash: &str) -> Result<User, AuthApiError> {
        let mut tx = self.pool.begin().await?;
        let pending = users::fetch_pending_user_by_id(pending_id, &mut tx).await?.ok_or(AuthApiError::CodeNotFound)?;
        users::mark_pending_user_used(pending_id, &mut tx).await?;
        let user = users::promote_guest(guest_id, &pending.email, password_hash, &mut tx).await?;
        tx.commit().await?;
        info!("🔐️ Guest {guest_id} promoted; registration for {} completed", pending.email);
        Ok(user)
    }

    async fn fetch_user_by_email(&self, email: &str) -> Result<Option<User>, AuthApiError> {
        let mut conn = self.pool.acquire().await?;
        let user = users::fetch_user_by_email(email, &mut conn).await?;
        Ok(user)
    }

    async fn fetch_user_by_id(&self, user_id: i64) -> Result<Option<User>, AuthApiError> {
        let mut conn = self.pool.acquire().await?;
        let user = users::fetch_user_by_id(user_id, &mut conn).await?;
        Ok(user)
    }

    async fn update_password(&self, user_id: i64, password_hash: &str) -> Result<(), AuthApiError> {
        let mut conn = self.pool.acquire().await?;
        users::update_password(user_id, password_hash, &mut conn).await
    }

    async fn create_password_reset(
        &self,
        user_id: i64,
        code_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<PasswordResetCode, AuthApiError> {
        let mut conn = self.pool.acquire().await?;
        users::create_password_reset(user_id, code_hash, expires_at, &mut conn).await
    }

    async fn fetch_active_password_reset(&self, user_id: i64) -> Result<Option<PasswordResetCode>, AuthApiError> {
        let mut conn = self.pool.acquire().await?;
        let code = users::fetch_active_password_reset(user_id, &mut conn).await?;
        Ok(code)
    }

    async fn complete_password_reset(
        &self,
        code_id: i64,
        user_id: i64,
        password_hash: &str,
    ) -> Result<(), AuthApiError> {
        let mut tx = self.pool.begin().await?;
        users::mark_reset_code_used(code_id, &mut tx).await?;
        users::update_password(user_id, password_hash, &mut tx).await?;
        tx.commit().await?;
        info!("🔐️ Password reset completed for user {user_id}");
        Ok(())
    }

    async fn insert_refresh_token(
        &self,
        user_id: i64,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshToken, AuthApiError> {
        let mut conn = self.pool.acquire().await?;
        users::insert_refresh_token(user_id, token_hash, expires_at, &mut conn).await
    }

    async fn rotate_refresh_token(
        &self,
        presented_hash: &str,
        replacement_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(User, RefreshToken), AuthApiError> {
        let mut tx = self.pool.begin().await?;
        let token =
            users::fetch_refresh_token_by_hash(presented_hash, &mut tx).await?.ok_or(AuthApiError::InvalidToken)?;
        if token.revoked {
            warn!("🔐️ A revoked refresh token for user {} was presented", token.user_id);
            return Err(AuthApiError::TokenRevoked);
        }
        if token.expires_at < Utc::now() {
            return Err(AuthApiError::TokenExpired);
        }
        let user = users::fetch_user_by_id(token.user_id, &mut tx).await?.ok_or(AuthApiError::UserNotFound)?;
        users::revoke_refresh_token(token.id, &mut tx).await?;
        let replacement = users::insert_refresh_token(token.user_id, replacement_hash, expires_at, &mut tx).await?;
        tx.commit().await?;
        trace!("🔐️ Refresh token rotated for user {}", token.user_id);
        Ok((user, replacement))
    }

    async fn revoke_refresh_tokens(&self, user_id: i64) -> Result<u64, AuthApiError> {
        let mut conn = self.pool.acquire().await?;
        users::revoke_all_refresh_tokens(user_id, &mut conn).await
    }

    async fn purge_expired_auth_records(&self) -> Result<u64, AuthApiError> {
        let mut conn = self.pool.acquire().await?;
        users::purge_expired_auth_records(&mut conn).await
    }
}

impl ShippingManagement for SqliteDatabase {
    async fn fetch_shipping_zones(&self) -> Result<Vec<ShippingZone>, ShippingError> {
        let mut conn = self.pool.acquire().await?;
        let zones = shipping::fetch_shipping_zones(&mut conn).await?;
        Ok(zones)
    }

    async fn insert_shipping_zone(
        &self,
        country: &str,
        state_code: Option<&str>,
        postal_code: Option<&str>,
    ) -> Result<ShippingZone, ShippingError> {
        let mut conn = self.pool.acquire().await?;
        shipping::insert_shipping_zone(country, state_code, postal_code, &mut conn).await
    }

    async fn delete_shipping_zone(&self, zone_id: i64) -> Result<bool, ShippingError> {
        let mut conn = self.pool.acquire().await?;
        let deleted = shipping::delete_shipping_zone(zone_id, &mut conn).await?;
        Ok(deleted)
    }

    async fn fetch_shipping_exclusions(&self) -> Result<Vec<ShippingExclusion>, ShippingError> {
        let mut conn = self.pool.acquire().await?;
        let exclusions = shipping::fetch_shipping_exclusions(&mut conn).await?;
        Ok(exclusions)
    }

    async fn insert_shipping_exclusion(
        &self,
        country: &str,
        postal_code: &str,
    ) -> Result<ShippingExclusion, ShippingError> {
        let mut conn = self.pool.acquire().await?;
        shipping::insert_shipping_exclusion(country, postal_code, &mut conn).await
    }

    async fn delete_shipping_exclusion(&self, exclusion_id: i64) -> Result<bool, ShippingError> {
        let mut conn = self.pool.acquire().await?;
        let deleted = shipping::delete_shipping_exclusion(exclusion_id, &mut conn).await?;
        Ok(deleted)
    }

    async fn is_shippable(&self, address: &Address) -> Result<bool, ShippingError> {
        let mut conn = self.pool.acquire().await?;
        let eligible = shipping::is_shippable(address, &mut conn).await?;
        Ok(eligible)
    }
}

impl RateLimitStore for SqliteDatabase {
    async fn check_rate_limit(&self, ip: &str, path: &str) -> Result<i64, RateLimitError> {
        let mut conn = self.pool.acquire().await?;
        rate_limits::check_rate_limit(ip, path, &mut conn).await
    }

    async fn record_rate_limit(&self, ip: &str, path: &str, window: Duration) -> Result<i64, RateLimitError> {
        let mut conn = self.pool.acquire().await?;
        rate_limits::record_rate_limit(ip, path, window, &mut conn).await
    }

    async fn cleanup_rate_limits(&self) -> Result<u64, RateLimitError> {
        let mut conn = self.pool.acquire().await?;
        rate_limits::cleanup_rate_limits(&mut conn).await
    }
}

impl JobScheduler for SqliteDatabase {
    async fn try_run(&self, job_name: &str, interval: Duration) -> Result<bool, JobScheduleError> {
        let mut tx = self.pool.begin().await?;
        let should_run = job_schedule::try_run(job_name, interval, &mut tx).await?;
        tx.commit().await?;
        Ok(should_run)
    }
}

impl TaxRateStore for SqliteDatabase {
    async fn fetch_tax_rate(
        &self,
        country: &str,
        state: Option<&str>,
        tax_code: Option<&str>,
    ) -> Result<Option<TaxRate>, TaxRateError> {
        let mut conn = self.pool.acquire().await?;
        let rate = tax_rates::fetch_tax_rate(country, state, tax_code, &mut conn).await?;
        Ok(rate)
    }

    async fn set_tax_rate(&self, rate: &TaxRate) -> Result<(), TaxRateError> {
        let mut tx = self.pool.begin().await?;
        tax_rates::set_tax_rate(rate, &mut tx).await?;
        tx.commit().await?;
        Ok(())
    }
}
