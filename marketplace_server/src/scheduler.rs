use chrono::Duration;
use log::*;
use marketplace_engine::{
    db_types::Order,
    events::EventProducers,
    traits::JobScheduler,
    AuthApi,
    OrderFlowApi,
    RateLimitApi,
    SqliteDatabase,
};
use mps_common::Secret;
use tokio::task::JoinHandle;

use crate::integrations::StripeGateway;

/// How often a server instance offers to run the maintenance jobs. The job lease table decides
/// which instance actually runs each one, so this can be short without duplicating work.
const TICK_INTERVAL_SECS: u64 = 600;

const STALE_ORDER_JOB: &str = "stale_order_sweep";
const AUTH_PURGE_JOB: &str = "auth_purge";
const RATE_LIMIT_CLEANUP_JOB: &str = "rate_limit_cleanup";

/// Starts the maintenance scheduler. Do not await the returned JoinHandle, as it will run
/// indefinitely.
///
/// Three jobs run out of it: the stale order sweep (hourly), expired auth-record purging (daily)
/// and rate limit counter cleanup (hourly). Each is gated through the database job lease, so with
/// several server instances pointed at the same database only one runs a given job per interval.
pub fn start_scheduler(
    db: SqliteDatabase,
    payment: StripeGateway,
    hmac_secret: Secret<String>,
    refresh_expiry: Duration,
    order_ttl: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(std::time::Duration::from_secs(TICK_INTERVAL_SECS));
        let orders = OrderFlowApi::new(db.clone(), payment.clone(), payment, EventProducers::default());
        let auth = AuthApi::new(db.clone(), hmac_secret, refresh_expiry, EventProducers::default());
        let rate_limits = RateLimitApi::new(db.clone());
        info!("🕰️ Maintenance scheduler started");
        loop {
            timer.tick().await;
            match db.try_run(STALE_ORDER_JOB, Duration::hours(1)).await {
                Ok(true) => {
                    info!("🕰️ Running stale order sweep");
                    match orders.cancel_stale_orders(order_ttl).await {
                        Ok(cancelled) => {
                            info!("🕰️ {} stale orders cancelled", cancelled.len());
                            debug!("🕰️ Cancelled orders: {}", order_list(&cancelled));
                        },
                        Err(e) => error!("🕰️ Error running stale order sweep: {e}"),
                    }
                },
                Ok(false) => trace!("🕰️ Stale order sweep is not due, or another instance holds the lease"),
                Err(e) => error!("🕰️ Could not take the lease for the stale order sweep: {e}"),
            }
            match db.try_run(AUTH_PURGE_JOB, Duration::days(1)).await {
                Ok(true) => {
                    info!("🕰️ Purging expired registrations, reset codes and refresh tokens");
                    match auth.purge_expired().await {
                        Ok(n) => info!("🕰️ {n} expired auth records purged"),
                        Err(e) => error!("🕰️ Error purging expired auth records: {e}"),
                    }
                },
                Ok(false) => trace!("🕰️ Auth purge is not due, or another instance holds the lease"),
                Err(e) => error!("🕰️ Could not take the lease for the auth purge: {e}"),
            }
            match db.try_run(RATE_LIMIT_CLEANUP_JOB, Duration::hours(1)).await {
                Ok(true) => {
                    info!("🕰️ Cleaning up rate limit counters");
                    match rate_limits.cleanup().await {
                        Ok(n) => info!("🕰️ {n} stale rate limit counters removed"),
                        Err(e) => error!("🕰️ Error cleaning up rate limit counters: {e}"),
                    }
                },
                Ok(false) => trace!("🕰️ Rate limit cleanup is not due, or another instance holds the lease"),
                Err(e) => error!("🕰️ Could not take the lease for the rate limit cleanup: {e}"),
            }
        }
    })
}

fn order_list(orders: &[Order]) -> String {
    orders
        .iter()
        .map(|o| format!("[{}] user_id: {} total: {}", o.id, o.user_id, o.total_amount))
        .collect::<Vec<String>>()
        .join(", ")
}
