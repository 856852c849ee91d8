//! Per-IP rate limiting middleware.
//!
//! Wrap any resource with `RateLimitMiddlewareFactory::new(label, limit, window)` to cap how
//! often a single client IP may hit it. Counters live in the `rate_limits` table, keyed on
//! `(ip, label)`, so every replica sharing the database enforces the same window. The check runs
//! before the handler and the hit is recorded whether or not the handler later succeeds.

use std::{marker::PhantomData, rc::Rc};

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    error::ErrorInternalServerError,
    web,
    Error,
};
use chrono::Duration;
use futures::future::{ready, LocalBoxFuture, Ready};
use log::*;
use marketplace_engine::{traits::RateLimitStore, RateLimitApi};

use crate::{errors::ServerError, helpers::get_remote_ip};

pub struct RateLimitMiddlewareFactory<B> {
    label: String,
    limit: i64,
    window: Duration,
    _store: PhantomData<fn() -> B>,
}

impl<B> RateLimitMiddlewareFactory<B> {
    pub fn new(label: &str, limit: i64, window: Duration) -> Self {
        Self { label: label.to_string(), limit, window, _store: PhantomData }
    }
}

impl<S, B, R> Transform<S, ServiceRequest> for RateLimitMiddlewareFactory<R>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
    R: RateLimitStore + 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = RateLimitMiddlewareService<S, R>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddlewareService {
            label: self.label.clone(),
            limit: self.limit,
            window: self.window,
            service: Rc::new(service),
            _store: PhantomData,
        }))
    }
}

pub struct RateLimitMiddlewareService<S, R> {
    label: String,
    limit: i64,
    window: Duration,
    service: Rc<S>,
    _store: PhantomData<fn() -> R>,
}

impl<S, B, R> Service<ServiceRequest> for RateLimitMiddlewareService<S, R>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
    R: RateLimitStore + 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let label = self.label.clone();
        let limit = self.limit;
        let window = self.window;
        Box::pin(async move {
            // Clients with no resolvable IP share one bucket rather than bypassing the limit.
            let ip = get_remote_ip(req.request()).map(|ip| ip.to_string()).unwrap_or_else(|| "unknown".to_string());
            let Some(api) = req.app_data::<web::Data<RateLimitApi<R>>>().cloned() else {
                warn!("🚫️ No rate limit store is configured, but a route is rate limited. Denying the request.");
                return Err(ErrorInternalServerError("No rate limit store is configured"));
            };
            if api.is_limited(&ip, &label, limit).await.map_err(ServerError::from)? {
                debug!("🚫️ {ip} exceeded the {label} rate limit");
                return Err(ServerError::TooManyRequests.into());
            }
            api.record(&ip, &label, window).await.map_err(ServerError::from)?;
            service.call(req).await
        })
    }
}
