//! Webhook signature middleware.
//!
//! The payment provider signs each webhook delivery with an HMAC over the timestamp and the raw
//! request body, presented in the `Stripe-Signature` header. This middleware extracts the body,
//! verifies the signature against the signing secret, and replays the body into the request so
//! the handler can still read it.
//!
//! Wrap the webhook route with this middleware; nothing else should accept provider events.

use std::rc::Rc;

use actix_http::h1;
use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    error::{ErrorBadRequest, ErrorForbidden},
    web,
    Error,
};
use futures::future::{ready, LocalBoxFuture, Ready};
use log::{trace, warn};
use mps_common::Secret;
use stripe_tools::verify_webhook_signature;

pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

pub struct SignatureMiddlewareFactory {
    signing_secret: Secret<String>,
    tolerance_secs: i64,
}

impl SignatureMiddlewareFactory {
    pub fn new(signing_secret: Secret<String>, tolerance_secs: i64) -> Self {
        SignatureMiddlewareFactory { signing_secret, tolerance_secs }
    }
}

impl<S, B> Transform<S, ServiceRequest> for SignatureMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = SignatureMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(SignatureMiddlewareService {
            signing_secret: self.signing_secret.clone(),
            tolerance_secs: self.tolerance_secs,
            service: Rc::new(service),
        }))
    }
}

pub struct SignatureMiddlewareService<S> {
    signing_secret: Secret<String>,
    tolerance_secs: i64,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for SignatureMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let secret = self.signing_secret.clone();
        let tolerance_secs = self.tolerance_secs;
        Box::pin(async move {
            trace!("🔐️ Checking webhook signature");
            let data = req.extract::<web::Bytes>().await.map_err(|e| {
                warn!("🔐️ Failed to extract the webhook body: {e:?}");
                ErrorBadRequest("Failed to extract request data.")
            })?;
            let header = req
                .headers()
                .get(SIGNATURE_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
                .ok_or_else(|| {
                    warn!("🔐️ No signature found on the webhook request. Denying access.");
                    ErrorForbidden("No webhook signature found.")
                })?;
            match verify_webhook_signature(data.as_ref(), &header, secret.reveal(), tolerance_secs) {
                Ok(()) => {
                    trace!("🔐️ Webhook signature check ✅️");
                    req.set_payload(bytes_to_payload(data));
                    service.call(req).await
                },
                Err(e) => {
                    warn!("🔐️ Invalid webhook signature. Denying access. {e}");
                    Err(ErrorForbidden("Invalid webhook signature."))
                },
            }
        })
    }
}

fn bytes_to_payload(buf: web::Bytes) -> Payload {
    let (_, mut pl) = h1::Payload::create(true);
    pl.unread_data(buf);
    Payload::from(pl)
}
