//! Webhook signature verification.
//!
//! The provider signs each webhook delivery with an HMAC over
//! `"<timestamp>.<raw body>"` and presents it in a `Stripe-Signature`-style
//! header of comma-separated pairs: `t=<unix>,v1=<hex>[,v1=<hex>…]`.
//! Verification accepts the event iff any `v1` candidate matches
//! (constant-time compare) and the timestamp is within tolerance.

use chrono::Utc;
use hmac::{Hmac, Mac};
use log::*;
use sha2::Sha256;

use crate::StripeApiError;

type HmacSha256 = Hmac<Sha256>;

/// Signatures older (or newer) than this many seconds are rejected as stale.
pub const DEFAULT_SIGNATURE_TOLERANCE_SECS: i64 = 300;

const SUPPORTED_EVENTS: [&str; 8] = [
    "payment_intent.succeeded",
    "payment_intent.payment_failed",
    "payment_intent.canceled",
    "payment_intent.requires_action",
    "payment_intent.processing",
    "refund.created",
    "refund.failed",
    "refund.updated",
];

/// Returns true if the event type is one the order engine knows how to apply.
pub fn is_supported_event(event_type: &str) -> bool {
    SUPPORTED_EVENTS.contains(&event_type)
}

/// Verifies a webhook delivery against the signing secret.
pub fn verify_webhook_signature(
    raw_body: &[u8],
    signature_header: &str,
    signing_secret: &str,
    tolerance_secs: i64,
) -> Result<(), StripeApiError> {
    verify_webhook_signature_at(raw_body, signature_header, signing_secret, tolerance_secs, Utc::now().timestamp())
}

/// As [`verify_webhook_signature`], with an explicit `now` for testability.
pub fn verify_webhook_signature_at(
    raw_body: &[u8],
    signature_header: &str,
    signing_secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> Result<(), StripeApiError> {
    let mut timestamp: Option<i64> = None;
    let mut candidates: Vec<&str> = Vec::new();
    for pair in signature_header.split(',') {
        let Some((k, v)) = pair.trim().split_once('=') else {
            return Err(StripeApiError::MalformedSignature(format!("missing '=' in element '{pair}'")));
        };
        match k {
            "t" => {
                let t = v
                    .parse::<i64>()
                    .map_err(|e| StripeApiError::MalformedSignature(format!("bad timestamp '{v}': {e}")))?;
                timestamp = Some(t);
            },
            "v1" => candidates.push(v),
            // Unknown schemes (e.g. v0) are ignored, per provider docs.
            _ => {},
        }
    }
    let timestamp = timestamp.ok_or_else(|| StripeApiError::MalformedSignature("no timestamp element".into()))?;
    if candidates.is_empty() {
        return Err(StripeApiError::MalformedSignature("no v1 signature element".into()));
    }
    if (now - timestamp).abs() > tolerance_secs {
        warn!("🔐️ Webhook signature timestamp {timestamp} is outside tolerance (now {now})");
        return Err(StripeApiError::StaleSignature);
    }
    let matched = candidates.iter().any(|hex_sig| {
        let Ok(expected) = hex::decode(hex_sig) else {
            return false;
        };
        let mut mac = HmacSha256::new_from_slice(signing_secret.as_bytes()).expect("HMAC accepts keys of any length");
        mac.update(format!("{timestamp}.").as_bytes());
        mac.update(raw_body);
        mac.verify_slice(&expected).is_ok()
    });
    if matched {
        trace!("🔐️ Webhook signature verified");
        Ok(())
    } else {
        warn!("🔐️ Webhook signature did not match any v1 candidate");
        Err(StripeApiError::BadSignature)
    }
}
