mod acl;
mod rate_limit;
mod signature;

pub use acl::{AclMiddlewareFactory, AclMiddlewareService};
pub use rate_limit::{RateLimitMiddlewareFactory, RateLimitMiddlewareService};
pub use signature::{SignatureMiddlewareFactory, SignatureMiddlewareService, SIGNATURE_HEADER};
