mod acl;
mod hmac;

pub use acl::{AclMiddlewareFactory, AclMiddlewareService};
pub use hmac::{verify_body_hmac, HmacMiddlewareFactory, HmacMiddlewareService, PAYGATE_HMAC_HEADER};
