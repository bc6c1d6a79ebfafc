//! Raw-body HMAC check for gateway webhooks.
//!
//! The gateway can sign the raw webhook body with HMAC-SHA256, keyed with `LMS_PAYGATE_HMAC_SECRET`, and send the
//! base64 digest in the `X-Paygate-Hmac-Sha256` header. This middleware checks that signature before the body is
//! parsed, then hands the untouched bytes on to the route handler.
//!
//! The per-field MAC carried in the query string is checked separately by the settlement engine.
use std::{
    future::{ready, Ready},
    rc::Rc,
};

use actix_http::h1;
use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    error::{ErrorBadRequest, ErrorUnauthorized},
    web,
    Error,
};
use futures::future::LocalBoxFuture;
use hmac::{Hmac, Mac};
use lms_common::Secret;
use log::{trace, warn};
use sha2::Sha256;

pub const PAYGATE_HMAC_HEADER: &str = "X-Paygate-Hmac-Sha256";

pub struct HmacMiddlewareFactory {
    hmac_header: String,
    key: Secret<String>,
    // If false, then the middleware will not check the HMAC signature and always allow the call
    enabled: bool,
}

impl HmacMiddlewareFactory {
    pub fn new(hmac_header: &str, key: Secret<String>, enabled: bool) -> Self {
        HmacMiddlewareFactory { hmac_header: hmac_header.into(), key, enabled }
    }
}

impl<S, B> Transform<S, ServiceRequest> for HmacMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = HmacMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(HmacMiddlewareService {
            hmac_header: self.hmac_header.clone(),
            key: self.key.clone(),
            enabled: self.enabled,
            service: Rc::new(service),
        }))
    }
}

pub struct HmacMiddlewareService<S> {
    hmac_header: String,
    key: Secret<String>,
    enabled: bool,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for HmacMiddlewareService<S>
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
        let secret = self.key.clone();
        let hmac_header = self.hmac_header.clone();
        let enabled = self.enabled;
        Box::pin(async move {
            if !enabled {
                trace!("🔐️ Raw body HMAC checks are disabled. Allowing request.");
                return service.call(req).await;
            }
            trace!("🔐️ Checking raw body HMAC for request");
            let data = req.extract::<web::Bytes>().await.map_err(|e| {
                warn!("🔐️ Failed to extract request data: {:?}", e);
                ErrorBadRequest("Failed to extract request data.")
            })?;
            let signature = req.headers().get(&hmac_header).and_then(|v| v.to_str().ok()).ok_or_else(|| {
                warn!("🔐️ No HMAC signature found in request. Denying access.");
                ErrorUnauthorized("No HMAC signature found.")
            })?;
            if verify_body_hmac(&secret, data.as_ref(), signature) {
                trace!("🔐️ HMAC check for request ✅️");
                req.set_payload(bytes_to_payload(data));
                service.call(req).await
            } else {
                warn!("🔐️ Invalid HMAC signature found in request. Denying access.");
                Err(ErrorUnauthorized("Invalid HMAC signature."))
            }
        })
    }
}

/// Constant-time check of a base64 HMAC-SHA256 signature over `data`. An unconfigured secret never verifies.
pub fn verify_body_hmac(secret: &Secret<String>, data: &[u8], signature: &str) -> bool {
    let Some(secret) = secret.configured() else {
        warn!("🔐️ Raw body HMAC checks are enabled, but no secret is configured.");
        return false;
    };
    let Ok(expected) = base64::decode(signature.trim()) else {
        return false;
    };
    match Hmac::<Sha256>::new_from_slice(secret.as_bytes()) {
        Ok(mut mac) => {
            mac.update(data);
            mac.verify_slice(&expected).is_ok()
        },
        Err(_) => false,
    }
}

fn bytes_to_payload(buf: web::Bytes) -> Payload {
    let (_, mut pl) = h1::Payload::create(true);
    pl.unread_data(buf);
    Payload::from(pl)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::helpers::calculate_hmac;

    #[test]
    fn body_signatures() {
        let secret = Secret::new("shh".to_string());
        let body = br#"{"type":"TRANSACTION"}"#;
        let sig = calculate_hmac("shh", body);
        assert!(verify_body_hmac(&secret, body, &sig));
        assert!(!verify_body_hmac(&secret, b"{}", &sig));
        assert!(!verify_body_hmac(&secret, body, "not base64!"));
        assert!(!verify_body_hmac(&Secret::default(), body, &sig));
    }
}
