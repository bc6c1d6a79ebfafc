//! Access control list middleware.
//! This middleware can be placed on any route or service.
//!
//! It reads the caller's roles from the session headers (see [`crate::identity`]) and checks them against the
//! roles the route requires. Requests without a session owner get a 401; those missing a role get a 403.
use std::{pin::Pin, rc::Rc};

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    error::{ErrorForbidden, ErrorUnauthorized},
    Error,
};
use futures::{
    future::{ok, Ready},
    Future,
};
use log::*;

use crate::identity::{Role, SessionIdentity};

pub struct AclMiddlewareFactory {
    required_roles: Vec<Role>,
}

impl AclMiddlewareFactory {
    pub fn new(required_roles: &[Role]) -> Self {
        AclMiddlewareFactory { required_roles: required_roles.to_vec() }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AclMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = AclMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AclMiddlewareService { required_roles: self.required_roles.clone(), service: Rc::new(service) })
    }
}

pub struct AclMiddlewareService<S> {
    required_roles: Vec<Role>,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for AclMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let required_roles = self.required_roles.clone();
        Box::pin(async move {
            let identity = SessionIdentity::from_headers(req.headers()).ok_or_else(|| {
                debug!("💻️ No session owner on a request to {}", req.path());
                ErrorUnauthorized("No session owner was supplied with the request.")
            })?;
            if identity.has_roles(&required_roles) {
                service.call(req).await
            } else {
                info!("💻️ {} tried to access {} without the required roles", identity.owner_id, req.path());
                Err(ErrorForbidden("Insufficient permissions."))
            }
        })
    }
}
