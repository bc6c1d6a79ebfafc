//! Who is calling.
//!
//! Authentication happens in the upstream session layer, which forwards the caller's identity in two headers:
//! * `lms-session-owner`: the purchaser's id.
//! * `lms-session-roles`: a comma-separated list of roles. Absent means `user`.
//!
//! Handlers that need an owner take a [`SessionIdentity`] argument. Requests without the owner header are rejected
//! with 401 before the handler runs.
use std::{
    fmt::Display,
    future::{ready, Ready},
    str::FromStr,
};

use actix_web::{dev::Payload, http::header::HeaderMap, FromRequest, HttpRequest};
use log::*;
use serde::{Deserialize, Serialize};

use crate::errors::{AuthError, ServerError};

pub const OWNER_HEADER: &str = "lms-session-owner";
pub const ROLES_HEADER: &str = "lms-session-roles";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    /// May search all orders, trigger inquiries and run reconciliation.
    Admin,
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            _ => Err(format!("Unknown role: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub owner_id: String,
    pub roles: Vec<Role>,
}

impl SessionIdentity {
    pub fn new(owner_id: &str, roles: &[Role]) -> Self {
        Self { owner_id: owner_id.to_string(), roles: roles.to_vec() }
    }

    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let owner_id = headers
            .get(OWNER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())?
            .to_string();
        let roles = roles_from_headers(headers);
        Some(Self { owner_id, roles })
    }

    pub fn has_roles(&self, required: &[Role]) -> bool {
        required.iter().all(|r| self.roles.contains(r))
    }
}

/// Unknown roles are logged and skipped.
pub fn roles_from_headers(headers: &HeaderMap) -> Vec<Role> {
    match headers.get(ROLES_HEADER).and_then(|v| v.to_str().ok()) {
        None => vec![Role::User],
        Some(s) => s
            .split(',')
            .filter(|r| !r.trim().is_empty())
            .filter_map(|r| r.parse::<Role>().map_err(|e| debug!("💻️ {e}. Ignoring it.")).ok())
            .collect(),
    }
}

impl FromRequest for SessionIdentity {
    type Error = ServerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let identity = SessionIdentity::from_headers(req.headers()).ok_or_else(|| {
            debug!("💻️ Request to {} has no session owner", req.path());
            ServerError::AuthenticationError(AuthError::MissingSession)
        });
        ready(identity)
    }
}

/// The redirect is a browser request, so the session may or may not be present.
#[derive(Debug, Clone, Default)]
pub struct OptionalIdentity(pub Option<SessionIdentity>);

impl FromRequest for OptionalIdentity {
    type Error = ServerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(Ok(OptionalIdentity(SessionIdentity::from_headers(req.headers()))))
    }
}
