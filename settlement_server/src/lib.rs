//! # Settlement server
//! The HTTP front end for the settlement engine. It is responsible for:
//! * Serving the purchaser's cart, discount and checkout calls.
//! * Receiving the payment gateway's webhooks and browser redirects, and handing them to the settlement coordinator.
//! * Running the periodic reconciliation pass.
//! * Delivering purchase receipts.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Identity
//! Sessions are managed upstream. The session layer forwards the purchaser's id in the `lms-session-owner` header and
//! their roles in `lms-session-roles`. See [identity](identity/index.html).
//!
//! ## Routes
//! * `/health`: Liveness check.
//! * `/api/cart`, `/api/cart/items`, `/api/cart/discount`: The purchaser's cart.
//! * `/api/checkout`: Creates the order and the payment session.
//! * `/api/orders`: The purchaser's order history.
//! * `/api/admin/...`: Order search, manual inquiries and reconciliation.
//! * `/paygate/webhook`, `/paygate/redirect`: The gateway's callbacks.

pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod helpers;
pub mod identity;
pub mod integrations;
pub mod middleware;
pub mod reconciliation_worker;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
