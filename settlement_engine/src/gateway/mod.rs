//! # Gateway adapter
//!
//! The payment gateway reports on a transaction through three channels: a server-to-server webhook, the browser
//! redirect, and the status inquiry API. This module turns all three into a single [`Verdict`] so that the settlement
//! coordinator has exactly one pipeline to feed.
//!
//! * [`signals`] holds the raw payload shapes and the flat [`SignalFields`] view of them.
//! * [`signature`] verifies the gateway's MAC over a signal.
//! * [`verdict`] classifies a signal as success, failure or pending.
//! * [`PaymentGateway`] is the outbound contract (session creation and inquiry). The HTTP implementation lives in the
//!   `paygate_tools` crate.
mod client;
pub mod signals;
pub mod signature;
pub mod verdict;

pub use client::{BillingDetails, GatewayError, PaymentGateway, PaymentSession, SessionItem, SessionRequest};
pub use signals::{GatewayOrder, RedirectQuery, SignalFields, SourceData, TransactionData, TransactionObject, WebhookPayload};
pub use signature::SignatureError;
pub use verdict::{classify, Classification, Verdict};
