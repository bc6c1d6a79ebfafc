//! Client for the card payment gateway's REST API.
//!
//! [`PaygateApi`] implements [`settlement_engine::gateway::PaymentGateway`], so the settlement engine can open
//! payment sessions and ask about transactions without knowing anything about HTTP.
mod api;
mod config;
mod data_objects;
mod error;

pub use api::PaygateApi;
pub use config::PaygateConfig;
pub use data_objects::{AuthRequest, AuthResponse, BillingData, InquiryRequest, OrderItem, OrderRegistration, PaymentKeyRequest, RegisteredOrder, TokenResponse};
pub use error::PaygateApiError;
