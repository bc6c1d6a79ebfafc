use lms_common::Money;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

use crate::{db_types::MerchantOrderId, gateway::signals::TransactionObject};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// The request was never accepted by the gateway (connection refused, 5xx after retries, etc.).
    #[error("The payment gateway is unavailable. {0}")]
    Unavailable(String),
    /// The request may or may not have been processed.
    #[error("The payment gateway did not respond in time. {0}")]
    Timeout(String),
    #[error("The payment gateway refused the request. {0}")]
    Rejected(String),
    #[error("The payment gateway returned a response we could not understand. {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    /// `true` when a payment session can't exist as a result of the failed call, so the order can be failed safely.
    pub fn session_never_created(&self) -> bool {
        matches!(self, GatewayError::Unavailable(_) | GatewayError::Rejected(_))
    }
}

/// Billing details the gateway requires for every payment session.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, Validate)]
pub struct BillingDetails {
    #[validate(length(min = 1, max = 100, message = "first name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100, message = "last name is required"))]
    pub last_name: String,
    #[validate(email(message = "a valid email address is required"))]
    pub email: String,
    #[validate(length(min = 7, max = 20, message = "a valid phone number is required"))]
    pub phone_number: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionItem {
    pub name: String,
    pub amount: Money,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRequest {
    /// Echoed back by the gateway on every channel.
    pub merchant_order_id: MerchantOrderId,
    pub amount: Money,
    pub currency: String,
    pub items: Vec<SessionItem>,
    pub billing: BillingDetails,
    pub redirect_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSession {
    pub gateway_order_id: String,
    pub payment_url: String,
}

/// Outbound calls to the payment gateway.
#[allow(async_fn_in_trait)]
pub trait PaymentGateway {
    /// Registers the order with the gateway and returns the URL the purchaser pays at.
    async fn create_session(&self, request: SessionRequest) -> Result<PaymentSession, GatewayError>;

    /// Fetches the gateway's view of the transaction for `merchant_order_id`.
    async fn inquire(&self, merchant_order_id: &MerchantOrderId) -> Result<TransactionObject, GatewayError>;
}
