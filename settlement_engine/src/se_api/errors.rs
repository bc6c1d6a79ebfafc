use lms_common::Money;
use serde::Serialize;
use thiserror::Error;

use crate::{
    db_types::MerchantOrderId,
    gateway::{GatewayError, SignatureError},
    traits::{EntitlementError, LedgerError},
};

#[derive(Debug, Clone, Error)]
pub enum CartApiError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Catalog item {0} does not exist")]
    ItemNotFound(i64),
    #[error("Catalog item {0} cannot be purchased right now")]
    ItemUnavailable(i64),
    #[error("You already own catalog item {0}")]
    AlreadyOwned(i64),
}

impl From<LedgerError> for CartApiError {
    fn from(e: LedgerError) -> Self {
        CartApiError::DatabaseError(e.to_string())
    }
}

impl From<EntitlementError> for CartApiError {
    fn from(e: EntitlementError) -> Self {
        CartApiError::DatabaseError(e.to_string())
    }
}

/// The reasons a discount code is turned down. None of them change any state.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DiscountRejection {
    #[error("The discount code does not exist")]
    NotFound,
    #[error("The discount code is no longer active")]
    Inactive,
    #[error("The discount code is not valid yet")]
    NotYetValid,
    #[error("The discount code has expired")]
    Expired,
    #[error("The discount code has reached its usage limit")]
    UsageLimitReached,
    #[error("You have already used this discount code")]
    AlreadyUsed,
    #[error("The discount code is only valid on a first purchase")]
    NotFirstPurchase,
    #[error("The cart subtotal must be at least {minimum}")]
    BelowMinimumSubtotal { minimum: Money },
    #[error("The cart is empty")]
    EmptyCart,
    #[error("The discount ({amount}) exceeds the cart subtotal ({subtotal})")]
    ExceedsSubtotal { amount: Money, subtotal: Money },
    #[error("The discount would make the order total negative")]
    NegativeTotal,
}

#[derive(Debug, Clone, Error)]
pub enum DiscountError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Discount code rejected. {0}")]
    Rejected(#[from] DiscountRejection),
}

impl From<LedgerError> for DiscountError {
    fn from(e: LedgerError) -> Self {
        DiscountError::DatabaseError(e.to_string())
    }
}

impl From<CartApiError> for DiscountError {
    fn from(e: CartApiError) -> Self {
        DiscountError::DatabaseError(e.to_string())
    }
}

#[derive(Debug, Clone, Error)]
pub enum SettlementError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("The database is busy. Try again shortly. {0}")]
    DatabaseBusy(String),
    #[error("Order {0} does not exist")]
    OrderNotFound(MerchantOrderId),
    #[error("The signal does not identify an order")]
    MissingCorrelationId,
    #[error("The order does not belong to the caller")]
    NotOrderOwner,
    #[error("The cart is empty")]
    EmptyCart,
    #[error("Pending order {0} already covers items in the cart. Pay or wait for it to settle.")]
    CheckoutInProgress(MerchantOrderId),
    #[error("Invalid billing details. {0}")]
    InvalidBilling(String),
    #[error("Discount code rejected. {0}")]
    DiscountRejected(DiscountRejection),
    #[error("Signal integrity check failed. {0}")]
    InvalidSignature(#[from] SignatureError),
    #[error("Payment session unavailable. {0}")]
    GatewayUnavailable(GatewayError),
    #[error("The payment gateway could not be reached. Try again shortly. {0}")]
    GatewayRetryable(GatewayError),
    #[error("Order {0} changed state too many times while being settled")]
    TransitionConflict(MerchantOrderId),
}

impl SettlementError {
    /// Errors for which the same request can simply be repeated later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SettlementError::DatabaseBusy(_) |
                SettlementError::GatewayRetryable(_) |
                SettlementError::TransitionConflict(_)
        )
    }
}

impl From<LedgerError> for SettlementError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::DatabaseBusy(s) => SettlementError::DatabaseBusy(s),
            LedgerError::OrderNotFound(mid) => SettlementError::OrderNotFound(mid),
            LedgerError::DiscountUsageExhausted { per_owner: true, .. } => {
                SettlementError::DiscountRejected(DiscountRejection::AlreadyUsed)
            },
            LedgerError::DiscountUsageExhausted { per_owner: false, .. } => {
                SettlementError::DiscountRejected(DiscountRejection::UsageLimitReached)
            },
            e => SettlementError::DatabaseError(e.to_string()),
        }
    }
}

impl From<CartApiError> for SettlementError {
    fn from(e: CartApiError) -> Self {
        SettlementError::DatabaseError(e.to_string())
    }
}

impl From<DiscountError> for SettlementError {
    fn from(e: DiscountError) -> Self {
        match e {
            DiscountError::Rejected(r) => SettlementError::DiscountRejected(r),
            DiscountError::DatabaseError(s) => SettlementError::DatabaseError(s),
        }
    }
}

impl From<GatewayError> for SettlementError {
    fn from(e: GatewayError) -> Self {
        if e.session_never_created() {
            SettlementError::GatewayUnavailable(e)
        } else {
            SettlementError::GatewayRetryable(e)
        }
    }
}
