use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    db_types::{Order, OrderStatusType},
    gateway::BillingDetails,
    se_api::{cart_objects::DroppedLine, discount_api::DiscountQuote},
};

pub const DEFAULT_REDIRECT_GRACE: Duration = Duration::from_secs(3);
pub const DEFAULT_STALE_PENDING_AGE: Duration = Duration::from_secs(15 * 60);
pub const SESSION_UNAVAILABLE_REASON: &str = "payment session unavailable";

#[derive(Debug, Clone)]
pub struct SettlementOptions {
    pub currency: String,
    /// How long the redirect handler waits for the webhook before asking the gateway directly.
    pub redirect_grace: Duration,
    /// Pending orders older than this are inquired about during reconciliation.
    pub stale_pending_age: Duration,
    /// Where the gateway sends the purchaser after payment.
    pub redirect_url: Option<String>,
}

impl Default for SettlementOptions {
    fn default() -> Self {
        Self {
            currency: lms_common::DEFAULT_CURRENCY_CODE.to_string(),
            redirect_grace: DEFAULT_REDIRECT_GRACE,
            stale_pending_age: DEFAULT_STALE_PENDING_AGE,
            redirect_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub billing: BillingDetails,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckoutResult {
    /// The purchaser must pay at `payment_url`. The order stays pending until the gateway reports back.
    PaymentRequired { order: Order, payment_url: String, dropped: Vec<DroppedLine>, discount: Option<DiscountQuote> },
    /// Nothing to pay. The order was completed without contacting the gateway.
    Completed { order: Order, dropped: Vec<DroppedLine>, discount: Option<DiscountQuote> },
}

impl CheckoutResult {
    pub fn order(&self) -> &Order {
        match self {
            CheckoutResult::PaymentRequired { order, .. } | CheckoutResult::Completed { order, .. } => order,
        }
    }
}

/// What the coordinator did with a verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "order", rename_all = "snake_case")]
pub enum SettlementOutcome {
    /// This call moved the order to `Completed`.
    Completed(Order),
    /// This call moved a previously failed order to `Completed`.
    Corrected(Order),
    /// The order was already completed. Nothing changed apart from re-granting any missing entitlements.
    AlreadyProcessed(Order),
    /// This call moved the order to `Failed`.
    Failed(Order),
    /// The verdict did not change the order (pending verdicts, or failures arriving after a terminal state).
    Unchanged(Order),
    /// The signal does not describe a transaction and was not processed.
    Ignored,
}

impl SettlementOutcome {
    pub fn order(&self) -> Option<&Order> {
        match self {
            SettlementOutcome::Completed(o) |
            SettlementOutcome::Corrected(o) |
            SettlementOutcome::AlreadyProcessed(o) |
            SettlementOutcome::Failed(o) |
            SettlementOutcome::Unchanged(o) => Some(o),
            SettlementOutcome::Ignored => None,
        }
    }

    pub fn status(&self) -> Option<OrderStatusType> {
        self.order().map(|o| o.status)
    }

    /// `true` for every outcome that leaves the order paid for.
    pub fn is_success(&self) -> bool {
        self.status() == Some(OrderStatusType::Completed)
    }
}

/// The page state the purchaser lands on after the gateway redirect.
#[derive(Debug, Clone, Serialize)]
pub struct RedirectResolution {
    pub order_number: String,
    pub order: Order,
    /// `true` when the status came from an inquiry made during this request.
    pub inquired: bool,
}

impl RedirectResolution {
    pub fn new(order: Order, inquired: bool) -> Self {
        Self { order_number: order.order_number(), order, inquired }
    }

    pub fn status(&self) -> OrderStatusType {
        self.order.status
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    /// Completed orders whose missing entitlements were granted in this run.
    pub regranted: usize,
    /// Stale pending orders the gateway was asked about.
    pub inquired: usize,
    /// Of those, the ones that reached a terminal state.
    pub settled: usize,
    pub errors: usize,
}
