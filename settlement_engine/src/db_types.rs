use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
pub use lms_common::Money;
use log::error;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid value for {0}: {1}")]
pub struct ConversionError(&'static str, String);

//--------------------------------------   MerchantOrderId     ---------------------------------------------------------
/// The correlation id generated at checkout. It is sent to the gateway and echoed back on every signal channel, which
/// makes it the only reliable key for locating an order from a gateway signal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct MerchantOrderId(pub String);

impl MerchantOrderId {
    pub fn new_random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for MerchantOrderId {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ConversionError("merchant order id", "empty string".into()));
        }
        Ok(Self(s.to_string()))
    }
}

impl From<String> for MerchantOrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for MerchantOrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The human-facing order number, derived from the internal row id.
pub fn order_number(id: i64) -> String {
    format!("LMS-{id:08}")
}

//--------------------------------------   OrderStatusType     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OrderStatusType {
    /// The order has been created and is waiting for a verdict from the payment gateway.
    Pending,
    /// Payment was confirmed. This is terminal.
    Completed,
    /// Payment was declined, or no payment session could be created.
    Failed,
}

impl OrderStatusType {
    /// The order state machine. `Failed -> Pending` is the only backward edge, and exists solely so that a later
    /// success signal can correct an earlier failure classification.
    pub fn can_transition_to(&self, next: OrderStatusType) -> bool {
        use OrderStatusType::*;
        matches!((self, next), (Pending, Completed) | (Pending, Failed) | (Failed, Pending))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatusType::Completed)
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatusType::Pending => write!(f, "Pending"),
            OrderStatusType::Completed => write!(f, "Completed"),
            OrderStatusType::Failed => write!(f, "Failed"),
        }
    }
}

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Completed" => Ok(Self::Completed),
            "Failed" => Ok(Self::Failed),
            s => Err(ConversionError("order status", s.to_string())),
        }
    }
}

impl From<String> for OrderStatusType {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid order status: {value}. But this conversion cannot fail. Defaulting to Pending");
            OrderStatusType::Pending
        })
    }
}

//--------------------------------------        Order          ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub merchant_order_id: MerchantOrderId,
    pub owner_id: String,
    pub subtotal: Money,
    pub discount_code: Option<String>,
    pub discount_amount: Money,
    pub total: Money,
    pub currency: String,
    pub status: OrderStatusType,
    pub gateway_transaction_id: Option<String>,
    pub gateway_order_id: Option<String>,
    pub payment_url: Option<String>,
    /// Raw snapshot of the signal that decided the order, kept for audit and replay.
    pub gateway_response: Option<String>,
    pub failure_reason: Option<String>,
    pub notification_sent: bool,
    pub entitlements_granted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn order_number(&self) -> String {
        order_number(self.id)
    }

    pub fn is_pending(&self) -> bool {
        self.status == OrderStatusType::Pending
    }

    pub fn has_gateway_session(&self) -> bool {
        self.gateway_order_id.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub item_id: i64,
    pub title: String,
    pub original_price: Money,
    pub final_price: Money,
    /// The platform's share of `final_price`.
    pub commission: Money,
    pub instructor_share: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub item_id: i64,
    pub title: String,
    pub original_price: Money,
    pub final_price: Money,
    pub commission: Money,
    pub instructor_share: Money,
}

impl NewOrderItem {
    /// Splits `final_price` between the platform (at `commission_rate` percent) and the instructor.
    pub fn new(item_id: i64, title: String, original_price: Money, final_price: Money, commission_rate: f64) -> Self {
        let commission = final_price.percent(commission_rate);
        let instructor_share = final_price - commission;
        Self { item_id, title, original_price, final_price, commission, instructor_share }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub merchant_order_id: MerchantOrderId,
    pub owner_id: String,
    pub items: Vec<NewOrderItem>,
    pub subtotal: Money,
    pub discount_code: Option<String>,
    pub discount_amount: Money,
    pub total: Money,
    pub currency: String,
}

impl NewOrder {
    /// Creates a new order with a fresh correlation id. The subtotal is the sum of the item prices, and no discount.
    pub fn new(owner_id: &str, items: Vec<NewOrderItem>, currency: &str) -> Self {
        let subtotal: Money = items.iter().map(|i| i.final_price).sum();
        Self {
            merchant_order_id: MerchantOrderId::new_random(),
            owner_id: owner_id.to_string(),
            items,
            subtotal,
            discount_code: None,
            discount_amount: Money::zero(),
            total: subtotal,
            currency: currency.to_string(),
        }
    }

    pub fn with_discount(mut self, code: &str, amount: Money) -> Self {
        self.discount_code = Some(code.to_string());
        self.discount_amount = amount;
        self.total = (self.subtotal - amount).non_negative();
        self
    }
}

/// The result of a guarded status update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The stored status matched the precondition and was changed. Contains the updated order.
    Applied(Order),
    /// Another writer got there first, or the order was never in the expected state. Contains the current order.
    NotApplied(Order),
}

impl Transition {
    pub fn order(&self) -> &Order {
        match self {
            Transition::Applied(o) | Transition::NotApplied(o) => o,
        }
    }

    pub fn into_order(self) -> Order {
        match self {
            Transition::Applied(o) | Transition::NotApplied(o) => o,
        }
    }

    pub fn was_applied(&self) -> bool {
        matches!(self, Transition::Applied(_))
    }
}

//--------------------------------------     Catalog           ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize, Default)]
pub enum CatalogStatus {
    #[default]
    Published,
    Draft,
    Inactive,
    /// Published, but closed for new enrolments.
    Closed,
}

impl CatalogStatus {
    pub fn is_purchasable(&self) -> bool {
        matches!(self, CatalogStatus::Published)
    }
}

impl Display for CatalogStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CatalogStatus::Published => "Published",
            CatalogStatus::Draft => "Draft",
            CatalogStatus::Inactive => "Inactive",
            CatalogStatus::Closed => "Closed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: i64,
    pub title: String,
    pub price: Money,
    pub percent_discount: f64,
    pub commission_rate: f64,
    pub status: CatalogStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CatalogItem {
    /// `price - price * percent_discount / 100`, never negative.
    pub fn final_price(&self) -> Money {
        (self.price - self.price.percent(self.percent_discount)).non_negative()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCatalogItem {
    pub title: String,
    pub price: Money,
    #[serde(default)]
    pub percent_discount: f64,
    #[serde(default)]
    pub commission_rate: f64,
    #[serde(default)]
    pub status: CatalogStatus,
}

impl NewCatalogItem {
    pub fn new(title: &str, price: Money) -> Self {
        Self { title: title.into(), price, percent_discount: 0.0, commission_rate: 0.0, status: CatalogStatus::Published }
    }

    pub fn with_percent_discount(mut self, pct: f64) -> Self {
        self.percent_discount = pct;
        self
    }

    pub fn with_commission_rate(mut self, pct: f64) -> Self {
        self.commission_rate = pct;
        self
    }

    pub fn with_status(mut self, status: CatalogStatus) -> Self {
        self.status = status;
        self
    }
}

//--------------------------------------     Discounts         ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum DiscountKind {
    /// `value` is a whole percentage of the subtotal.
    Percent,
    /// `value` is an amount in minor units.
    Fixed,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Discount {
    pub id: i64,
    pub code: String,
    pub kind: DiscountKind,
    pub value: i64,
    pub active: bool,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    pub max_uses: Option<i64>,
    pub max_uses_per_user: i64,
    pub first_purchase_only: bool,
    pub min_subtotal: Option<Money>,
    pub created_at: DateTime<Utc>,
}

impl Discount {
    /// The discount amount for the given subtotal, before any cap is applied.
    #[allow(clippy::cast_precision_loss)]
    pub fn amount_for(&self, subtotal: Money) -> Money {
        match self.kind {
            DiscountKind::Percent => subtotal.percent(self.value as f64),
            DiscountKind::Fixed => Money::from(self.value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDiscount {
    pub code: String,
    pub kind: DiscountKind,
    pub value: i64,
    pub active: bool,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub max_uses: Option<i64>,
    pub max_uses_per_user: i64,
    pub first_purchase_only: bool,
    pub min_subtotal: Option<Money>,
}

impl NewDiscount {
    pub fn new(code: &str, kind: DiscountKind, value: i64) -> Self {
        Self {
            code: normalize_code(code),
            kind,
            value,
            active: true,
            starts_at: None,
            ends_at: None,
            max_uses: None,
            max_uses_per_user: 1,
            first_purchase_only: false,
            min_subtotal: None,
        }
    }

    pub fn percent(code: &str, pct: i64) -> Self {
        Self::new(code, DiscountKind::Percent, pct)
    }

    pub fn fixed(code: &str, amount: Money) -> Self {
        Self::new(code, DiscountKind::Fixed, amount.value())
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    pub fn valid_between(mut self, starts_at: DateTime<Utc>, ends_at: Option<DateTime<Utc>>) -> Self {
        self.starts_at = Some(starts_at);
        self.ends_at = ends_at;
        self
    }

    pub fn with_max_uses(mut self, max_uses: i64) -> Self {
        self.max_uses = Some(max_uses);
        self
    }

    pub fn with_max_uses_per_user(mut self, n: i64) -> Self {
        self.max_uses_per_user = n;
        self
    }

    pub fn first_purchase_only(mut self) -> Self {
        self.first_purchase_only = true;
        self
    }

    pub fn with_min_subtotal(mut self, min: Money) -> Self {
        self.min_subtotal = Some(min);
        self
    }
}

/// Discount codes are case-insensitive and stored upper-case.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct DiscountRedemption {
    pub id: i64,
    pub discount_code: String,
    pub order_id: i64,
    pub owner_id: String,
    pub amount: Money,
    pub redeemed_at: DateTime<Utc>,
}

//--------------------------------------       Carts           ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct CartLine {
    pub item_id: i64,
    /// Snapshot only. Never used for pricing without revaluation.
    pub price: Money,
    pub final_price: Money,
    pub added_at: DateTime<Utc>,
}

impl CartLine {
    pub fn new(item_id: i64, price: Money, final_price: Money) -> Self {
        Self { item_id, price, final_price, added_at: Utc::now() }
    }
}

//--------------------------------------    Entitlements       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Entitlement {
    pub id: i64,
    pub owner_id: String,
    pub item_id: i64,
    pub order_id: Option<i64>,
    pub granted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GrantOutcome {
    Granted,
    AlreadyGranted,
}

//--------------------------------------   Settlement signals  ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
pub enum SignalChannel {
    Webhook,
    Redirect,
    Inquiry,
    /// Zero-total orders settle internally without a gateway.
    Internal,
}

impl Display for SignalChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SignalChannel::Webhook => "webhook",
            SignalChannel::Redirect => "redirect",
            SignalChannel::Inquiry => "inquiry",
            SignalChannel::Internal => "internal",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum VerdictOutcome {
    Success,
    Failure,
    Pending,
}

impl Display for VerdictOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            VerdictOutcome::Success => "success",
            VerdictOutcome::Failure => "failure",
            VerdictOutcome::Pending => "pending",
        };
        f.write_str(s)
    }
}

/// Which rule decided a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum Evidence {
    ExplicitFlag,
    StatusCode,
    AmountReconciliation,
    /// Explicit success together with a failure flag in the same payload.
    Contradictory,
    Unclassified,
    ZeroTotal,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct SettlementSignal {
    pub id: i64,
    pub merchant_order_id: Option<MerchantOrderId>,
    pub channel: SignalChannel,
    pub outcome: VerdictOutcome,
    pub evidence: Evidence,
    pub reason: Option<String>,
    pub verified: bool,
    pub needs_review: bool,
    pub raw_payload: String,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSignal {
    pub merchant_order_id: Option<MerchantOrderId>,
    pub channel: SignalChannel,
    pub outcome: VerdictOutcome,
    pub evidence: Evidence,
    pub reason: Option<String>,
    pub verified: bool,
    pub needs_review: bool,
    pub raw_payload: String,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_transitions() {
        use OrderStatusType::*;
        assert!(Pending.can_transition_to(Completed));
        assert!(Pending.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Pending));
        assert!(!Failed.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Pending.can_transition_to(Pending));
    }

    #[test]
    fn order_numbers_are_zero_padded() {
        assert_eq!(order_number(42), "LMS-00000042");
    }

    #[test]
    fn commission_split() {
        let item = NewOrderItem::new(1, "Rust".into(), Money::from(50_000), Money::from(45_000), 20.0);
        assert_eq!(item.commission, Money::from(9_000));
        assert_eq!(item.instructor_share, Money::from(36_000));
    }

    #[test]
    fn catalog_final_price() {
        let mut item = CatalogItem {
            id: 1,
            title: "Rust".into(),
            price: Money::from(20_000),
            percent_discount: 25.0,
            commission_rate: 0.0,
            status: CatalogStatus::Published,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(item.final_price(), Money::from(15_000));
        item.percent_discount = 150.0;
        assert_eq!(item.final_price(), Money::zero());
    }

    #[test]
    fn new_order_totals() {
        let items = vec![
            NewOrderItem::new(1, "A".into(), Money::from(300), Money::from(300), 0.0),
            NewOrderItem::new(2, "B".into(), Money::from(200), Money::from(200), 0.0),
        ];
        let order = NewOrder::new("alice", items, "EGP").with_discount("HALF", Money::from(250));
        assert_eq!(order.subtotal, Money::from(500));
        assert_eq!(order.total, Money::from(250));
        assert_eq!(normalize_code(" half "), "HALF");
    }
}
