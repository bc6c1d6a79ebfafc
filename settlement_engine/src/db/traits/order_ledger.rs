use chrono::Duration;

use crate::{
    db_types::{MerchantOrderId, NewOrder, NewSignal, Order, OrderItem, SettlementSignal, Transition},
    se_api::order_objects::OrderQueryFilter,
    traits::LedgerError,
};

/// Everything the settlement coordinator needs to record in the settlement state machine.
#[derive(Debug, Clone, Default)]
pub struct SettlementDetails {
    pub transaction_id: Option<String>,
    pub gateway_order_id: Option<String>,
    /// Raw snapshot of the deciding signal.
    pub gateway_response: Option<String>,
}

/// The Order Ledger. This is the system of record for settlement state.
///
/// Order status only ever changes through the guarded transitions on this trait ([`OrderLedger::complete_order`],
/// [`OrderLedger::fail_order`] and [`OrderLedger::reopen_failed_order`]). Each is a single conditional update that
/// applies only if the stored status still matches the expected precondition, and is the only concurrency control
/// point in the settlement flow.
#[allow(async_fn_in_trait)]
pub trait OrderLedger: Clone {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Stores a new `Pending` order with its line items in a single atomic transaction.
    async fn insert_order(&self, order: NewOrder) -> Result<Order, LedgerError>;

    async fn fetch_order(&self, merchant_order_id: &MerchantOrderId) -> Result<Option<Order>, LedgerError>;

    async fn fetch_order_by_id(&self, id: i64) -> Result<Option<Order>, LedgerError>;

    async fn fetch_order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, LedgerError>;

    /// The most recently created order for `owner_id` that is still `Pending`.
    async fn latest_pending_order_for_owner(&self, owner_id: &str) -> Result<Option<Order>, LedgerError>;

    /// Records the gateway's order id and payment URL once a payment session exists. Status is not touched.
    async fn attach_gateway_session(
        &self,
        merchant_order_id: &MerchantOrderId,
        gateway_order_id: &str,
        payment_url: &str,
    ) -> Result<Order, LedgerError>;

    /// `Pending -> Completed`. In the same database transaction, the discount redemption for the order (if any) is
    /// recorded. A replay never records a second redemption.
    async fn complete_order(
        &self,
        merchant_order_id: &MerchantOrderId,
        details: SettlementDetails,
    ) -> Result<Transition, LedgerError>;

    /// `Pending -> Failed`, with a human-readable reason.
    async fn fail_order(
        &self,
        merchant_order_id: &MerchantOrderId,
        reason: &str,
        details: SettlementDetails,
    ) -> Result<Transition, LedgerError>;

    /// `Failed -> Pending`. Only used when a later success signal corrects an earlier failure.
    async fn reopen_failed_order(&self, merchant_order_id: &MerchantOrderId) -> Result<Transition, LedgerError>;

    /// Atomically sets the `notification_sent` flag. Returns `true` only for the single caller that flipped it.
    async fn claim_notification(&self, order_id: i64) -> Result<bool, LedgerError>;

    async fn mark_entitlements_granted(&self, order_id: i64) -> Result<(), LedgerError>;

    /// Fetches orders according to criteria specified in the `OrderQueryFilter`, ordered by `created_at`.
    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, LedgerError>;

    /// Appends a gateway signal to the audit log.
    async fn log_signal(&self, signal: NewSignal) -> Result<(), LedgerError>;

    async fn fetch_signals(&self, merchant_order_id: &MerchantOrderId) -> Result<Vec<SettlementSignal>, LedgerError>;

    /// Completed orders whose entitlement grants have not all succeeded yet.
    async fn orders_missing_entitlements(&self) -> Result<Vec<Order>, LedgerError>;

    /// Pending orders with a gateway session that have not been updated for at least `age`.
    async fn stale_pending_orders(&self, age: Duration) -> Result<Vec<Order>, LedgerError>;

    async fn close(&mut self) -> Result<(), LedgerError>;
}
