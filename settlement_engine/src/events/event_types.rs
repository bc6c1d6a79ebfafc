use serde::{Deserialize, Serialize};

use crate::db_types::{Order, OrderItem};

/// Published exactly once per order, by the caller that won the `Pending -> Completed` transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCompletedEvent {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

impl OrderCompletedEvent {
    pub fn new(order: Order, items: Vec<OrderItem>) -> Self {
        Self { order, items }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFailedEvent {
    pub order: Order,
    pub reason: String,
}

impl OrderFailedEvent {
    pub fn new(order: Order, reason: &str) -> Self {
        Self { order, reason: reason.to_string() }
    }
}

/// A request to deliver a purchase receipt. The settlement coordinator emits at most one per order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptEvent {
    pub owner_id: String,
    pub order_number: String,
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventType {
    OrderCompleted(OrderCompletedEvent),
    OrderFailed(OrderFailedEvent),
    Receipt(ReceiptEvent),
}
