use thiserror::Error;

use crate::db_types::{Order, OrderItem};

#[derive(Debug, Clone, Error)]
pub enum NotificationError {
    #[error("The receipt could not be delivered. {0}")]
    Undeliverable(String),
}

/// Hands purchase receipts to whatever delivers them. Failures are reported to the caller, who logs them. They never
/// affect settlement.
#[allow(async_fn_in_trait)]
pub trait ReceiptNotifier {
    async fn send_receipt(&self, owner_id: &str, order: &Order, items: &[OrderItem]) -> Result<(), NotificationError>;
}
