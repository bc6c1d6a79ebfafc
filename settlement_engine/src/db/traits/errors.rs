use thiserror::Error;

use crate::db_types::{MerchantOrderId, OrderStatusType};

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("We have an internal database engine (configuration/uptime etc.) error: {0}")]
    DatabaseError(String),
    #[error("The database is busy. The operation can be retried. {0}")]
    DatabaseBusy(String),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(MerchantOrderId),
    #[error("The requested order (internal id {0}) does not exist")]
    OrderIdNotFound(i64),
    #[error("Cannot insert order, since it already exists with correlation id {0}")]
    OrderAlreadyExists(MerchantOrderId),
    #[error("An order cannot move from {from} to {to}")]
    IllegalTransition { from: OrderStatusType, to: OrderStatusType },
    #[error("Catalog item {0} does not exist")]
    CatalogItemNotFound(i64),
    #[error("Discount code {0} already exists")]
    DiscountAlreadyExists(String),
    #[error("Discount code {code} has no uses left")]
    DiscountUsageExhausted { code: String, per_owner: bool },
}

impl LedgerError {
    /// Busy/locked databases and pool timeouts are worth retrying. Everything else is not.
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::DatabaseBusy(_))
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::PoolTimedOut => LedgerError::DatabaseBusy(e.to_string()),
            sqlx::Error::Database(db) => {
                let msg = db.message().to_ascii_lowercase();
                if msg.contains("database is locked") || msg.contains("busy") {
                    LedgerError::DatabaseBusy(e.to_string())
                } else {
                    LedgerError::DatabaseError(e.to_string())
                }
            },
            _ => LedgerError::DatabaseError(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum EntitlementError {
    #[error("Could not grant access to item {item_id} for {owner_id}: {reason}")]
    GrantFailed { owner_id: String, item_id: i64, reason: String },
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for EntitlementError {
    fn from(e: sqlx::Error) -> Self {
        EntitlementError::DatabaseError(e.to_string())
    }
}
