//! # Settlement engine backends
//!
//! The traits in this module define the contracts a storage backend must satisfy to drive the settlement engine.
//!
//! * [`OrderLedger`] is the system of record for orders and owns the guarded status transitions.
//! * [`CatalogManagement`] is the read model of the catalog that the cart revaluator prices against.
//! * [`DiscountManagement`] stores discount codes and their redemptions.
//! * [`CartStore`] keeps each owner's session cart and applied discount code.
//! * [`EntitlementGranter`] records course ownership.
//!
//! [`SettlementDatabase`] bundles all of them, and is implemented automatically for any type that implements the lot.
mod cart_store;
mod catalog_management;
mod discount_management;
mod entitlement_granter;
mod errors;
mod order_ledger;

pub use cart_store::CartStore;
pub use catalog_management::CatalogManagement;
pub use discount_management::DiscountManagement;
pub use entitlement_granter::EntitlementGranter;
pub use errors::{EntitlementError, LedgerError};
pub use order_ledger::{OrderLedger, SettlementDetails};

pub trait SettlementDatabase:
    OrderLedger + CatalogManagement + DiscountManagement + CartStore + EntitlementGranter {
}

impl<T> SettlementDatabase for T where T: OrderLedger + CatalogManagement + DiscountManagement + CartStore + EntitlementGranter
{}
