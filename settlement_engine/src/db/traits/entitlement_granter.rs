use crate::{
    db_types::{Entitlement, GrantOutcome},
    traits::EntitlementError,
};

/// Marks a purchaser as owning a catalog item.
///
/// Implementations must be idempotent: granting the same `(owner_id, item_id)` twice is harmless and reports
/// [`GrantOutcome::AlreadyGranted`] the second time. `order_id` is `None` for grants that do not come from a purchase.
#[allow(async_fn_in_trait)]
pub trait EntitlementGranter {
    async fn grant_access(&self, owner_id: &str, item_id: i64, order_id: Option<i64>) -> Result<GrantOutcome, EntitlementError>;

    async fn has_access(&self, owner_id: &str, item_id: i64) -> Result<bool, EntitlementError>;

    async fn entitlements_for_owner(&self, owner_id: &str) -> Result<Vec<Entitlement>, EntitlementError>;
}
