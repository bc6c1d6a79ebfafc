use crate::{
    db_types::{Discount, DiscountRedemption, NewDiscount},
    traits::LedgerError,
};

#[allow(async_fn_in_trait)]
pub trait DiscountManagement {
    /// Fetches a discount by code. The lookup is case-insensitive.
    async fn fetch_discount(&self, code: &str) -> Result<Option<Discount>, LedgerError>;

    async fn insert_discount(&self, discount: NewDiscount) -> Result<Discount, LedgerError>;

    /// Total number of completed orders that redeemed `code`.
    async fn redemption_count(&self, code: &str) -> Result<i64, LedgerError>;

    async fn redemption_count_for_owner(&self, code: &str, owner_id: &str) -> Result<i64, LedgerError>;

    /// Completed redemptions of `code` plus the pending orders that hold it. Usage caps are checked against this.
    async fn reservation_count(&self, code: &str) -> Result<i64, LedgerError>;

    async fn reservation_count_for_owner(&self, code: &str, owner_id: &str) -> Result<i64, LedgerError>;

    async fn redemptions_for_order(&self, order_id: i64) -> Result<Vec<DiscountRedemption>, LedgerError>;

    /// Number of completed orders for `owner_id`. Used by first-purchase-only codes.
    async fn completed_order_count(&self, owner_id: &str) -> Result<i64, LedgerError>;
}
