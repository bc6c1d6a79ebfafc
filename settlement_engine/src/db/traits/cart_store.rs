use crate::{db_types::CartLine, traits::LedgerError};

/// Session-scoped cart state. Nothing stored here is trusted for pricing; lines are revalued against the catalog on
/// every read, and only the applied discount *code* is kept.
#[allow(async_fn_in_trait)]
pub trait CartStore {
    async fn fetch_cart(&self, owner_id: &str) -> Result<Vec<CartLine>, LedgerError>;

    /// Adds or refreshes a line. Returns `false` if the item was already in the cart.
    async fn add_cart_line(&self, owner_id: &str, line: CartLine) -> Result<bool, LedgerError>;

    /// Returns `false` if the item was not in the cart.
    async fn remove_cart_line(&self, owner_id: &str, item_id: i64) -> Result<bool, LedgerError>;

    /// Replaces the whole stored cart with `lines` atomically.
    async fn replace_cart(&self, owner_id: &str, lines: &[CartLine]) -> Result<(), LedgerError>;

    /// Empties the cart and removes any applied discount.
    async fn clear_cart(&self, owner_id: &str) -> Result<(), LedgerError>;

    async fn applied_discount(&self, owner_id: &str) -> Result<Option<String>, LedgerError>;

    async fn set_applied_discount(&self, owner_id: &str, code: &str) -> Result<(), LedgerError>;

    async fn clear_applied_discount(&self, owner_id: &str) -> Result<(), LedgerError>;
}
