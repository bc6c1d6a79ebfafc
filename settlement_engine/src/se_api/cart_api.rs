use std::{
    collections::{HashMap, HashSet},
    fmt::Debug,
};

use log::*;

use crate::{
    db_types::CartLine,
    se_api::{
        cart_objects::{DropReason, DroppedLine, ValidatedCart, ValidatedLine},
        errors::CartApiError,
    },
    traits::{CartStore, CatalogManagement, EntitlementGranter},
};

/// `CartApi` prices carts against the catalog. Every price the engine charges comes out of [`CartApi::revalue`].
pub struct CartApi<B> {
    db: B,
}

impl<B> Debug for CartApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CartApi")
    }
}

impl<B> CartApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B> CartApi<B>
where B: CatalogManagement + CartStore + EntitlementGranter
{
    /// Revalues a list of cart item references against the current catalog.
    ///
    /// Lines are checked in order. The first occurrence of an item wins and later ones are dropped as duplicates.
    /// Items that are missing or not purchasable are dropped as unavailable, and, when `owner_id` is given, items
    /// the owner already has access to are dropped as already owned. Dropping a line is never an error.
    pub async fn revalue(&self, owner_id: Option<&str>, item_ids: &[i64]) -> Result<ValidatedCart, CartApiError> {
        let catalog = self.db.fetch_catalog_items(item_ids).await?;
        let catalog: HashMap<i64, _> = catalog.into_iter().map(|item| (item.id, item)).collect();
        let owned: HashSet<i64> = match owner_id {
            Some(owner) => self.db.entitlements_for_owner(owner).await?.into_iter().map(|e| e.item_id).collect(),
            None => HashSet::new(),
        };
        let mut seen = HashSet::new();
        let mut lines = Vec::with_capacity(item_ids.len());
        let mut dropped = Vec::new();
        for &item_id in item_ids {
            let purchasable = catalog.get(&item_id).filter(|item| item.status.is_purchasable());
            let line = if !seen.insert(item_id) {
                Err(DropReason::Duplicate)
            } else {
                match purchasable {
                    None => Err(DropReason::Unavailable),
                    Some(_) if owned.contains(&item_id) => Err(DropReason::AlreadyOwned),
                    Some(item) => Ok(ValidatedLine::from(item)),
                }
            };
            match line {
                Ok(line) => lines.push(line),
                Err(reason) => {
                    debug!("🛒️ Dropping item {item_id} from cart: {reason:?}");
                    dropped.push(DroppedLine { item_id, reason });
                },
            }
        }
        let cart = ValidatedCart::new(lines, dropped);
        trace!(
            "🛒️ Revalued cart: {} line(s), {} dropped, subtotal {}, total {}",
            cart.lines.len(),
            cart.dropped.len(),
            cart.subtotal,
            cart.total
        );
        Ok(cart)
    }

    /// Revalues the owner's stored cart, and replaces the stored lines with the surviving ones.
    pub async fn revalue_session_cart(&self, owner_id: &str) -> Result<ValidatedCart, CartApiError> {
        let stored = self.db.fetch_cart(owner_id).await?;
        let item_ids = stored.iter().map(|l| l.item_id).collect::<Vec<_>>();
        let cart = self.revalue(Some(owner_id), &item_ids).await?;
        self.db.replace_cart(owner_id, &cart.to_cart_lines(&stored)).await?;
        if !cart.dropped.is_empty() {
            info!("🛒️ {} line(s) were removed from the cart of {owner_id} during revaluation", cart.dropped.len());
        }
        Ok(cart)
    }

    /// Adds a purchasable item that the owner does not already have, and returns the revalued cart.
    /// Adding an item that is already in the cart is a no-op.
    pub async fn add_item(&self, owner_id: &str, item_id: i64) -> Result<ValidatedCart, CartApiError> {
        let item = self.db.fetch_catalog_item(item_id).await?.ok_or(CartApiError::ItemNotFound(item_id))?;
        if !item.status.is_purchasable() {
            return Err(CartApiError::ItemUnavailable(item_id));
        }
        if self.db.has_access(owner_id, item_id).await? {
            return Err(CartApiError::AlreadyOwned(item_id));
        }
        let line = ValidatedLine::from(&item);
        let added = self.db.add_cart_line(owner_id, CartLine::new(item_id, line.price, line.final_price)).await?;
        if added {
            debug!("🛒️ Item {item_id} added to the cart of {owner_id}");
        }
        self.revalue_session_cart(owner_id).await
    }

    pub async fn remove_item(&self, owner_id: &str, item_id: i64) -> Result<ValidatedCart, CartApiError> {
        if self.db.remove_cart_line(owner_id, item_id).await? {
            debug!("🛒️ Item {item_id} removed from the cart of {owner_id}");
        }
        self.revalue_session_cart(owner_id).await
    }

    /// Empties the owner's cart and forgets any applied discount code.
    pub async fn clear(&self, owner_id: &str) -> Result<(), CartApiError> {
        self.db.clear_cart(owner_id).await?;
        debug!("🛒️ Cart for {owner_id} cleared");
        Ok(())
    }
}
