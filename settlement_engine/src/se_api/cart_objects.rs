use std::collections::HashMap;

use lms_common::Money;
use serde::{Deserialize, Serialize};

use crate::db_types::{CartLine, CatalogItem, NewOrderItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// The item no longer exists, or is not currently purchasable.
    Unavailable,
    /// The owner already has access to the item.
    AlreadyOwned,
    /// The item appeared more than once in the cart.
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedLine {
    pub item_id: i64,
    pub reason: DropReason,
}

/// A cart line priced from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedLine {
    pub item_id: i64,
    pub title: String,
    pub price: Money,
    pub final_price: Money,
    pub commission_rate: f64,
}

impl From<&CatalogItem> for ValidatedLine {
    fn from(item: &CatalogItem) -> Self {
        Self {
            item_id: item.id,
            title: item.title.clone(),
            price: item.price,
            final_price: item.final_price(),
            commission_rate: item.commission_rate,
        }
    }
}

/// The output of cart revaluation. Client-supplied prices never make it in here.
///
/// `subtotal` is the sum of the catalog list prices and `total` the sum of the final (per-item discounted) prices.
/// Discount codes and order totals are computed from `total`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidatedCart {
    pub lines: Vec<ValidatedLine>,
    pub subtotal: Money,
    pub total: Money,
    pub dropped: Vec<DroppedLine>,
}

impl ValidatedCart {
    pub fn new(lines: Vec<ValidatedLine>, dropped: Vec<DroppedLine>) -> Self {
        let subtotal = lines.iter().map(|l| l.price).sum();
        let total = lines.iter().map(|l| l.final_price).sum();
        Self { lines, subtotal, total, dropped }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn item_ids(&self) -> Vec<i64> {
        self.lines.iter().map(|l| l.item_id).collect()
    }

    pub fn to_order_items(&self) -> Vec<NewOrderItem> {
        self.lines
            .iter()
            .map(|l| NewOrderItem::new(l.item_id, l.title.clone(), l.price, l.final_price, l.commission_rate))
            .collect()
    }

    /// The stored form of the validated lines. `previous` supplies the original `added_at` timestamps.
    pub fn to_cart_lines(&self, previous: &[CartLine]) -> Vec<CartLine> {
        let added: HashMap<i64, _> = previous.iter().map(|l| (l.item_id, l.added_at)).collect();
        self.lines
            .iter()
            .map(|l| {
                let mut line = CartLine::new(l.item_id, l.price, l.final_price);
                if let Some(at) = added.get(&l.item_id) {
                    line.added_at = *at;
                }
                line
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn line(item_id: i64, price: i64, final_price: i64) -> ValidatedLine {
        ValidatedLine {
            item_id,
            title: format!("Course {item_id}"),
            price: Money::from(price),
            final_price: Money::from(final_price),
            commission_rate: 10.0,
        }
    }

    #[test]
    fn totals() {
        let cart = ValidatedCart::new(vec![line(1, 300, 300), line(2, 400, 200)], vec![]);
        assert_eq!(cart.subtotal, Money::from(700));
        assert_eq!(cart.total, Money::from(500));
        assert_eq!(cart.item_ids(), vec![1, 2]);
        let items = cart.to_order_items();
        assert_eq!(items[1].final_price, Money::from(200));
        assert_eq!(items[1].commission, Money::from(20));
    }

    #[test]
    fn stored_lines_keep_their_timestamps() {
        let mut old = CartLine::new(2, Money::from(999), Money::from(999));
        old.added_at = chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default();
        let cart = ValidatedCart::new(vec![line(1, 300, 300), line(2, 400, 200)], vec![]);
        let lines = cart.to_cart_lines(&[old.clone()]);
        assert_eq!(lines[1].added_at, old.added_at);
        assert_eq!(lines[1].price, Money::from(400));
        assert_ne!(lines[0].added_at, old.added_at);
    }
}
