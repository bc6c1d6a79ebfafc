//! `SqliteDatabase` is a concrete implementation of a settlement engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`traits`] module.
use std::fmt::Debug;

use chrono::Duration;
use lms_common::retry::{retry_with_backoff, RetryPolicy};
use log::*;
use sqlx::SqlitePool;

use super::{carts, catalog, db_url, discounts, entitlements, new_pool, orders, signals};
use crate::{
    db_types::{
        CartLine,
        CatalogItem,
        CatalogStatus,
        Discount,
        DiscountRedemption,
        Entitlement,
        GrantOutcome,
        MerchantOrderId,
        NewCatalogItem,
        NewDiscount,
        NewOrder,
        NewSignal,
        Order,
        OrderItem,
        SettlementSignal,
        Transition,
    },
    order_objects::OrderQueryFilter,
    traits::{
        CartStore,
        CatalogManagement,
        DiscountManagement,
        EntitlementError,
        EntitlementGranter,
        LedgerError,
        OrderLedger,
        SettlementDetails,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
    retry: RetryPolicy,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool, retry: RetryPolicy::default() })
    }

    /// Overrides the backoff policy used when a guarded transition hits a busy database.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn try_complete_order(
        &self,
        merchant_order_id: &MerchantOrderId,
        details: &SettlementDetails,
    ) -> Result<Transition, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let transition = match orders::complete_if_pending(merchant_order_id, details, &mut tx).await? {
            Some(order) => {
                discounts::record_redemption(&order, &mut tx).await?;
                Transition::Applied(order)
            },
            None => {
                let current = orders::fetch_order_by_merchant_id(merchant_order_id, &mut tx)
                    .await?
                    .ok_or_else(|| LedgerError::OrderNotFound(merchant_order_id.clone()))?;
                Transition::NotApplied(current)
            },
        };
        tx.commit().await?;
        Ok(transition)
    }

    async fn try_fail_order(
        &self,
        merchant_order_id: &MerchantOrderId,
        reason: &str,
        details: &SettlementDetails,
    ) -> Result<Transition, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let transition = match orders::fail_if_pending(merchant_order_id, reason, details, &mut tx).await? {
            Some(order) => Transition::Applied(order),
            None => {
                let current = orders::fetch_order_by_merchant_id(merchant_order_id, &mut tx)
                    .await?
                    .ok_or_else(|| LedgerError::OrderNotFound(merchant_order_id.clone()))?;
                Transition::NotApplied(current)
            },
        };
        tx.commit().await?;
        Ok(transition)
    }

    async fn try_reopen_order(&self, merchant_order_id: &MerchantOrderId) -> Result<Transition, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let transition = match orders::reopen_if_failed(merchant_order_id, &mut tx).await? {
            Some(order) => Transition::Applied(order),
            None => {
                let current = orders::fetch_order_by_merchant_id(merchant_order_id, &mut tx)
                    .await?
                    .ok_or_else(|| LedgerError::OrderNotFound(merchant_order_id.clone()))?;
                Transition::NotApplied(current)
            },
        };
        tx.commit().await?;
        Ok(transition)
    }
}

impl OrderLedger for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_order(&self, order: NewOrder) -> Result<Order, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::insert_order(order, &mut tx).await?;
        discounts::ensure_within_limits(&order, &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn fetch_order(&self, merchant_order_id: &MerchantOrderId) -> Result<Option<Order>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_merchant_id(merchant_order_id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_by_id(&self, id: i64) -> Result<Option<Order>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_id(id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let items = orders::fetch_order_items(order_id, &mut conn).await?;
        Ok(items)
    }

    async fn latest_pending_order_for_owner(&self, owner_id: &str) -> Result<Option<Order>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::latest_pending_order_for_owner(owner_id, &mut conn).await?;
        Ok(order)
    }

    async fn attach_gateway_session(
        &self,
        merchant_order_id: &MerchantOrderId,
        gateway_order_id: &str,
        payment_url: &str,
    ) -> Result<Order, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::attach_gateway_session(merchant_order_id, gateway_order_id, payment_url, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Gateway order {gateway_order_id} attached to {merchant_order_id}");
        Ok(order)
    }

    async fn complete_order(
        &self,
        merchant_order_id: &MerchantOrderId,
        details: SettlementDetails,
    ) -> Result<Transition, LedgerError> {
        let transition = retry_with_backoff(self.retry, "complete_order", LedgerError::is_transient, || {
            self.try_complete_order(merchant_order_id, &details)
        })
        .await?;
        match &transition {
            Transition::Applied(o) => debug!("🗃️ Order {} [{merchant_order_id}] is now Completed", o.order_number()),
            Transition::NotApplied(o) => {
                debug!("🗃️ Order {} [{merchant_order_id}] was not completed. It is {}", o.order_number(), o.status)
            },
        }
        Ok(transition)
    }

    async fn fail_order(
        &self,
        merchant_order_id: &MerchantOrderId,
        reason: &str,
        details: SettlementDetails,
    ) -> Result<Transition, LedgerError> {
        let transition = retry_with_backoff(self.retry, "fail_order", LedgerError::is_transient, || {
            self.try_fail_order(merchant_order_id, reason, &details)
        })
        .await?;
        if transition.was_applied() {
            debug!("🗃️ Order [{merchant_order_id}] is now Failed: {reason}");
        }
        Ok(transition)
    }

    async fn reopen_failed_order(&self, merchant_order_id: &MerchantOrderId) -> Result<Transition, LedgerError> {
        let transition = retry_with_backoff(self.retry, "reopen_failed_order", LedgerError::is_transient, || {
            self.try_reopen_order(merchant_order_id)
        })
        .await?;
        if transition.was_applied() {
            debug!("🗃️ Failed order [{merchant_order_id}] has been reopened");
        }
        Ok(transition)
    }

    async fn claim_notification(&self, order_id: i64) -> Result<bool, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let claimed = orders::claim_notification(order_id, &mut tx).await?;
        tx.commit().await?;
        Ok(claimed)
    }

    async fn mark_entitlements_granted(&self, order_id: i64) -> Result<(), LedgerError> {
        let mut tx = self.pool.begin().await?;
        orders::mark_entitlements_granted(order_id, &mut tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::search_orders(query, &mut conn).await?;
        Ok(orders)
    }

    async fn log_signal(&self, signal: NewSignal) -> Result<(), LedgerError> {
        let mut tx = self.pool.begin().await?;
        let id = signals::insert_signal(signal, &mut tx).await?;
        tx.commit().await?;
        trace!("🗃️ Signal #{id} saved to the audit log");
        Ok(())
    }

    async fn fetch_signals(&self, merchant_order_id: &MerchantOrderId) -> Result<Vec<SettlementSignal>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let signals = signals::signals_for_order(merchant_order_id, &mut conn).await?;
        Ok(signals)
    }

    async fn orders_missing_entitlements(&self) -> Result<Vec<Order>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::orders_missing_entitlements(&mut conn).await?;
        Ok(orders)
    }

    async fn stale_pending_orders(&self, age: Duration) -> Result<Vec<Order>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::stale_pending_orders(age, &mut conn).await?;
        Ok(orders)
    }

    async fn close(&mut self) -> Result<(), LedgerError> {
        self.pool.close().await;
        Ok(())
    }
}

impl CatalogManagement for SqliteDatabase {
    async fn fetch_catalog_item(&self, item_id: i64) -> Result<Option<CatalogItem>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let item = catalog::fetch_item(item_id, &mut conn).await?;
        Ok(item)
    }

    async fn fetch_catalog_items(&self, item_ids: &[i64]) -> Result<Vec<CatalogItem>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let items = catalog::fetch_items(item_ids, &mut conn).await?;
        Ok(items)
    }

    async fn insert_catalog_item(&self, item: NewCatalogItem) -> Result<CatalogItem, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let item = catalog::insert_item(item, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Catalog item #{} '{}' saved at {}", item.id, item.title, item.price);
        Ok(item)
    }

    async fn update_catalog_status(&self, item_id: i64, status: CatalogStatus) -> Result<CatalogItem, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let item = catalog::update_status(item_id, status, &mut tx).await?;
        tx.commit().await?;
        Ok(item)
    }
}

impl DiscountManagement for SqliteDatabase {
    async fn fetch_discount(&self, code: &str) -> Result<Option<Discount>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let discount = discounts::fetch_discount(code, &mut conn).await?;
        Ok(discount)
    }

    async fn insert_discount(&self, discount: NewDiscount) -> Result<Discount, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let discount = discounts::insert_discount(discount, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Discount code {} created", discount.code);
        Ok(discount)
    }

    async fn redemption_count(&self, code: &str) -> Result<i64, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let count = discounts::redemption_count(code, &mut conn).await?;
        Ok(count)
    }

    async fn reservation_count(&self, code: &str) -> Result<i64, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let count = discounts::reservation_count(code, &mut conn).await?;
        Ok(count)
    }

    async fn reservation_count_for_owner(&self, code: &str, owner_id: &str) -> Result<i64, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let count = discounts::reservation_count_for_owner(code, owner_id, &mut conn).await?;
        Ok(count)
    }

    async fn redemption_count_for_owner(&self, code: &str, owner_id: &str) -> Result<i64, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let count = discounts::redemption_count_for_owner(code, owner_id, &mut conn).await?;
        Ok(count)
    }

    async fn redemptions_for_order(&self, order_id: i64) -> Result<Vec<DiscountRedemption>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let rows = discounts::redemptions_for_order(order_id, &mut conn).await?;
        Ok(rows)
    }

    async fn completed_order_count(&self, owner_id: &str) -> Result<i64, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let count = discounts::completed_order_count(owner_id, &mut conn).await?;
        Ok(count)
    }
}

impl CartStore for SqliteDatabase {
    async fn fetch_cart(&self, owner_id: &str) -> Result<Vec<CartLine>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let lines = carts::fetch_cart(owner_id, &mut conn).await?;
        Ok(lines)
    }

    async fn add_cart_line(&self, owner_id: &str, line: CartLine) -> Result<bool, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let added = carts::upsert_line(owner_id, &line, &mut tx).await?;
        tx.commit().await?;
        Ok(added)
    }

    async fn remove_cart_line(&self, owner_id: &str, item_id: i64) -> Result<bool, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let removed = carts::remove_line(owner_id, item_id, &mut tx).await?;
        tx.commit().await?;
        Ok(removed)
    }

    async fn replace_cart(&self, owner_id: &str, lines: &[CartLine]) -> Result<(), LedgerError> {
        let mut tx = self.pool.begin().await?;
        carts::delete_lines(owner_id, &mut tx).await?;
        for line in lines {
            carts::upsert_line(owner_id, line, &mut tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn clear_cart(&self, owner_id: &str) -> Result<(), LedgerError> {
        let mut tx = self.pool.begin().await?;
        let n = carts::delete_lines(owner_id, &mut tx).await?;
        carts::clear_applied_discount(owner_id, &mut tx).await?;
        tx.commit().await?;
        trace!("🗃️ Cleared {n} cart lines and the applied discount for {owner_id}");
        Ok(())
    }

    async fn applied_discount(&self, owner_id: &str) -> Result<Option<String>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let code = carts::applied_discount(owner_id, &mut conn).await?;
        Ok(code)
    }

    async fn set_applied_discount(&self, owner_id: &str, code: &str) -> Result<(), LedgerError> {
        let mut tx = self.pool.begin().await?;
        carts::set_applied_discount(owner_id, code, &mut tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn clear_applied_discount(&self, owner_id: &str) -> Result<(), LedgerError> {
        let mut tx = self.pool.begin().await?;
        carts::clear_applied_discount(owner_id, &mut tx).await?;
        tx.commit().await?;
        Ok(())
    }
}

impl EntitlementGranter for SqliteDatabase {
    async fn grant_access(&self, owner_id: &str, item_id: i64, order_id: Option<i64>) -> Result<GrantOutcome, EntitlementError> {
        let mut tx = self.pool.begin().await?;
        let outcome = entitlements::grant(owner_id, item_id, order_id, &mut tx).await.map_err(|e| {
            EntitlementError::GrantFailed { owner_id: owner_id.to_string(), item_id, reason: e.to_string() }
        })?;
        tx.commit().await?;
        trace!("🗃️ Access to item #{item_id} for {owner_id}: {outcome:?}");
        Ok(outcome)
    }

    async fn has_access(&self, owner_id: &str, item_id: i64) -> Result<bool, EntitlementError> {
        let mut conn = self.pool.acquire().await?;
        let result = entitlements::has_access(owner_id, item_id, &mut conn).await?;
        Ok(result)
    }

    async fn entitlements_for_owner(&self, owner_id: &str) -> Result<Vec<Entitlement>, EntitlementError> {
        let mut conn = self.pool.acquire().await?;
        let rows = entitlements::for_owner(owner_id, &mut conn).await?;
        Ok(rows)
    }
}
