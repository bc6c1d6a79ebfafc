use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{normalize_code, Discount, DiscountRedemption, NewDiscount, Order},
    traits::LedgerError,
};

pub async fn fetch_discount(code: &str, conn: &mut SqliteConnection) -> Result<Option<Discount>, sqlx::Error> {
    let discount = sqlx::query_as("SELECT * FROM discounts WHERE code = $1")
        .bind(normalize_code(code))
        .fetch_optional(conn)
        .await?;
    Ok(discount)
}

pub async fn insert_discount(discount: NewDiscount, conn: &mut SqliteConnection) -> Result<Discount, LedgerError> {
    let code = normalize_code(&discount.code);
    if fetch_discount(&code, conn).await?.is_some() {
        return Err(LedgerError::DiscountAlreadyExists(code));
    }
    let saved = sqlx::query_as(
        r#"
        INSERT INTO discounts (
            code, kind, value, active, starts_at, ends_at, max_uses, max_uses_per_user, first_purchase_only, min_subtotal
        ) VALUES ($1, $2, $3, $4, COALESCE($5, CURRENT_TIMESTAMP), $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(code)
    .bind(discount.kind)
    .bind(discount.value)
    .bind(discount.active)
    .bind(discount.starts_at)
    .bind(discount.ends_at)
    .bind(discount.max_uses)
    .bind(discount.max_uses_per_user)
    .bind(discount.first_purchase_only)
    .bind(discount.min_subtotal)
    .fetch_one(conn)
    .await?;
    Ok(saved)
}

/// Records the redemption of the order's discount code, if it has one. Replays are ignored thanks to the unique
/// `(discount_code, order_id)` key. Returns `true` if a new row was written.
pub async fn record_redemption(order: &Order, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let Some(code) = order.discount_code.as_deref() else {
        return Ok(false);
    };
    let result = sqlx::query(
        r#"INSERT OR IGNORE INTO discount_redemptions (discount_code, order_id, owner_id, amount)
        VALUES ($1, $2, $3, $4)"#,
    )
    .bind(normalize_code(code))
    .bind(order.id)
    .bind(&order.owner_id)
    .bind(order.discount_amount)
    .execute(conn)
    .await?;
    let inserted = result.rows_affected() == 1;
    if inserted {
        debug!("🗃️ Discount {code} redeemed by {} on order {}", order.owner_id, order.order_number());
    }
    Ok(inserted)
}

pub async fn redemption_count(code: &str, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM discount_redemptions WHERE discount_code = $1")
        .bind(normalize_code(code))
        .fetch_one(conn)
        .await?;
    Ok(count)
}

/// Redemptions of `code` plus the pending orders that carry it. A pending order holds its use of the code until it
/// completes or fails.
pub async fn reservation_count(code: &str, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    let count: i64 = sqlx::query_scalar(
        r#"SELECT
            (SELECT COUNT(*) FROM discount_redemptions WHERE discount_code = $1) +
            (SELECT COUNT(*) FROM orders WHERE discount_code = $1 AND status = 'Pending')"#,
    )
    .bind(normalize_code(code))
    .fetch_one(conn)
    .await?;
    Ok(count)
}

pub async fn reservation_count_for_owner(
    code: &str,
    owner_id: &str,
    conn: &mut SqliteConnection,
) -> Result<i64, sqlx::Error> {
    let count: i64 = sqlx::query_scalar(
        r#"SELECT
            (SELECT COUNT(*) FROM discount_redemptions WHERE discount_code = $1 AND owner_id = $2) +
            (SELECT COUNT(*) FROM orders WHERE discount_code = $1 AND owner_id = $2 AND status = 'Pending')"#,
    )
    .bind(normalize_code(code))
    .bind(owner_id)
    .fetch_one(conn)
    .await?;
    Ok(count)
}

/// Checks that a freshly inserted order does not push its discount code past either usage cap. Call it in the same
/// transaction as the insert, after it, so that the write lock is already held while counting.
pub async fn ensure_within_limits(order: &Order, conn: &mut SqliteConnection) -> Result<(), LedgerError> {
    let Some(code) = order.discount_code.as_deref() else {
        return Ok(());
    };
    let Some(discount) = fetch_discount(code, conn).await? else {
        return Ok(());
    };
    if let Some(max_uses) = discount.max_uses {
        if reservation_count(code, conn).await? > max_uses {
            debug!("🗃️ Discount {code} is fully reserved. Order {} is refused.", order.merchant_order_id);
            return Err(LedgerError::DiscountUsageExhausted { code: discount.code, per_owner: false });
        }
    }
    if discount.max_uses_per_user > 0 &&
        reservation_count_for_owner(code, &order.owner_id, conn).await? > discount.max_uses_per_user
    {
        debug!("🗃️ {} has no uses of {code} left. Order {} is refused.", order.owner_id, order.merchant_order_id);
        return Err(LedgerError::DiscountUsageExhausted { code: discount.code, per_owner: true });
    }
    Ok(())
}

pub async fn redemption_count_for_owner(
    code: &str,
    owner_id: &str,
    conn: &mut SqliteConnection,
) -> Result<i64, sqlx::Error> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM discount_redemptions WHERE discount_code = $1 AND owner_id = $2")
            .bind(normalize_code(code))
            .bind(owner_id)
            .fetch_one(conn)
            .await?;
    Ok(count)
}

pub async fn redemptions_for_order(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<DiscountRedemption>, sqlx::Error> {
    let rows = sqlx::query_as("SELECT * FROM discount_redemptions WHERE order_id = $1")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(rows)
}

pub async fn completed_order_count(owner_id: &str, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE owner_id = $1 AND status = 'Completed'")
        .bind(owner_id)
        .fetch_one(conn)
        .await?;
    Ok(count)
}
