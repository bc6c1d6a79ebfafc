use chrono::Duration;
use log::{debug, trace};
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{MerchantOrderId, NewOrder, Order, OrderItem},
    order_objects::OrderQueryFilter,
    traits::{LedgerError, SettlementDetails},
};

/// Inserts a new order and its line items using the given connection. This is not atomic. Embed the call in a
/// transaction and pass `&mut *tx` as the connection argument to make it so.
pub async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, LedgerError> {
    if fetch_order_by_merchant_id(&order.merchant_order_id, conn).await?.is_some() {
        return Err(LedgerError::OrderAlreadyExists(order.merchant_order_id));
    }
    let saved: Order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                merchant_order_id,
                owner_id,
                subtotal,
                discount_code,
                discount_amount,
                total,
                currency
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *;
        "#,
    )
    .bind(order.merchant_order_id.as_str())
    .bind(&order.owner_id)
    .bind(order.subtotal)
    .bind(&order.discount_code)
    .bind(order.discount_amount)
    .bind(order.total)
    .bind(&order.currency)
    .fetch_one(&mut *conn)
    .await?;
    for item in order.items {
        sqlx::query(
            r#"
            INSERT INTO order_items (order_id, item_id, title, original_price, final_price, commission, instructor_share)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(saved.id)
        .bind(item.item_id)
        .bind(item.title)
        .bind(item.original_price)
        .bind(item.final_price)
        .bind(item.commission)
        .bind(item.instructor_share)
        .execute(&mut *conn)
        .await?;
    }
    debug!("🗃️ Order {} [{}] inserted for {}", saved.order_number(), saved.merchant_order_id, saved.owner_id);
    Ok(saved)
}

pub async fn fetch_order_by_merchant_id(
    merchant_order_id: &MerchantOrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE merchant_order_id = $1")
        .bind(merchant_order_id.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

pub async fn fetch_order_by_id(id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn fetch_order_items(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<OrderItem>, sqlx::Error> {
    let items = sqlx::query_as("SELECT * FROM order_items WHERE order_id = $1 ORDER BY id")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(items)
}

pub async fn latest_pending_order_for_owner(
    owner_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as(
        "SELECT * FROM orders WHERE owner_id = $1 AND status = 'Pending' ORDER BY created_at DESC, id DESC LIMIT 1",
    )
    .bind(owner_id)
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

pub async fn attach_gateway_session(
    merchant_order_id: &MerchantOrderId,
    gateway_order_id: &str,
    payment_url: &str,
    conn: &mut SqliteConnection,
) -> Result<Order, LedgerError> {
    let order: Option<Order> = sqlx::query_as(
        r#"UPDATE orders SET gateway_order_id = $1, payment_url = $2, updated_at = CURRENT_TIMESTAMP
        WHERE merchant_order_id = $3 RETURNING *"#,
    )
    .bind(gateway_order_id)
    .bind(payment_url)
    .bind(merchant_order_id.as_str())
    .fetch_optional(conn)
    .await?;
    order.ok_or_else(|| LedgerError::OrderNotFound(merchant_order_id.clone()))
}

/// The guarded `Pending -> Completed` update. Returns `None` if the order was not `Pending`.
pub async fn complete_if_pending(
    merchant_order_id: &MerchantOrderId,
    details: &SettlementDetails,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as(
        r#"
        UPDATE orders SET
            status = 'Completed',
            gateway_transaction_id = COALESCE($1, gateway_transaction_id),
            gateway_order_id = COALESCE($2, gateway_order_id),
            gateway_response = COALESCE($3, gateway_response),
            failure_reason = NULL,
            completed_at = CURRENT_TIMESTAMP,
            updated_at = CURRENT_TIMESTAMP
        WHERE merchant_order_id = $4 AND status = 'Pending'
        RETURNING *
        "#,
    )
    .bind(&details.transaction_id)
    .bind(&details.gateway_order_id)
    .bind(&details.gateway_response)
    .bind(merchant_order_id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// The guarded `Pending -> Failed` update. Returns `None` if the order was not `Pending`.
pub async fn fail_if_pending(
    merchant_order_id: &MerchantOrderId,
    reason: &str,
    details: &SettlementDetails,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as(
        r#"
        UPDATE orders SET
            status = 'Failed',
            failure_reason = $1,
            gateway_transaction_id = COALESCE($2, gateway_transaction_id),
            gateway_order_id = COALESCE($3, gateway_order_id),
            gateway_response = COALESCE($4, gateway_response),
            updated_at = CURRENT_TIMESTAMP
        WHERE merchant_order_id = $5 AND status = 'Pending'
        RETURNING *
        "#,
    )
    .bind(reason)
    .bind(&details.transaction_id)
    .bind(&details.gateway_order_id)
    .bind(&details.gateway_response)
    .bind(merchant_order_id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// The guarded `Failed -> Pending` correction. Returns `None` if the order was not `Failed`.
pub async fn reopen_if_failed(
    merchant_order_id: &MerchantOrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as(
        r#"UPDATE orders SET status = 'Pending', updated_at = CURRENT_TIMESTAMP
        WHERE merchant_order_id = $1 AND status = 'Failed' RETURNING *"#,
    )
    .bind(merchant_order_id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// Sets `notification_sent`, returning `true` only if this call changed it.
pub async fn claim_notification(order_id: i64, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE orders SET notification_sent = TRUE, updated_at = CURRENT_TIMESTAMP WHERE id = $1 AND \
         notification_sent = FALSE",
    )
    .bind(order_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn mark_entitlements_granted(order_id: i64, conn: &mut SqliteConnection) -> Result<(), LedgerError> {
    let result = sqlx::query(
        "UPDATE orders SET entitlements_granted_at = COALESCE(entitlements_granted_at, CURRENT_TIMESTAMP) WHERE id = $1",
    )
    .bind(order_id)
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(LedgerError::OrderIdNotFound(order_id));
    }
    Ok(())
}

/// Fetches orders according to criteria specified in the `OrderQueryFilter`
///
/// Resulting orders are ordered by `created_at` in ascending order
pub async fn search_orders(query: OrderQueryFilter, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let mut builder = QueryBuilder::new("SELECT * FROM orders ");
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(owner_id) = query.owner_id {
        where_clause.push("owner_id = ");
        where_clause.push_bind_unseparated(owner_id);
    }
    if let Some(mid) = query.merchant_order_id {
        where_clause.push("merchant_order_id = ");
        where_clause.push_bind_unseparated(mid.0);
    }
    if let Some(code) = query.discount_code {
        where_clause.push("discount_code = ");
        where_clause.push_bind_unseparated(code.to_uppercase());
    }
    if let Some(currency) = query.currency {
        where_clause.push("currency = ");
        where_clause.push_bind_unseparated(currency);
    }
    if let Some(statuses) = query.status.filter(|s| !s.is_empty()) {
        let status_clause = statuses.iter().map(|s| format!("'{s}'")).collect::<Vec<_>>().join(",");
        where_clause.push(format!("status IN ({status_clause})"));
    }
    if let Some(since) = query.since {
        where_clause.push("unixepoch(created_at) >= unixepoch(");
        where_clause.push_bind_unseparated(since);
        where_clause.push_unseparated(")");
    }
    if let Some(until) = query.until {
        where_clause.push("unixepoch(created_at) <= unixepoch(");
        where_clause.push_bind_unseparated(until);
        where_clause.push_unseparated(")");
    }
    builder.push(" ORDER BY created_at ASC, id ASC");
    trace!("🗃️ Executing query: {}", builder.sql());
    let orders = builder.build_query_as::<Order>().fetch_all(conn).await?;
    trace!("🗃️ Result of search_orders: {} orders", orders.len());
    Ok(orders)
}

pub async fn orders_missing_entitlements(conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let orders = sqlx::query_as(
        "SELECT * FROM orders WHERE status = 'Completed' AND entitlements_granted_at IS NULL ORDER BY completed_at",
    )
    .fetch_all(conn)
    .await?;
    Ok(orders)
}

pub async fn stale_pending_orders(age: Duration, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let orders = sqlx::query_as(
        r#"SELECT * FROM orders WHERE status = 'Pending' AND gateway_order_id IS NOT NULL AND
        (unixepoch(CURRENT_TIMESTAMP) - unixepoch(updated_at)) >= $1 ORDER BY created_at"#,
    )
    .bind(age.num_seconds())
    .fetch_all(conn)
    .await?;
    Ok(orders)
}

