use sqlx::SqliteConnection;

use crate::db_types::{Entitlement, GrantOutcome};

/// Idempotent grant. The unique `(owner_id, item_id)` key turns a repeat into a no-op.
pub async fn grant(
    owner_id: &str,
    item_id: i64,
    order_id: Option<i64>,
    conn: &mut SqliteConnection,
) -> Result<GrantOutcome, sqlx::Error> {
    let result = sqlx::query("INSERT OR IGNORE INTO entitlements (owner_id, item_id, order_id) VALUES ($1, $2, $3)")
        .bind(owner_id)
        .bind(item_id)
        .bind(order_id)
        .execute(conn)
        .await?;
    if result.rows_affected() == 1 {
        Ok(GrantOutcome::Granted)
    } else {
        Ok(GrantOutcome::AlreadyGranted)
    }
}

pub async fn has_access(owner_id: &str, item_id: i64, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM entitlements WHERE owner_id = $1 AND item_id = $2")
        .bind(owner_id)
        .bind(item_id)
        .fetch_optional(conn)
        .await?;
    Ok(found.is_some())
}

pub async fn for_owner(owner_id: &str, conn: &mut SqliteConnection) -> Result<Vec<Entitlement>, sqlx::Error> {
    let rows = sqlx::query_as("SELECT * FROM entitlements WHERE owner_id = $1 ORDER BY granted_at, id")
        .bind(owner_id)
        .fetch_all(conn)
        .await?;
    Ok(rows)
}
