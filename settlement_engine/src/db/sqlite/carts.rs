use sqlx::SqliteConnection;

use crate::db_types::{normalize_code, CartLine};

pub async fn fetch_cart(owner_id: &str, conn: &mut SqliteConnection) -> Result<Vec<CartLine>, sqlx::Error> {
    let lines = sqlx::query_as(
        "SELECT item_id, price, final_price, added_at FROM cart_lines WHERE owner_id = $1 ORDER BY added_at, item_id",
    )
    .bind(owner_id)
    .fetch_all(conn)
    .await?;
    Ok(lines)
}

/// Upserts a cart line. Returns `true` if the item was not in the cart before.
pub async fn upsert_line(owner_id: &str, line: &CartLine, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let existed: Option<i64> = sqlx::query_scalar("SELECT item_id FROM cart_lines WHERE owner_id = $1 AND item_id = $2")
        .bind(owner_id)
        .bind(line.item_id)
        .fetch_optional(&mut *conn)
        .await?;
    sqlx::query(
        r#"INSERT INTO cart_lines (owner_id, item_id, price, final_price, added_at) VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (owner_id, item_id) DO UPDATE SET price = excluded.price, final_price = excluded.final_price"#,
    )
    .bind(owner_id)
    .bind(line.item_id)
    .bind(line.price)
    .bind(line.final_price)
    .bind(line.added_at)
    .execute(conn)
    .await?;
    Ok(existed.is_none())
}

pub async fn remove_line(owner_id: &str, item_id: i64, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM cart_lines WHERE owner_id = $1 AND item_id = $2")
        .bind(owner_id)
        .bind(item_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_lines(owner_id: &str, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM cart_lines WHERE owner_id = $1").bind(owner_id).execute(conn).await?;
    Ok(result.rows_affected())
}

pub async fn applied_discount(owner_id: &str, conn: &mut SqliteConnection) -> Result<Option<String>, sqlx::Error> {
    let code = sqlx::query_scalar("SELECT code FROM applied_discounts WHERE owner_id = $1")
        .bind(owner_id)
        .fetch_optional(conn)
        .await?;
    Ok(code)
}

pub async fn set_applied_discount(owner_id: &str, code: &str, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO applied_discounts (owner_id, code) VALUES ($1, $2)
        ON CONFLICT (owner_id) DO UPDATE SET code = excluded.code, applied_at = CURRENT_TIMESTAMP"#,
    )
    .bind(owner_id)
    .bind(normalize_code(code))
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn clear_applied_discount(owner_id: &str, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM applied_discounts WHERE owner_id = $1").bind(owner_id).execute(conn).await?;
    Ok(())
}
