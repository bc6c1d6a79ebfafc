use sqlx::SqliteConnection;

use crate::db_types::{MerchantOrderId, NewSignal, SettlementSignal};

pub async fn insert_signal(signal: NewSignal, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    let id: i64 = sqlx::query_scalar(
        r#"INSERT INTO settlement_signals
            (merchant_order_id, channel, outcome, evidence, reason, verified, needs_review, raw_payload)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING id"#,
    )
    .bind(signal.merchant_order_id)
    .bind(signal.channel)
    .bind(signal.outcome)
    .bind(signal.evidence)
    .bind(signal.reason)
    .bind(signal.verified)
    .bind(signal.needs_review)
    .bind(signal.raw_payload)
    .fetch_one(conn)
    .await?;
    Ok(id)
}

pub async fn signals_for_order(
    merchant_order_id: &MerchantOrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<SettlementSignal>, sqlx::Error> {
    let rows = sqlx::query_as("SELECT * FROM settlement_signals WHERE merchant_order_id = $1 ORDER BY id")
        .bind(merchant_order_id.as_str())
        .fetch_all(conn)
        .await?;
    Ok(rows)
}
