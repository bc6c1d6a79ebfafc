use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{CatalogItem, CatalogStatus, NewCatalogItem},
    traits::LedgerError,
};

pub async fn fetch_item(item_id: i64, conn: &mut SqliteConnection) -> Result<Option<CatalogItem>, sqlx::Error> {
    let item = sqlx::query_as("SELECT * FROM catalog_items WHERE id = $1").bind(item_id).fetch_optional(conn).await?;
    Ok(item)
}

pub async fn fetch_items(item_ids: &[i64], conn: &mut SqliteConnection) -> Result<Vec<CatalogItem>, sqlx::Error> {
    if item_ids.is_empty() {
        return Ok(vec![]);
    }
    let mut builder = QueryBuilder::new("SELECT * FROM catalog_items WHERE id IN (");
    let mut ids = builder.separated(", ");
    for id in item_ids {
        ids.push_bind(*id);
    }
    ids.push_unseparated(")");
    let items = builder.build_query_as::<CatalogItem>().fetch_all(conn).await?;
    Ok(items)
}

pub async fn insert_item(item: NewCatalogItem, conn: &mut SqliteConnection) -> Result<CatalogItem, sqlx::Error> {
    let item = sqlx::query_as(
        r#"INSERT INTO catalog_items (title, price, percent_discount, commission_rate, status)
        VALUES ($1, $2, $3, $4, $5) RETURNING *"#,
    )
    .bind(item.title)
    .bind(item.price)
    .bind(item.percent_discount)
    .bind(item.commission_rate)
    .bind(item.status)
    .fetch_one(conn)
    .await?;
    Ok(item)
}

pub async fn update_status(
    item_id: i64,
    status: CatalogStatus,
    conn: &mut SqliteConnection,
) -> Result<CatalogItem, LedgerError> {
    let item: Option<CatalogItem> =
        sqlx::query_as("UPDATE catalog_items SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 RETURNING *")
            .bind(status)
            .bind(item_id)
            .fetch_optional(conn)
            .await?;
    item.ok_or(LedgerError::CatalogItemNotFound(item_id))
}
