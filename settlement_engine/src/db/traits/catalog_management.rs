use crate::{
    db_types::{CatalogItem, CatalogStatus, NewCatalogItem},
    traits::LedgerError,
};

/// The read model of the course catalog that cart revaluation depends on.
#[allow(async_fn_in_trait)]
pub trait CatalogManagement {
    async fn fetch_catalog_item(&self, item_id: i64) -> Result<Option<CatalogItem>, LedgerError>;

    async fn fetch_catalog_items(&self, item_ids: &[i64]) -> Result<Vec<CatalogItem>, LedgerError>;

    async fn insert_catalog_item(&self, item: NewCatalogItem) -> Result<CatalogItem, LedgerError>;

    async fn update_catalog_status(&self, item_id: i64, status: CatalogStatus) -> Result<CatalogItem, LedgerError>;
}
