#![allow(dead_code)]
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use log::*;
use settlement_engine::{
    db_types::{CatalogItem, Money, NewCatalogItem, Order},
    events::{EventHandlers, EventHooks},
    gateway::BillingDetails,
    settlement_objects::{CheckoutRequest, CheckoutResult},
    test_utils::{
        prepare_env::{drop_database, prepare_test_env, random_db_path},
        StubGateway,
    },
    traits::{CatalogManagement, OrderLedger},
    SettlementApi,
    SettlementOptions,
    SqliteDatabase,
};

#[derive(Default, Clone)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct Harness {
    pub api: SettlementApi<SqliteDatabase, StubGateway>,
    pub gateway: StubGateway,
    pub receipts: Counter,
    pub completions: Counter,
    pub failures: Counter,
}

impl Harness {
    pub fn db(&self) -> &SqliteDatabase {
        self.api.db()
    }

    /// Event hooks run on their own tasks. Gives them a moment to catch up.
    pub async fn settle_events(&self) {
        tokio::time::sleep(Duration::from_millis(150)).await;
    }
}

pub async fn setup() -> Harness {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    let receipts = Counter::default();
    let completions = Counter::default();
    let failures = Counter::default();
    let mut hooks = EventHooks::default();
    let r = receipts.clone();
    hooks.on_receipt(move |ev| {
        trace!("📬️ Receipt for {}", ev.order_number);
        let r = r.clone();
        Box::pin(async move { r.hit() })
    });
    let c = completions.clone();
    hooks.on_order_completed(move |_| {
        let c = c.clone();
        Box::pin(async move { c.hit() })
    });
    let f = failures.clone();
    hooks.on_order_failed(move |_| {
        let f = f.clone();
        Box::pin(async move { f.hit() })
    });
    let handlers = EventHandlers::new(32, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;
    let gateway = StubGateway::new();
    let options = SettlementOptions { redirect_grace: Duration::from_millis(20), ..Default::default() };
    let api = SettlementApi::new(db, gateway.clone(), producers, options);
    Harness { api, gateway, receipts, completions, failures }
}

pub async fn tear_down(mut harness: Harness) {
    let url = harness.api.db().url().to_string();
    if let Err(e) = harness.api.db_mut().close().await {
        error!("🗃️ Failed to close database: {e}");
    }
    drop_database(&url).await;
}

pub fn billing() -> BillingDetails {
    BillingDetails {
        first_name: "Alice".into(),
        last_name: "Liddell".into(),
        email: "alice@example.com".into(),
        phone_number: "+201000000000".into(),
        city: Some("Cairo".into()),
        country: Some("EG".into()),
    }
}

pub async fn add_course(db: &SqliteDatabase, title: &str, price: i64) -> CatalogItem {
    db.insert_catalog_item(NewCatalogItem::new(title, Money::from(price))).await.expect("Error adding course")
}

/// Fills the owner's cart with `items` and checks out. Returns the resulting order.
pub async fn checkout(harness: &Harness, owner: &str, items: &[i64]) -> Order {
    let cart = harness.api.cart_api();
    for &item in items {
        cart.add_item(owner, item).await.expect("Error adding item to cart");
    }
    let result = harness.api.checkout(owner, CheckoutRequest { billing: billing() }).await.expect("Checkout failed");
    match result {
        CheckoutResult::PaymentRequired { order, .. } | CheckoutResult::Completed { order, .. } => order,
    }
}
