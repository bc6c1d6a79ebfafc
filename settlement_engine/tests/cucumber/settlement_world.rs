use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use cucumber::World;
use log::*;
use settlement_engine::{
    db_types::Order,
    events::{EventHandlers, EventHooks},
    test_utils::{
        prepare_env::{prepare_test_env, random_db_path},
        StubGateway,
    },
    SettlementApi,
    SettlementError,
    SettlementOptions,
    SettlementOutcome,
    SqliteDatabase,
};

#[derive(Default, Debug, World)]
pub struct SettlementWorld {
    pub system: Option<SettlementSystem>,
    pub courses: HashMap<String, i64>,
    pub last_order: Option<Order>,
    pub last_outcome: Option<SettlementOutcome>,
    pub last_error: Option<SettlementError>,
}

#[derive(Debug)]
pub struct SettlementSystem {
    pub db_path: String,
    pub api: SettlementApi<SqliteDatabase, StubGateway>,
    pub gateway: StubGateway,
    pub receipts: Arc<AtomicUsize>,
}

impl SettlementWorld {
    pub fn system(&self) -> &SettlementSystem {
        self.system.as_ref().expect("Settlement system not initialised")
    }

    pub fn api(&self) -> &SettlementApi<SqliteDatabase, StubGateway> {
        &self.system().api
    }

    pub fn course(&self, title: &str) -> i64 {
        *self.courses.get(title).unwrap_or_else(|| panic!("No course called {title}"))
    }

    pub fn last_order(&self) -> &Order {
        self.last_order.as_ref().expect("No order has been placed yet")
    }

    pub fn receipts_sent(&self) -> usize {
        self.system().receipts.load(Ordering::SeqCst)
    }
}

impl SettlementSystem {
    pub async fn new() -> Self {
        let url = random_db_path();
        prepare_test_env(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 2).await.expect("Error creating connection to database");
        debug!("🗃️ Created database: {url}");
        let receipts = Arc::new(AtomicUsize::new(0));
        let mut hooks = EventHooks::default();
        let counter = Arc::clone(&receipts);
        hooks.on_receipt(move |_| {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        });
        let handlers = EventHandlers::new(16, hooks);
        let producers = handlers.producers();
        handlers.start_handlers().await;
        let gateway = StubGateway::new();
        let options = SettlementOptions { redirect_grace: Duration::from_millis(10), ..Default::default() };
        let api = SettlementApi::new(db, gateway.clone(), producers, options);
        Self { db_path: url, api, gateway, receipts }
    }
}
