use cucumber::given;
use settlement_engine::{
    db_types::{Money, NewCatalogItem, NewDiscount},
    traits::{CatalogManagement, DiscountManagement},
};

use crate::cucumber::{settlement_world::SettlementSystem, SettlementWorld};

#[given("a fresh install")]
async fn fresh_database(world: &mut SettlementWorld) {
    let system = SettlementSystem::new().await;
    world.system = Some(system);
}

#[given(expr = "a course {string} priced at {int}")]
async fn a_course(world: &mut SettlementWorld, title: String, price: i64) {
    let item = world
        .api()
        .db()
        .insert_catalog_item(NewCatalogItem::new(&title, Money::from(price)))
        .await
        .expect("Error adding course");
    world.courses.insert(title, item.id);
}

#[given(expr = "a fixed discount {string} worth {int}")]
async fn a_fixed_discount(world: &mut SettlementWorld, code: String, amount: i64) {
    world.api().db().insert_discount(NewDiscount::fixed(&code, Money::from(amount))).await.expect("Error adding discount");
}

#[given(expr = "a {int}% discount {string}")]
async fn a_percent_discount(world: &mut SettlementWorld, pct: i64, code: String) {
    world.api().db().insert_discount(NewDiscount::percent(&code, pct)).await.expect("Error adding discount");
}
