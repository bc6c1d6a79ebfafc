use std::{str::FromStr, time::Duration};

use cucumber::{then, when};
use settlement_engine::{
    db_types::{Money, OrderStatusType},
    settlement_objects::{CheckoutRequest, CheckoutResult},
    test_utils::{failed_transaction, successful_transaction, webhook},
    traits::{EntitlementGranter, OrderLedger},
    SettlementOutcome,
};

use crate::{cucumber::SettlementWorld, support::billing};

#[when(expr = "'{word}' adds {string} to the cart")]
async fn add_to_cart(world: &mut SettlementWorld, owner: String, title: String) {
    let item_id = world.course(&title);
    world.api().cart_api().add_item(&owner, item_id).await.expect("Error adding item to cart");
}

#[when(expr = "'{word}' applies the discount code {string}")]
async fn apply_code(world: &mut SettlementWorld, owner: String, code: String) {
    world.api().discount_api().apply_to_session(&code, &owner).await.expect("Discount code was rejected");
}

#[when(expr = "'{word}' checks out")]
async fn check_out(world: &mut SettlementWorld, owner: String) {
    match world.api().checkout(&owner, CheckoutRequest { billing: billing() }).await {
        Ok(CheckoutResult::PaymentRequired { order, .. }) | Ok(CheckoutResult::Completed { order, .. }) => {
            world.last_order = Some(order);
            world.last_error = None;
        },
        Err(e) => world.last_error = Some(e),
    }
}

#[when(expr = "the gateway reports a successful payment of {int} for the last order")]
async fn successful_payment(world: &mut SettlementWorld, amount: i64) {
    let mid = world.last_order().merchant_order_id.clone();
    let payload = webhook(successful_transaction(&mid, Money::from(amount)));
    let outcome = world.api().process_webhook(&payload, None).await.expect("Webhook processing failed");
    world.last_outcome = Some(outcome);
}

#[when(expr = "the gateway reports a failed payment for the last order with message {string}")]
async fn failed_payment(world: &mut SettlementWorld, message: String) {
    let order = world.last_order().clone();
    let payload = webhook(failed_transaction(&order.merchant_order_id, order.total, &message));
    let outcome = world.api().process_webhook(&payload, None).await.expect("Webhook processing failed");
    world.last_outcome = Some(outcome);
}

#[when(expr = "I pause for {int}ms")]
async fn pause(_world: &mut SettlementWorld, ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[then(expr = "the last order is {word} with a total of {int}")]
async fn order_status_and_total(world: &mut SettlementWorld, status: String, total: i64) {
    let status = OrderStatusType::from_str(&status).expect("Not a valid order status");
    let mid = world.last_order().merchant_order_id.clone();
    let order = world.api().db().fetch_order(&mid).await.expect("Error fetching order").expect("Order does not exist");
    assert_eq!(order.status, status, "Order status is incorrect");
    assert_eq!(order.total, Money::from(total), "Order total is incorrect");
}

#[then(expr = "the last order failed with reason {string}")]
async fn order_failure_reason(world: &mut SettlementWorld, reason: String) {
    let mid = world.last_order().merchant_order_id.clone();
    let order = world.api().db().fetch_order(&mid).await.expect("Error fetching order").expect("Order does not exist");
    assert_eq!(order.status, OrderStatusType::Failed);
    assert_eq!(order.failure_reason.as_deref(), Some(reason.as_str()));
}

#[then("the last settlement was already processed")]
async fn already_processed(world: &mut SettlementWorld) {
    assert!(matches!(world.last_outcome, Some(SettlementOutcome::AlreadyProcessed(_))), "{:?}", world.last_outcome);
}

#[then("the last settlement corrected an earlier failure")]
async fn corrected(world: &mut SettlementWorld) {
    assert!(matches!(world.last_outcome, Some(SettlementOutcome::Corrected(_))), "{:?}", world.last_outcome);
}

#[then(expr = "'{word}' has access to {string}")]
async fn has_access(world: &mut SettlementWorld, owner: String, title: String) {
    let item_id = world.course(&title);
    assert!(world.api().db().has_access(&owner, item_id).await.expect("Error checking access"));
}

#[then(expr = "'{word}' holds {int} entitlement(s)")]
async fn entitlement_count(world: &mut SettlementWorld, owner: String, count: usize) {
    let entitlements = world.api().db().entitlements_for_owner(&owner).await.expect("Error fetching entitlements");
    assert_eq!(entitlements.len(), count);
}

#[then(expr = "{int} receipt(s) has/have been sent")]
async fn receipts_sent(world: &mut SettlementWorld, count: usize) {
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(world.receipts_sent(), count);
}

#[then("no payment session was requested")]
async fn no_payment_session(world: &mut SettlementWorld) {
    assert!(world.system().gateway.sessions().is_empty());
}
