use actix_web::{http::StatusCode, web::ServiceConfig};
use lms_common::Money;
use mockall::predicate::function;
use serde_json::json;
use settlement_engine::{
    db_types::{MerchantOrderId, NewDiscount, OrderStatusType},
    gateway::GatewayError,
    traits::{DiscountManagement, EntitlementGranter, OrderLedger},
    SqliteDatabase,
};

use super::{
    helpers::{billing_json, json, post_request, setup, Caller},
    mocks::{session_for, silent_gateway, MockGateway},
};
use crate::routes::{AddCartItemRoute, ApplyDiscountRoute, CheckoutRoute};

fn configure(cfg: &mut ServiceConfig) {
    cfg.service(AddCartItemRoute::<SqliteDatabase, MockGateway>::new())
        .service(ApplyDiscountRoute::<SqliteDatabase, MockGateway>::new())
        .service(CheckoutRoute::<SqliteDatabase, MockGateway>::new());
}

fn merchant_order_id(order: &serde_json::Value) -> MerchantOrderId {
    MerchantOrderId(order["merchant_order_id"].as_str().expect("merchant_order_id missing").to_string())
}

#[actix_web::test]
async fn checkout_opens_a_payment_session() {
    let mut gateway = MockGateway::new();
    gateway
        .expect_create_session()
        .with(function(|r: &settlement_engine::gateway::SessionRequest| r.amount == Money::from(500) && r.items.len() == 1))
        .times(1)
        .returning(|r| Ok(session_for(&r)));
    gateway.expect_inquire().never();
    let ctx = setup(gateway).await;
    let course = ctx.add_course("Rust 101", 500).await;
    post_request(&ctx, Caller::User("alice"), "/cart/items", &json!({"item_id": course.id}), configure).await;

    let (status, body) = post_request(&ctx, Caller::User("alice"), "/checkout", &billing_json(), configure).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let result = json(&body);
    assert_eq!(result["status"], "payment_required");
    assert_eq!(result["order"]["status"], "Pending");
    assert_eq!(result["order"]["total"], 500);
    let mid = merchant_order_id(&result["order"]);
    assert_eq!(result["payment_url"], format!("https://pay.example.test/iframe?order={mid}"));
    let order = ctx.db().fetch_order(&mid).await.unwrap().unwrap();
    assert_eq!(order.gateway_order_id, Some(format!("gw-{mid}")));
    ctx.tear_down().await;
}

#[actix_web::test]
async fn free_orders_complete_without_the_gateway() {
    let ctx = setup(silent_gateway()).await;
    let course = ctx.add_course("Intro", 200).await;
    ctx.db().insert_discount(NewDiscount::fixed("FREE200", Money::from(200))).await.unwrap();
    post_request(&ctx, Caller::User("bob"), "/cart/items", &json!({"item_id": course.id}), configure).await;
    post_request(&ctx, Caller::User("bob"), "/cart/discount", &json!({"code": "FREE200"}), configure).await;

    let (status, body) = post_request(&ctx, Caller::User("bob"), "/checkout", &billing_json(), configure).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let result = json(&body);
    assert_eq!(result["status"], "completed");
    assert_eq!(result["order"]["status"], "Completed");
    assert_eq!(result["order"]["total"], 0);
    assert!(ctx.db().has_access("bob", course.id).await.unwrap());
    ctx.tear_down().await;
}

#[actix_web::test]
async fn unavailable_gateway_fails_the_order() {
    let mut gateway = MockGateway::new();
    gateway.expect_create_session().times(1).returning(|_| Err(GatewayError::Unavailable("connection refused".into())));
    let ctx = setup(gateway).await;
    let course = ctx.add_course("Rust 101", 500).await;
    post_request(&ctx, Caller::User("carol"), "/cart/items", &json!({"item_id": course.id}), configure).await;

    let (status, body) = post_request(&ctx, Caller::User("carol"), "/checkout", &billing_json(), configure).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY, "{body}");
    let orders = ctx.api.orders_for_owner("carol").await.unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].status, OrderStatusType::Failed);
    assert_eq!(orders[0].failure_reason.as_deref(), Some("payment session unavailable"));
    ctx.tear_down().await;
}

#[actix_web::test]
async fn gateway_timeouts_leave_the_order_pending() {
    let mut gateway = MockGateway::new();
    gateway.expect_create_session().times(1).returning(|_| Err(GatewayError::Timeout("30s".into())));
    let ctx = setup(gateway).await;
    let course = ctx.add_course("Rust 101", 500).await;
    post_request(&ctx, Caller::User("dave"), "/cart/items", &json!({"item_id": course.id}), configure).await;

    let (status, _) = post_request(&ctx, Caller::User("dave"), "/checkout", &billing_json(), configure).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let orders = ctx.api.orders_for_owner("dave").await.unwrap();
    assert_eq!(orders[0].status, OrderStatusType::Pending);
    ctx.tear_down().await;
}

#[actix_web::test]
async fn checkout_refusals() {
    let ctx = setup(silent_gateway()).await;
    let (status, body) = post_request(&ctx, Caller::User("erin"), "/checkout", &billing_json(), configure).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("empty"), "{body}");

    let course = ctx.add_course("Rust 101", 500).await;
    post_request(&ctx, Caller::User("erin"), "/cart/items", &json!({"item_id": course.id}), configure).await;
    let mut billing = billing_json();
    billing["billing"]["email"] = json!("not-an-email");
    let (status, _) = post_request(&ctx, Caller::User("erin"), "/checkout", &billing, configure).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(ctx.api.orders_for_owner("erin").await.unwrap().is_empty());
    ctx.tear_down().await;
}

#[actix_web::test]
async fn a_second_checkout_reuses_or_refuses() {
    let mut gateway = MockGateway::new();
    gateway.expect_create_session().times(1).returning(|r| Ok(session_for(&r)));
    gateway.expect_inquire().never();
    let ctx = setup(gateway).await;
    let first = ctx.add_course("Rust 101", 500).await;
    let second = ctx.add_course("Rust 201", 300).await;
    post_request(&ctx, Caller::User("dora"), "/cart/items", &json!({"item_id": first.id}), configure).await;
    let (_, body) = post_request(&ctx, Caller::User("dora"), "/checkout", &billing_json(), configure).await;
    let mid = merchant_order_id(&json(&body)["order"]);

    let (status, body) = post_request(&ctx, Caller::User("dora"), "/checkout", &billing_json(), configure).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(merchant_order_id(&json(&body)["order"]), mid);

    post_request(&ctx, Caller::User("dora"), "/cart/items", &json!({"item_id": second.id}), configure).await;
    let (status, body) = post_request(&ctx, Caller::User("dora"), "/checkout", &billing_json(), configure).await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
    assert!(body.contains(mid.as_str()), "{body}");
    ctx.tear_down().await;
}
