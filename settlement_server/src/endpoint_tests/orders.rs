use actix_web::{http::StatusCode, test::TestRequest, web::ServiceConfig};
use lms_common::Money;
use serde_json::json;
use settlement_engine::{
    db_types::{MerchantOrderId, NewOrder, NewOrderItem, Order},
    test_utils::successful_transaction,
    traits::OrderLedger,
    SqliteDatabase,
};

use super::{
    helpers::{get_request, json, send, setup, Caller, TestContext},
    mocks::{silent_gateway, MockGateway},
};
use crate::routes::{InquireOrderRoute, MyOrderRoute, MyOrdersRoute, OrderSignalsRoute, OrdersSearchRoute, ReconcileRoute};

fn configure(cfg: &mut ServiceConfig) {
    cfg.service(MyOrdersRoute::<SqliteDatabase, MockGateway>::new())
        .service(OrdersSearchRoute::<SqliteDatabase, MockGateway>::new())
        .service(OrderSignalsRoute::<SqliteDatabase, MockGateway>::new())
        .service(InquireOrderRoute::<SqliteDatabase, MockGateway>::new())
        .service(ReconcileRoute::<SqliteDatabase, MockGateway>::new())
        .service(MyOrderRoute::<SqliteDatabase, MockGateway>::new());
}

async fn place_order(ctx: &TestContext, owner: &str, price: i64) -> Order {
    let course = ctx.add_course(&format!("{owner}'s course"), price).await;
    let item = NewOrderItem::new(course.id, course.title.clone(), course.price, course.price, 0.0);
    ctx.db().insert_order(NewOrder::new(owner, vec![item], "EGP")).await.expect("Error inserting order")
}

#[actix_web::test]
async fn fetch_my_orders() {
    let ctx = setup(silent_gateway()).await;
    let mine = place_order(&ctx, "alice", 500).await;
    place_order(&ctx, "bob", 300).await;

    let (status, body) = get_request(&ctx, Caller::User("alice"), "/orders", configure).await;
    assert_eq!(status, StatusCode::OK);
    let orders = json(&body);
    assert_eq!(orders.as_array().map(Vec::len), Some(1));
    assert_eq!(orders[0]["merchant_order_id"], mine.merchant_order_id.as_str());

    let path = format!("/orders/{}", mine.merchant_order_id);
    let (status, body) = get_request(&ctx, Caller::User("alice"), &path, configure).await;
    assert_eq!(status, StatusCode::OK);
    let order = json(&body);
    assert_eq!(order["order_number"], mine.order_number());
    assert_eq!(order["items"].as_array().map(Vec::len), Some(1));
    ctx.tear_down().await;
}

#[actix_web::test]
async fn other_peoples_orders_are_not_found() {
    let ctx = setup(silent_gateway()).await;
    let theirs = place_order(&ctx, "bob", 300).await;
    let path = format!("/orders/{}", theirs.merchant_order_id);
    let (status, _) = get_request(&ctx, Caller::User("alice"), &path, configure).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = get_request(&ctx, Caller::Anonymous, "/orders", configure).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    ctx.tear_down().await;
}

#[actix_web::test]
async fn order_search_is_for_admins() {
    let ctx = setup(silent_gateway()).await;
    place_order(&ctx, "alice", 500).await;
    place_order(&ctx, "bob", 300).await;

    let (status, body) = get_request(&ctx, Caller::User("alice"), "/admin/orders/search", configure).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, "Insufficient permissions.");

    let (status, body) = get_request(&ctx, Caller::Admin("root"), "/admin/orders/search", configure).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body).as_array().map(Vec::len), Some(2));

    let (status, body) =
        get_request(&ctx, Caller::Admin("root"), "/admin/orders/search?owner_id=bob&status=Pending", configure).await;
    assert_eq!(status, StatusCode::OK);
    let orders = json(&body);
    assert_eq!(orders.as_array().map(Vec::len), Some(1));
    assert_eq!(orders[0]["owner_id"], "bob");

    let (status, _) =
        get_request(&ctx, Caller::Admin("root"), "/admin/orders/search?status=Refunded", configure).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    ctx.tear_down().await;
}

#[actix_web::test]
async fn admins_can_inquire_about_an_order() {
    let mut gateway = MockGateway::new();
    gateway
        .expect_inquire()
        .times(1)
        .returning(|mid: &MerchantOrderId| Ok(successful_transaction(mid, Money::from(500))));
    let ctx = setup(gateway).await;
    let order = place_order(&ctx, "alice", 500).await;
    let path = format!("/admin/orders/{}/inquire", order.merchant_order_id);

    let req = Caller::User("alice").apply(TestRequest::post().uri(&path));
    let (status, _) = send(&ctx, req, configure).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let req = Caller::Admin("root").apply(TestRequest::post().uri(&path));
    let (status, body) = send(&ctx, req, configure).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let outcome = json(&body);
    assert_eq!(outcome["result"], "completed");
    assert_eq!(outcome["order"]["status"], "Completed");

    let path = format!("/admin/orders/{}/signals", order.merchant_order_id);
    let (status, body) = get_request(&ctx, Caller::Admin("root"), &path, configure).await;
    assert_eq!(status, StatusCode::OK);
    let signals = json(&body);
    assert_eq!(signals.as_array().map(Vec::len), Some(1));
    assert_eq!(signals[0]["channel"], "Inquiry");
    ctx.tear_down().await;
}

#[actix_web::test]
async fn reconcile_with_nothing_to_do() {
    let ctx = setup(silent_gateway()).await;
    let req = Caller::Admin("root").apply(TestRequest::post().uri("/admin/reconcile"));
    let (status, body) = send(&ctx, req, configure).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body), json!({"regranted": 0, "inquired": 0, "settled": 0, "errors": 0}));
    ctx.tear_down().await;
}
