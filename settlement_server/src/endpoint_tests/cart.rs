use actix_web::{http::StatusCode, web::ServiceConfig};
use lms_common::Money;
use serde_json::json;
use settlement_engine::{
    db_types::{CatalogStatus, NewDiscount},
    traits::{CartStore, CatalogManagement, DiscountManagement},
    SqliteDatabase,
};

use super::{
    helpers::{delete_request, get_request, json, post_request, setup, Caller},
    mocks::{silent_gateway, MockGateway},
};
use crate::routes::{AddCartItemRoute, ApplyDiscountRoute, MyCartRoute, RemoveCartItemRoute, RemoveDiscountRoute};

fn configure(cfg: &mut ServiceConfig) {
    cfg.service(MyCartRoute::<SqliteDatabase, MockGateway>::new())
        .service(AddCartItemRoute::<SqliteDatabase, MockGateway>::new())
        .service(RemoveCartItemRoute::<SqliteDatabase, MockGateway>::new())
        .service(ApplyDiscountRoute::<SqliteDatabase, MockGateway>::new())
        .service(RemoveDiscountRoute::<SqliteDatabase, MockGateway>::new());
}

#[actix_web::test]
async fn cart_requires_a_session() {
    let ctx = setup(silent_gateway()).await;
    let (status, body) = get_request(&ctx, Caller::Anonymous, "/cart", configure).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.contains("No session owner was supplied"), "{body}");
    ctx.tear_down().await;
}

#[actix_web::test]
async fn add_and_remove_items() {
    let ctx = setup(silent_gateway()).await;
    let rust = ctx.add_course("Rust 101", 500).await;
    let sql = ctx.add_course("SQL 101", 300).await;

    let (status, body) =
        post_request(&ctx, Caller::User("alice"), "/cart/items", &json!({"item_id": rust.id}), configure).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body2) =
        post_request(&ctx, Caller::User("alice"), "/cart/items", &json!({"item_id": sql.id}), configure).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["cart"]["total"], 500);
    let cart = json(&body2);
    assert_eq!(cart["cart"]["lines"].as_array().map(Vec::len), Some(2));
    assert_eq!(cart["cart"]["total"], 800);
    assert!(cart["discount"].is_null());

    let path = format!("/cart/items/{}", rust.id);
    let (status, body) = delete_request(&ctx, Caller::User("alice"), &path, configure).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["cart"]["total"], 300);
    // Someone else's cart is untouched.
    let (_, body) = get_request(&ctx, Caller::User("bob"), "/cart", configure).await;
    assert_eq!(json(&body)["cart"]["lines"], json!([]));
    ctx.tear_down().await;
}

#[actix_web::test]
async fn unknown_and_unavailable_items() {
    let ctx = setup(silent_gateway()).await;
    let draft = ctx.add_course("Draft", 500).await;
    ctx.db().update_catalog_status(draft.id, CatalogStatus::Draft).await.unwrap();
    let (status, _) =
        post_request(&ctx, Caller::User("alice"), "/cart/items", &json!({"item_id": 4242}), configure).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) =
        post_request(&ctx, Caller::User("alice"), "/cart/items", &json!({"item_id": draft.id}), configure).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = post_request(&ctx, Caller::User("alice"), "/cart/items", &json!({"id": 1}), configure).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    ctx.tear_down().await;
}

#[actix_web::test]
async fn stale_lines_are_reported_as_dropped() {
    let ctx = setup(silent_gateway()).await;
    let course = ctx.add_course("Closing soon", 500).await;
    post_request(&ctx, Caller::User("carol"), "/cart/items", &json!({"item_id": course.id}), configure).await;
    ctx.db().update_catalog_status(course.id, CatalogStatus::Closed).await.unwrap();
    let (status, body) = get_request(&ctx, Caller::User("carol"), "/cart", configure).await;
    assert_eq!(status, StatusCode::OK);
    let cart = json(&body);
    assert_eq!(cart["cart"]["dropped"], json!([{"item_id": course.id, "reason": "unavailable"}]));
    assert_eq!(cart["cart"]["total"], 0);
    assert!(ctx.db().fetch_cart("carol").await.unwrap().is_empty());
    ctx.tear_down().await;
}

#[actix_web::test]
async fn discount_codes() {
    let ctx = setup(silent_gateway()).await;
    let course = ctx.add_course("Rust 101", 500).await;
    ctx.db().insert_discount(NewDiscount::percent("TENOFF", 10)).await.unwrap();
    ctx.db().insert_discount(NewDiscount::fixed("BIG", Money::from(100)).with_min_subtotal(Money::from(1000))).await.unwrap();
    post_request(&ctx, Caller::User("dave"), "/cart/items", &json!({"item_id": course.id}), configure).await;

    let (status, body) =
        post_request(&ctx, Caller::User("dave"), "/cart/discount", &json!({"code": "NOPE"}), configure).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["rejection"], json!({"reason": "not_found"}));

    let (status, body) =
        post_request(&ctx, Caller::User("dave"), "/cart/discount", &json!({"code": "BIG"}), configure).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["rejection"], json!({"reason": "below_minimum_subtotal", "minimum": 1000}));

    let (status, body) =
        post_request(&ctx, Caller::User("dave"), "/cart/discount", &json!({"code": "tenoff"}), configure).await;
    assert_eq!(status, StatusCode::OK);
    let quote = json(&body);
    assert_eq!(quote["code"], "TENOFF");
    assert_eq!(quote["amount"], 50);
    assert_eq!(quote["total"], 450);

    let (_, body) = get_request(&ctx, Caller::User("dave"), "/cart", configure).await;
    assert_eq!(json(&body)["discount"]["total"], 450);

    let (status, _) = delete_request(&ctx, Caller::User("dave"), "/cart/discount", configure).await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = get_request(&ctx, Caller::User("dave"), "/cart", configure).await;
    assert!(json(&body)["discount"].is_null());
    ctx.tear_down().await;
}

#[actix_web::test]
async fn cart_reports_a_code_that_no_longer_applies() {
    let ctx = setup(silent_gateway()).await;
    let a = ctx.add_course("A", 600).await;
    let b = ctx.add_course("B", 600).await;
    ctx.db().insert_discount(NewDiscount::fixed("BIG", Money::from(100)).with_min_subtotal(Money::from(1000))).await.unwrap();
    post_request(&ctx, Caller::User("erin"), "/cart/items", &json!({"item_id": a.id}), configure).await;
    post_request(&ctx, Caller::User("erin"), "/cart/items", &json!({"item_id": b.id}), configure).await;
    let (status, _) = post_request(&ctx, Caller::User("erin"), "/cart/discount", &json!({"code": "BIG"}), configure).await;
    assert_eq!(status, StatusCode::OK);

    let path = format!("/cart/items/{}", b.id);
    let (_, body) = delete_request(&ctx, Caller::User("erin"), &path, configure).await;
    let cart = json(&body);
    assert!(cart["discount"].is_null());
    assert_eq!(cart["discount_rejection"]["reason"], "below_minimum_subtotal");
    ctx.tear_down().await;
}
