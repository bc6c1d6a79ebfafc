use actix_web::{http::StatusCode, test::TestRequest, web, web::ServiceConfig};
use lms_common::{Money, Secret};
use settlement_engine::{
    db_types::{MerchantOrderId, NewOrder, NewOrderItem, Order, OrderStatusType},
    gateway::{
        signature::{canonical_transaction_string, compute_mac},
        TransactionObject,
        WebhookPayload,
    },
    test_utils::{failed_transaction, successful_transaction, webhook},
    traits::{EntitlementGranter, OrderLedger},
    SqliteDatabase,
};

use super::{
    helpers::{get_request, json, send, setup, setup_with_secret, Caller, TestContext, TEST_HMAC_SECRET},
    mocks::{silent_gateway, MockGateway},
};
use crate::{
    helpers::calculate_hmac,
    middleware::{HmacMiddlewareFactory, PAYGATE_HMAC_HEADER},
    routes::{PaygateRedirectRoute, PaygateWebhookRoute},
};

fn configure(cfg: &mut ServiceConfig) {
    cfg.service(PaygateWebhookRoute::<SqliteDatabase, MockGateway>::new())
        .service(PaygateRedirectRoute::<SqliteDatabase, MockGateway>::new());
}

fn configure_raw_body_hmac(cfg: &mut ServiceConfig) {
    let secret = Secret::new(TEST_HMAC_SECRET.to_string());
    cfg.service(
        web::scope("")
            .wrap(HmacMiddlewareFactory::new(PAYGATE_HMAC_HEADER, secret, true))
            .service(PaygateWebhookRoute::<SqliteDatabase, MockGateway>::new()),
    );
}

async fn place_order(ctx: &TestContext, owner: &str, price: i64) -> (Order, i64) {
    let course = ctx.add_course("Rust 101", price).await;
    let item = NewOrderItem::new(course.id, course.title.clone(), course.price, course.price, 20.0);
    let order = ctx.db().insert_order(NewOrder::new(owner, vec![item], "EGP")).await.expect("Error inserting order");
    (order, course.id)
}

fn signed(obj: &TransactionObject) -> String {
    compute_mac(TEST_HMAC_SECRET, &canonical_transaction_string(obj))
}

async fn post_webhook(ctx: &TestContext, payload: &WebhookPayload, hmac: Option<&str>) -> (StatusCode, String) {
    let uri = match hmac {
        Some(mac) => format!("/webhook?hmac={mac}"),
        None => "/webhook".to_string(),
    };
    let body = serde_json::to_string(payload).expect("Could not serialize webhook");
    let req = TestRequest::post().uri(&uri).insert_header(("Content-Type", "application/json")).set_payload(body);
    send(ctx, req, configure).await
}

#[actix_web::test]
async fn signed_webhook_settles_the_order_once() {
    let ctx = setup_with_secret(silent_gateway(), TEST_HMAC_SECRET).await;
    let (order, course_id) = place_order(&ctx, "alice", 500).await;
    let payload = webhook(successful_transaction(&order.merchant_order_id, Money::from(500)));
    let mac = signed(&payload.obj);

    let (status, body) = post_webhook(&ctx, &payload, Some(&mac)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let ack = json(&body);
    assert_eq!(ack["received"], true);
    assert_eq!(ack["outcome"]["result"], "completed");
    assert!(ctx.db().has_access("alice", course_id).await.unwrap());

    let (status, body) = post_webhook(&ctx, &payload, Some(&mac)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["outcome"]["result"], "already_processed");
    assert_eq!(ctx.db().entitlements_for_owner("alice").await.unwrap().len(), 1);
    ctx.tear_down().await;
}

#[actix_web::test]
async fn webhooks_with_a_bad_mac_are_refused() {
    let ctx = setup_with_secret(silent_gateway(), TEST_HMAC_SECRET).await;
    let (order, _) = place_order(&ctx, "bob", 500).await;
    let payload = webhook(successful_transaction(&order.merchant_order_id, Money::from(500)));

    let (status, _) = post_webhook(&ctx, &payload, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = post_webhook(&ctx, &payload, Some("00ff")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let order = ctx.db().fetch_order(&order.merchant_order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatusType::Pending);
    ctx.tear_down().await;
}

#[actix_web::test]
async fn raw_body_signatures() {
    let ctx = setup_with_secret(silent_gateway(), TEST_HMAC_SECRET).await;
    let (order, _) = place_order(&ctx, "heidi", 500).await;
    let payload = webhook(successful_transaction(&order.merchant_order_id, Money::from(500)));
    let uri = format!("/webhook?hmac={}", signed(&payload.obj));
    let body = serde_json::to_string(&payload).expect("Could not serialize webhook");

    let req = TestRequest::post().uri(&uri).set_payload(body.clone());
    let (status, _) = send(&ctx, req, configure_raw_body_hmac).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let req = TestRequest::post()
        .uri(&uri)
        .insert_header((PAYGATE_HMAC_HEADER, calculate_hmac("wrong secret", body.as_bytes())))
        .set_payload(body.clone());
    let (status, _) = send(&ctx, req, configure_raw_body_hmac).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let req = TestRequest::post()
        .uri(&uri)
        .insert_header((PAYGATE_HMAC_HEADER, calculate_hmac(TEST_HMAC_SECRET, body.as_bytes())))
        .set_payload(body);
    let (status, body) = send(&ctx, req, configure_raw_body_hmac).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(json(&body)["outcome"]["result"], "completed");
    ctx.tear_down().await;
}

#[actix_web::test]
async fn webhooks_for_unknown_orders_are_acknowledged() {
    let ctx = setup(silent_gateway()).await;
    let payload = webhook(successful_transaction(&MerchantOrderId("lms-nobody".into()), Money::from(500)));
    let (status, body) = post_webhook(&ctx, &payload, None).await;
    assert_eq!(status, StatusCode::OK);
    let ack = json(&body);
    assert_eq!(ack["received"], true);
    assert!(ack["outcome"].is_null());
    assert!(ack["note"].as_str().is_some_and(|n| n.contains("lms-nobody")), "{body}");
    ctx.tear_down().await;
}

#[actix_web::test]
async fn malformed_webhooks_are_rejected() {
    let ctx = setup(silent_gateway()).await;
    let req = TestRequest::post().uri("/webhook").set_payload("{\"type\": \"TRANSACTION\", \"obj\": 42}");
    let (status, _) = send(&ctx, req, configure).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    ctx.tear_down().await;
}

#[actix_web::test]
async fn other_webhook_types_are_ignored() {
    let ctx = setup(silent_gateway()).await;
    let (order, _) = place_order(&ctx, "carol", 500).await;
    let mut payload = webhook(successful_transaction(&order.merchant_order_id, Money::from(500)));
    payload.kind = "TOKEN".into();
    let (status, body) = post_webhook(&ctx, &payload, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["outcome"]["result"], "ignored");
    let order = ctx.db().fetch_order(&order.merchant_order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatusType::Pending);
    ctx.tear_down().await;
}

#[actix_web::test]
async fn redirect_falls_back_to_an_inquiry() {
    let mut gateway = MockGateway::new();
    gateway
        .expect_inquire()
        .times(1)
        .returning(|mid: &MerchantOrderId| Ok(successful_transaction(mid, Money::from(500))));
    let ctx = setup(gateway).await;
    let (order, course_id) = place_order(&ctx, "dave", 500).await;
    // The redirect claims a failure. It is recorded, but the inquiry decides.
    let path = format!("/redirect?merchant_order_id={}&success=false&pending=false", order.merchant_order_id);
    let (status, body) = get_request(&ctx, Caller::User("dave"), &path, configure).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let page = json(&body);
    assert_eq!(page["inquired"], true);
    assert_eq!(page["order"]["status"], "Completed");
    assert_eq!(page["order_number"], order.order_number());
    assert!(ctx.db().has_access("dave", course_id).await.unwrap());
    ctx.tear_down().await;
}

#[actix_web::test]
async fn redirect_after_the_webhook_does_not_inquire() {
    let ctx = setup(silent_gateway()).await;
    let (order, _) = place_order(&ctx, "erin", 500).await;
    let payload = webhook(failed_transaction(&order.merchant_order_id, Money::from(500), "Insufficient funds"));
    post_webhook(&ctx, &payload, None).await;

    let path = format!("/redirect?merchant_order_id={}", order.merchant_order_id);
    let (status, body) = get_request(&ctx, Caller::Anonymous, &path, configure).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let page = json(&body);
    assert_eq!(page["inquired"], false);
    assert_eq!(page["order"]["status"], "Failed");
    ctx.tear_down().await;
}

#[actix_web::test]
async fn redirect_for_someone_elses_order() {
    let ctx = setup(silent_gateway()).await;
    let (order, _) = place_order(&ctx, "frank", 500).await;
    let path = format!("/redirect?merchant_order_id={}", order.merchant_order_id);
    let (status, _) = get_request(&ctx, Caller::User("grace"), &path, configure).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = get_request(&ctx, Caller::User("grace"), "/redirect", configure).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    ctx.tear_down().await;
}
