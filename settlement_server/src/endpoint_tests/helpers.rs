use std::time::Duration;

use actix_web::{http::StatusCode, test, test::TestRequest, web, web::ServiceConfig, App};
use lms_common::{Money, Secret};
use log::debug;
use settlement_engine::{
    db_types::{CatalogItem, NewCatalogItem},
    events::EventProducers,
    gateway::BillingDetails,
    test_utils::prepare_env::{drop_database, prepare_test_env, random_db_path},
    traits::CatalogManagement,
    SettlementApi,
    SettlementOptions,
    SqliteDatabase,
};

use super::mocks::MockGateway;
use crate::identity::{OWNER_HEADER, ROLES_HEADER};

pub type TestApi = SettlementApi<SqliteDatabase, MockGateway>;

pub const TEST_HMAC_SECRET: &str = "endpoint-test-secret";

pub struct TestContext {
    pub url: String,
    pub api: web::Data<TestApi>,
}

impl TestContext {
    pub fn db(&self) -> &SqliteDatabase {
        self.api.db()
    }

    pub async fn add_course(&self, title: &str, price: i64) -> CatalogItem {
        self.db().insert_catalog_item(NewCatalogItem::new(title, Money::from(price))).await.expect("Error adding course")
    }

    pub async fn tear_down(self) {
        drop_database(&self.url).await;
    }
}

pub async fn setup(gateway: MockGateway) -> TestContext {
    setup_with_secret(gateway, "").await
}

/// An empty secret leaves gateway signals unverified.
pub async fn setup_with_secret(gateway: MockGateway, secret: &str) -> TestContext {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    let options = SettlementOptions { redirect_grace: Duration::from_millis(10), ..Default::default() };
    let api = SettlementApi::new(db, gateway, EventProducers::default(), options)
        .with_hmac_secret(Secret::new(secret.to_string()));
    TestContext { url, api: web::Data::new(api) }
}

/// Who is making the request, as told by the session headers.
#[derive(Debug, Clone, Copy)]
pub enum Caller<'a> {
    Anonymous,
    User(&'a str),
    Admin(&'a str),
}

impl<'a> Caller<'a> {
    pub fn apply(self, req: TestRequest) -> TestRequest {
        match self {
            Caller::Anonymous => req,
            Caller::User(owner) => req.insert_header((OWNER_HEADER, owner)).insert_header((ROLES_HEADER, "user")),
            Caller::Admin(owner) => req.insert_header((OWNER_HEADER, owner)).insert_header((ROLES_HEADER, "user,admin")),
        }
    }
}

/// Sends `req` to an app built with `configure`, and returns the status and body. Errors raised by middleware are
/// converted to their responses.
pub async fn send(ctx: &TestContext, req: TestRequest, configure: fn(&mut ServiceConfig)) -> (StatusCode, String) {
    let app = App::new().app_data(ctx.api.clone()).configure(configure);
    let service = test::init_service(app).await;
    debug!("Making request");
    match test::try_call_service(&service, req.to_request()).await {
        Ok(res) => {
            let status = res.status();
            let body = test::read_body(res).await;
            (status, String::from_utf8_lossy(&body).into_owned())
        },
        Err(e) => (e.as_response_error().status_code(), e.to_string()),
    }
}

pub async fn get_request(
    ctx: &TestContext,
    caller: Caller<'_>,
    path: &str,
    configure: fn(&mut ServiceConfig),
) -> (StatusCode, String) {
    send(ctx, caller.apply(TestRequest::get().uri(path)), configure).await
}

pub async fn post_request<T: serde::Serialize>(
    ctx: &TestContext,
    caller: Caller<'_>,
    path: &str,
    body: &T,
    configure: fn(&mut ServiceConfig),
) -> (StatusCode, String) {
    send(ctx, caller.apply(TestRequest::post().uri(path).set_json(body)), configure).await
}

pub async fn delete_request(
    ctx: &TestContext,
    caller: Caller<'_>,
    path: &str,
    configure: fn(&mut ServiceConfig),
) -> (StatusCode, String) {
    send(ctx, caller.apply(TestRequest::delete().uri(path)), configure).await
}

pub fn json(body: &str) -> serde_json::Value {
    serde_json::from_str(body).unwrap_or_else(|e| panic!("Response is not JSON ({e}): {body}"))
}

pub fn billing_json() -> serde_json::Value {
    serde_json::json!({
        "billing": BillingDetails {
            first_name: "Alice".into(),
            last_name: "Liddell".into(),
            email: "alice@example.com".into(),
            phone_number: "+201000000000".into(),
            city: Some("Cairo".into()),
            country: None,
        }
    })
}
