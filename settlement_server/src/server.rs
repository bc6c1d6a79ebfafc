use std::{sync::Arc, time::Duration};

use actix_web::{
    dev::{Server, Service},
    http::KeepAlive,
    middleware::Logger,
    web,
    App,
    HttpServer,
};
use futures::{future::ok, FutureExt};
use log::*;
use paygate_tools::PaygateApi;
use settlement_engine::{SettlementApi, SqliteDatabase};

use crate::{
    config::ServerConfig,
    errors::{AuthError, ServerError, ServerError::AuthenticationError},
    helpers::get_remote_ip,
    integrations::receipts::{create_receipt_event_handlers, ReceiptDispatcher},
    middleware::{HmacMiddlewareFactory, PAYGATE_HMAC_HEADER},
    reconciliation_worker::start_reconciliation_worker,
    routes::{
        health,
        AddCartItemRoute,
        ApplyDiscountRoute,
        CheckoutRoute,
        InquireOrderRoute,
        MyCartRoute,
        MyOrderRoute,
        MyOrdersRoute,
        OrderSignalsRoute,
        OrdersSearchRoute,
        PaygateRedirectRoute,
        PaygateWebhookRoute,
        ReconcileRoute,
        RemoveCartItemRoute,
        RemoveDiscountRoute,
    },
};

pub type LiveSettlementApi = SettlementApi<SqliteDatabase, PaygateApi>;

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    info!("🗃️ Connected to the settlement database");
    let gateway = PaygateApi::new(config.paygate.clone()).map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let dispatcher = ReceiptDispatcher::new(config.receipt_webhook_url.clone())
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let handlers = create_receipt_event_handlers(dispatcher);
    let producers = handlers.producers();
    handlers.start_handlers().await;
    info!("📬️ Receipt handlers started");
    let api = SettlementApi::new(db, gateway, producers, config.settlement_options())
        .with_hmac_secret(config.paygate.hmac_secret.clone());
    let api = Arc::new(api);
    match config.reconcile_interval {
        Some(interval) => {
            let _worker = start_reconciliation_worker(Arc::clone(&api), interval);
        },
        None => warn!("🕰️ The reconciliation worker is disabled. Stale pending orders will not be inquired about."),
    }
    let srv = create_server_instance(config, api)?;
    info!("🚀️ Settlement server started");
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(config: ServerConfig, api: Arc<LiveSettlementApi>) -> Result<Server, ServerError> {
    let api = web::Data::from(api);
    let srv = HttpServer::new(move || {
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("lms::access_log"))
            .app_data(api.clone());
        // Routes that require a purchaser session
        let api_scope = web::scope("/api")
            .service(MyCartRoute::<SqliteDatabase, PaygateApi>::new())
            .service(AddCartItemRoute::<SqliteDatabase, PaygateApi>::new())
            .service(RemoveCartItemRoute::<SqliteDatabase, PaygateApi>::new())
            .service(ApplyDiscountRoute::<SqliteDatabase, PaygateApi>::new())
            .service(RemoveDiscountRoute::<SqliteDatabase, PaygateApi>::new())
            .service(CheckoutRoute::<SqliteDatabase, PaygateApi>::new())
            .service(MyOrdersRoute::<SqliteDatabase, PaygateApi>::new())
            .service(MyOrderRoute::<SqliteDatabase, PaygateApi>::new())
            .service(OrdersSearchRoute::<SqliteDatabase, PaygateApi>::new())
            .service(OrderSignalsRoute::<SqliteDatabase, PaygateApi>::new())
            .service(InquireOrderRoute::<SqliteDatabase, PaygateApi>::new())
            .service(ReconcileRoute::<SqliteDatabase, PaygateApi>::new());
        let use_x_forwarded_for = config.use_x_forwarded_for;
        let use_forwarded = config.use_forwarded;
        let paygate_whitelist = config.paygate_whitelist.clone();
        // The redirect is opened by the purchaser's browser, so only the webhook is whitelisted.
        let webhook_scope = web::scope("")
            .wrap(HmacMiddlewareFactory::new(
                PAYGATE_HMAC_HEADER,
                config.paygate.hmac_secret.clone(),
                config.raw_body_hmac,
            ))
            .wrap_fn(move |req, srv| {
                let peer_ip = get_remote_ip(req.request(), use_x_forwarded_for, use_forwarded);
                let whitelisted = match (peer_ip, &paygate_whitelist) {
                    (Some(ip), Some(whitelist)) => {
                        info!("💳️ Gateway webhook from {ip}");
                        whitelist.contains(&ip)
                    },
                    (_, None) => true,
                    (None, Some(_)) => {
                        warn!("💳️ No IP address found in gateway webhook request, denying access.");
                        false
                    },
                };
                if whitelisted {
                    srv.call(req).boxed_local()
                } else {
                    ok(req.error_response(AuthenticationError(AuthError::ForbiddenPeer))).boxed_local()
                }
            })
            .service(PaygateWebhookRoute::<SqliteDatabase, PaygateApi>::new());
        let paygate_scope = web::scope("/paygate")
            .service(PaygateRedirectRoute::<SqliteDatabase, PaygateApi>::new())
            .service(webhook_scope);
        app.service(health).service(api_scope).service(paygate_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}
