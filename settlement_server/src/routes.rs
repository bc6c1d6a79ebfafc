//! Request handler definitions
//!
//! Define each route and it handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests:
//! ```nocompile
//!     fn my_handler() -> impl Responder {
//!         std::thread::sleep(Duration::from_secs(5)); // <-- Bad practice! Will cause the current worker thread to
//! hang!
//!     }
//! ```
//! For this reason, any long, non-cpu-bound operation (e.g. I/O, database operations, etc.) should be expressed as
//! futures or asynchronous functions. Async handlers get executed concurrently by worker threads and thus don’t block
//! execution. The redirect handler's grace period is a `tokio::time::sleep` for exactly this reason.
use actix_web::{get, web, HttpResponse, Responder};
use log::*;
use settlement_engine::{
    db_types::MerchantOrderId,
    gateway::{PaymentGateway, RedirectQuery, WebhookPayload},
    order_objects::OrderQueryFilter,
    settlement_objects::CheckoutRequest,
    traits::SettlementDatabase,
    DiscountError,
    SettlementApi,
    SettlementError,
};

use crate::{
    data_objects::{
        AddItemRequest,
        ApplyDiscountRequest,
        CartResponse,
        JsonResponse,
        OrderSearchParams,
        WebhookAck,
        WebhookParams,
    },
    errors::ServerError,
    identity::{OptionalIdentity, Role, SessionIdentity},
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro.
// Each bound becomes a type parameter of the generated `<Name>Route` struct, in order.
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };

    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+ where requires [$($roles:expr),+]) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>)
                    .wrap($crate::middleware::AclMiddlewareFactory::new(&[$($roles),+]));
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Cart  ----------------------------------------------------
route!(my_cart => Get "/cart" impl SettlementDatabase, PaymentGateway);
/// Returns the caller's cart, revalued against the live catalog, and the quote for the applied discount code.
///
/// Lines that can no longer be bought are dropped from the stored cart and listed under `cart.dropped`.
pub async fn my_cart<B: SettlementDatabase, G: PaymentGateway>(
    identity: SessionIdentity,
    api: web::Data<SettlementApi<B, G>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET cart for {}", identity.owner_id);
    cart_response(&identity.owner_id, api.as_ref()).await
}

route!(add_cart_item => Post "/cart/items" impl SettlementDatabase, PaymentGateway);
pub async fn add_cart_item<B: SettlementDatabase, G: PaymentGateway>(
    identity: SessionIdentity,
    body: web::Json<AddItemRequest>,
    api: web::Data<SettlementApi<B, G>>,
) -> Result<HttpResponse, ServerError> {
    let item_id = body.into_inner().item_id;
    debug!("💻️ POST cart item {item_id} for {}", identity.owner_id);
    api.cart_api().add_item(&identity.owner_id, item_id).await?;
    cart_response(&identity.owner_id, api.as_ref()).await
}

route!(remove_cart_item => Delete "/cart/items/{item_id}" impl SettlementDatabase, PaymentGateway);
pub async fn remove_cart_item<B: SettlementDatabase, G: PaymentGateway>(
    identity: SessionIdentity,
    path: web::Path<i64>,
    api: web::Data<SettlementApi<B, G>>,
) -> Result<HttpResponse, ServerError> {
    let item_id = path.into_inner();
    debug!("💻️ DELETE cart item {item_id} for {}", identity.owner_id);
    api.cart_api().remove_item(&identity.owner_id, item_id).await?;
    cart_response(&identity.owner_id, api.as_ref()).await
}

route!(apply_discount => Post "/cart/discount" impl SettlementDatabase, PaymentGateway);
/// Evaluates a discount code against the caller's cart and, if it is accepted, stores it with the session.
///
/// Rejections come back as 400 with a typed `rejection` object, e.g. `{"reason": "expired"}`.
pub async fn apply_discount<B: SettlementDatabase, G: PaymentGateway>(
    identity: SessionIdentity,
    body: web::Json<ApplyDiscountRequest>,
    api: web::Data<SettlementApi<B, G>>,
) -> Result<HttpResponse, ServerError> {
    let code = body.into_inner().code;
    debug!("💻️ POST discount code '{code}' for {}", identity.owner_id);
    let quote = api.discount_api().apply_to_session(&code, &identity.owner_id).await?;
    Ok(HttpResponse::Ok().json(quote))
}

route!(remove_discount => Delete "/cart/discount" impl SettlementDatabase, PaymentGateway);
pub async fn remove_discount<B: SettlementDatabase, G: PaymentGateway>(
    identity: SessionIdentity,
    api: web::Data<SettlementApi<B, G>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ DELETE discount for {}", identity.owner_id);
    api.discount_api().remove_from_session(&identity.owner_id).await?;
    Ok(HttpResponse::Ok().json(JsonResponse::success("Discount removed.")))
}

async fn cart_response<B: SettlementDatabase, G: PaymentGateway>(
    owner_id: &str,
    api: &SettlementApi<B, G>,
) -> Result<HttpResponse, ServerError> {
    let cart = api.cart_api().revalue_session_cart(owner_id).await?;
    let (discount, discount_rejection) = match api.discount_api().quote_for_session(owner_id, &cart).await {
        Ok(quote) => (quote, None),
        Err(DiscountError::Rejected(r)) => (None, Some(r)),
        Err(e) => return Err(e.into()),
    };
    Ok(HttpResponse::Ok().json(CartResponse { cart, discount, discount_rejection }))
}

//----------------------------------------------   Checkout  ----------------------------------------------------
route!(checkout => Post "/checkout" impl SettlementDatabase, PaymentGateway);
/// Turns the caller's cart into an order.
///
/// The response is either `{"status": "payment_required", "payment_url": ...}`, in which case the purchaser should be
/// sent to the payment page, or `{"status": "completed", ...}` when there was nothing to pay.
pub async fn checkout<B: SettlementDatabase, G: PaymentGateway>(
    identity: SessionIdentity,
    body: web::Json<CheckoutRequest>,
    api: web::Data<SettlementApi<B, G>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ POST checkout for {}", identity.owner_id);
    let result = api.checkout(&identity.owner_id, body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(result))
}

//----------------------------------------------   Orders  ----------------------------------------------------
route!(my_orders => Get "/orders" impl SettlementDatabase, PaymentGateway);
pub async fn my_orders<B: SettlementDatabase, G: PaymentGateway>(
    identity: SessionIdentity,
    api: web::Data<SettlementApi<B, G>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET orders for {}", identity.owner_id);
    let orders = api.orders_for_owner(&identity.owner_id).await?;
    Ok(HttpResponse::Ok().json(orders))
}

route!(my_order => Get "/orders/{merchant_order_id}" impl SettlementDatabase, PaymentGateway);
/// Orders belonging to someone else are reported as not found.
pub async fn my_order<B: SettlementDatabase, G: PaymentGateway>(
    identity: SessionIdentity,
    path: web::Path<MerchantOrderId>,
    api: web::Data<SettlementApi<B, G>>,
) -> Result<HttpResponse, ServerError> {
    let mid = path.into_inner();
    debug!("💻️ GET order {mid} for {}", identity.owner_id);
    let order = api.order_for_owner(&mid, &identity.owner_id).await?;
    Ok(HttpResponse::Ok().json(order))
}

//----------------------------------------------   Admin  ----------------------------------------------------
route!(orders_search => Get "/admin/orders/search" impl SettlementDatabase, PaymentGateway where requires [Role::Admin]);
pub async fn orders_search<B: SettlementDatabase, G: PaymentGateway>(
    params: web::Query<OrderSearchParams>,
    api: web::Data<SettlementApi<B, G>>,
) -> Result<HttpResponse, ServerError> {
    let query = OrderQueryFilter::try_from(params.into_inner()).map_err(ServerError::InvalidRequestBody)?;
    debug!("💻️ GET orders search for [{query}]");
    let orders = api.search_orders(query).await?;
    Ok(HttpResponse::Ok().json(orders))
}

route!(order_signals => Get "/admin/orders/{merchant_order_id}/signals" impl SettlementDatabase, PaymentGateway where requires [Role::Admin]);
/// The audit trail of every gateway signal received for an order.
pub async fn order_signals<B: SettlementDatabase, G: PaymentGateway>(
    path: web::Path<MerchantOrderId>,
    api: web::Data<SettlementApi<B, G>>,
) -> Result<HttpResponse, ServerError> {
    let mid = path.into_inner();
    debug!("💻️ GET signals for order {mid}");
    let signals = api.signals_for_order(&mid).await?;
    Ok(HttpResponse::Ok().json(signals))
}

route!(inquire_order => Post "/admin/orders/{merchant_order_id}/inquire" impl SettlementDatabase, PaymentGateway where requires [Role::Admin]);
pub async fn inquire_order<B: SettlementDatabase, G: PaymentGateway>(
    path: web::Path<MerchantOrderId>,
    api: web::Data<SettlementApi<B, G>>,
) -> Result<HttpResponse, ServerError> {
    let mid = path.into_inner();
    info!("💻️ Manual inquiry requested for order {mid}");
    let outcome = api.inquire_and_settle(&mid).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

route!(reconcile => Post "/admin/reconcile" impl SettlementDatabase, PaymentGateway where requires [Role::Admin]);
pub async fn reconcile<B: SettlementDatabase, G: PaymentGateway>(
    api: web::Data<SettlementApi<B, G>>,
) -> Result<HttpResponse, ServerError> {
    info!("💻️ Manual reconciliation requested");
    let report = api.reconcile().await?;
    Ok(HttpResponse::Ok().json(report))
}

//----------------------------------------------   Gateway  ----------------------------------------------------
route!(paygate_webhook => Post "/webhook" impl SettlementDatabase, PaymentGateway);
/// The gateway's server-to-server notification.
///
/// Once the body has been parsed and its MAC accepted, the gateway gets a 200, including for unknown orders. Only
/// transient errors, where nothing was changed, return a 503 so that the gateway redelivers.
pub async fn paygate_webhook<B: SettlementDatabase, G: PaymentGateway>(
    body: web::Bytes,
    params: web::Query<WebhookParams>,
    api: web::Data<SettlementApi<B, G>>,
) -> Result<HttpResponse, ServerError> {
    trace!("💻️ Received gateway webhook");
    let payload = serde_json::from_slice::<WebhookPayload>(body.as_ref()).map_err(|e| {
        warn!("💻️ Could not parse gateway webhook. {e}");
        ServerError::CouldNotDeserializePayload
    })?;
    match api.process_webhook(&payload, params.hmac.as_deref()).await {
        Ok(outcome) => Ok(HttpResponse::Ok().json(WebhookAck::settled(outcome))),
        Err(e @ SettlementError::InvalidSignature(_)) => Err(e.into()),
        Err(e) if e.is_retryable() => {
            warn!("💻️ Webhook could not be applied right now. Asking the gateway to retry. {e}");
            Err(e.into())
        },
        Err(e) => {
            warn!("💻️ Webhook acknowledged but not applied. {e}");
            Ok(HttpResponse::Ok().json(WebhookAck::noted(e)))
        },
    }
}

route!(paygate_redirect => Get "/redirect" impl SettlementDatabase, PaymentGateway);
/// Where the purchaser's browser lands after the payment page. Returns the order's current state, after giving the
/// webhook a short grace period and, failing that, asking the gateway directly.
pub async fn paygate_redirect<B: SettlementDatabase, G: PaymentGateway>(
    query: web::Query<RedirectQuery>,
    identity: OptionalIdentity,
    api: web::Data<SettlementApi<B, G>>,
) -> Result<HttpResponse, ServerError> {
    let owner = identity.0.as_ref().map(|i| i.owner_id.as_str());
    debug!("💻️ Gateway redirect for {:?} (owner {owner:?})", query.merchant_order_id());
    let resolution = api.resolve_redirect(&query, owner).await?;
    Ok(HttpResponse::Ok().json(resolution))
}
