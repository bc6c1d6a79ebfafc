use std::fmt::Debug;

use chrono::Utc;
use lms_common::Secret;
use log::*;
use validator::Validate;

use crate::{
    db_types::{
        GrantOutcome,
        MerchantOrderId,
        NewOrder,
        Order,
        OrderItem,
        OrderStatusType,
        SettlementSignal,
        SignalChannel,
        Transition,
        VerdictOutcome,
    },
    events::{EventProducers, OrderCompletedEvent, OrderFailedEvent, ReceiptNotifier},
    gateway::{
        signature::{canonical_redirect_string, canonical_transaction_string, verify_mac},
        BillingDetails,
        PaymentGateway,
        RedirectQuery,
        SessionItem,
        SessionRequest,
        SignalFields,
        Verdict,
        WebhookPayload,
    },
    order_objects::{OrderQueryFilter, OrderWithItems},
    se_api::{
        cart_api::CartApi,
        cart_objects::{DroppedLine, ValidatedCart},
        discount_api::{DiscountApi, DiscountQuote},
        errors::SettlementError,
        settlement_objects::{
            CheckoutRequest,
            CheckoutResult,
            ReconciliationReport,
            RedirectResolution,
            SettlementOptions,
            SettlementOutcome,
            SESSION_UNAVAILABLE_REASON,
        },
    },
    traits::SettlementDatabase,
};

/// A success verdict may have to reopen a failed order and then complete it, while racing other writers. Each
/// lost race costs one round.
const MAX_TRANSITION_ROUNDS: usize = 4;

/// `SettlementApi` is the settlement coordinator. Every gateway signal, whichever channel it arrives on, ends up in
/// [`SettlementApi::process_signal`], and every status change goes through the guarded transitions of the
/// [`crate::traits::OrderLedger`].
///
/// Side effects of a completion (entitlements, receipt, cart clearing, events) are run only by the caller that won
/// the `Pending -> Completed` transition. Their failures are logged and never undo the completion.
pub struct SettlementApi<B, G> {
    db: B,
    gateway: G,
    producers: EventProducers,
    options: SettlementOptions,
    hmac_secret: Secret<String>,
}

impl<B, G> Debug for SettlementApi<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SettlementApi ({:?})", self.options)
    }
}

impl<B, G> SettlementApi<B, G> {
    pub fn new(db: B, gateway: G, producers: EventProducers, options: SettlementOptions) -> Self {
        Self { db, gateway, producers, options, hmac_secret: Secret::default() }
    }

    /// Sets the secret used to check the gateway's MAC on webhooks and redirects. Without one, signals are accepted
    /// but recorded as unverified.
    pub fn with_hmac_secret(mut self, secret: Secret<String>) -> Self {
        self.hmac_secret = secret;
        self
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn options(&self) -> &SettlementOptions {
        &self.options
    }
}

impl<B, G> SettlementApi<B, G>
where
    B: SettlementDatabase,
    G: PaymentGateway,
{
    pub fn cart_api(&self) -> CartApi<B> {
        CartApi::new(self.db.clone())
    }

    pub fn discount_api(&self) -> DiscountApi<B> {
        DiscountApi::new(self.db.clone())
    }

    //------------------------------------------   Checkout   ------------------------------------------------------
    /// Turns the owner's session cart into a pending order and opens a payment session for it.
    ///
    /// The cart is revalued and the applied discount re-evaluated against the fresh subtotal before anything is
    /// written. An order with nothing to pay is completed on the spot without contacting the gateway.
    ///
    /// A purchaser who already has a pending order for exactly the same items gets that order back, with its open
    /// payment session, or a fresh attempt at opening one if the last attempt had an unknown outcome. A pending order
    /// that covers only some of the cart's items refuses the checkout with [`SettlementError::CheckoutInProgress`].
    ///
    /// If the gateway refuses the session, or cannot be reached at all, the order is failed and
    /// [`SettlementError::GatewayUnavailable`] is returned. If the outcome of the session request is unknown
    /// (timeouts, garbled responses), the order is left pending and the error is retryable.
    pub async fn checkout(&self, owner_id: &str, request: CheckoutRequest) -> Result<CheckoutResult, SettlementError> {
        request.billing.validate().map_err(|e| SettlementError::InvalidBilling(e.to_string()))?;
        let cart = self.cart_api().revalue_session_cart(owner_id).await?;
        if cart.is_empty() {
            debug!("🧾️ Checkout refused for {owner_id}: the cart is empty");
            return Err(SettlementError::EmptyCart);
        }
        if let Some((order, items)) = self.pending_order_covering(owner_id, &cart).await? {
            let mid = order.merchant_order_id.clone();
            let discount = order.discount_code.clone().map(|code| DiscountQuote {
                code,
                amount: order.discount_amount,
                subtotal: order.subtotal,
                total: order.total,
            });
            if let Some(payment_url) = order.payment_url.clone() {
                info!("🧾️ {owner_id} already has pending order {mid} for these items. Resuming its payment session.");
                return Ok(CheckoutResult::PaymentRequired { order, payment_url, dropped: cart.dropped, discount });
            }
            info!("🧾️ Pending order {mid} of {owner_id} has no payment session yet. Trying to open one again.");
            let items = items.into_iter().map(|i| SessionItem { name: i.title, amount: i.final_price, quantity: 1 }).collect();
            return self.open_payment_session(order, items, request.billing, cart.dropped, discount).await;
        }
        let discount = self.discount_api().quote_for_session(owner_id, &cart).await?;
        let mut new_order = NewOrder::new(owner_id, cart.to_order_items(), &self.options.currency);
        if let Some(quote) = &discount {
            new_order = new_order.with_discount(&quote.code, quote.amount);
        }
        let order = self.db.insert_order(new_order).await?;
        let mid = order.merchant_order_id.clone();
        info!("🧾️ Order {} [{mid}] created for {owner_id}. Total: {} {}", order.order_number(), order.total, order.currency);

        if order.total.is_zero() {
            let verdict = Verdict::zero_total(&mid);
            self.record_signal(&verdict).await;
            let outcome = self.apply_verdict(order.clone(), &verdict).await?;
            let order = outcome.order().cloned().unwrap_or(order);
            info!("🧾️ Order {} has nothing to pay and was completed immediately", order.order_number());
            return Ok(CheckoutResult::Completed { order, dropped: cart.dropped, discount });
        }

        let items = cart
            .lines
            .iter()
            .map(|l| SessionItem { name: l.title.clone(), amount: l.final_price, quantity: 1 })
            .collect();
        self.open_payment_session(order, items, request.billing, cart.dropped, discount).await
    }

    async fn open_payment_session(
        &self,
        order: Order,
        items: Vec<SessionItem>,
        billing: BillingDetails,
        dropped: Vec<DroppedLine>,
        discount: Option<DiscountQuote>,
    ) -> Result<CheckoutResult, SettlementError> {
        let mid = order.merchant_order_id.clone();
        let session_request = SessionRequest {
            merchant_order_id: mid.clone(),
            amount: order.total,
            currency: order.currency.clone(),
            items,
            billing,
            redirect_url: self.options.redirect_url.clone(),
        };
        match self.gateway.create_session(session_request).await {
            Ok(session) => {
                let order = self.db.attach_gateway_session(&mid, &session.gateway_order_id, &session.payment_url).await?;
                debug!("🧾️ Payment session {} opened for order {mid}", session.gateway_order_id);
                Ok(CheckoutResult::PaymentRequired { order, payment_url: session.payment_url, dropped, discount })
            },
            Err(e) if e.session_never_created() => {
                warn!("🧾️ No payment session could be created for order {mid}. Failing the order. {e}");
                let verdict = Verdict::internal_failure(&mid, SESSION_UNAVAILABLE_REASON);
                self.record_signal(&verdict).await;
                self.apply_verdict(order, &verdict).await?;
                Err(SettlementError::GatewayUnavailable(e))
            },
            Err(e) => {
                warn!("🧾️ The payment session request for order {mid} had an unknown outcome. The order stays pending. {e}");
                Err(SettlementError::GatewayRetryable(e))
            },
        }
    }

    /// Finds the pending order of `owner_id` for exactly the items in `cart`, along with its items. A pending order
    /// that shares only some items with the cart is an error.
    async fn pending_order_covering(
        &self,
        owner_id: &str,
        cart: &ValidatedCart,
    ) -> Result<Option<(Order, Vec<OrderItem>)>, SettlementError> {
        let query = OrderQueryFilter::default().with_owner_id(owner_id).with_status(OrderStatusType::Pending);
        let pending = self.db.search_orders(query).await?;
        let mut wanted = cart.item_ids();
        wanted.sort_unstable();
        for order in pending {
            let items = self.db.fetch_order_items(order.id).await?;
            let mut held = items.iter().map(|i| i.item_id).collect::<Vec<_>>();
            held.sort_unstable();
            if held == wanted {
                return Ok(Some((order, items)));
            }
            if held.iter().any(|id| wanted.binary_search(id).is_ok()) {
                let mid = order.merchant_order_id;
                info!("🧾️ Checkout refused for {owner_id}: pending order {mid} already covers some of these items");
                return Err(SettlementError::CheckoutInProgress(mid));
            }
        }
        Ok(None)
    }

    //------------------------------------------   Signals    ------------------------------------------------------
    /// Handles a server-to-server webhook. `mac` is the MAC from the query string.
    pub async fn process_webhook(&self, payload: &WebhookPayload, mac: Option<&str>) -> Result<SettlementOutcome, SettlementError> {
        let verified = verify_mac(&self.hmac_secret, &canonical_transaction_string(&payload.obj), mac).map_err(|e| {
            warn!("🔐️ Rejecting webhook for {:?}. {e}", payload.obj.merchant_order_id());
            e
        })?;
        if !payload.is_transaction() {
            debug!("🧾️ Ignoring webhook of type {:?}", payload.kind);
            return Ok(SettlementOutcome::Ignored);
        }
        let raw = serde_json::to_string(payload).unwrap_or_default();
        self.process_signal(SignalFields::from(&payload.obj), SignalChannel::Webhook, verified, raw).await
    }

    /// The single pipeline for gateway signals: locate the order by its correlation id, classify the signal, record
    /// it in the audit log, and apply the verdict.
    pub async fn process_signal(
        &self,
        fields: SignalFields,
        channel: SignalChannel,
        verified: bool,
        raw: String,
    ) -> Result<SettlementOutcome, SettlementError> {
        let Some(mid) = fields.merchant_order_id.clone() else {
            warn!("🧾️ A {channel} signal without a merchant order id was received. It is recorded but not applied.");
            self.record_signal(&Verdict::normalize(fields, channel, None, verified, raw)).await;
            return Err(SettlementError::MissingCorrelationId);
        };
        let Some(order) = self.db.fetch_order(&mid).await? else {
            warn!("🧾️ A {channel} signal refers to order {mid}, which does not exist");
            self.record_signal(&Verdict::normalize(fields, channel, None, verified, raw)).await;
            return Err(SettlementError::OrderNotFound(mid));
        };
        let verdict = Verdict::normalize(fields, channel, Some(order.total), verified, raw);
        self.record_signal(&verdict).await;
        self.apply_verdict(order, &verdict).await
    }

    /// Applies a verdict to `order`. `order` may be stale; the guarded transitions decide what actually happens.
    pub async fn apply_verdict(&self, order: Order, verdict: &Verdict) -> Result<SettlementOutcome, SettlementError> {
        match verdict.outcome {
            VerdictOutcome::Success => self.settle_success(order, verdict).await,
            VerdictOutcome::Failure => self.settle_failure(order, verdict).await,
            VerdictOutcome::Pending => {
                debug!(
                    "🧾️ {} verdict for order {} is pending ({:?}). No transition.",
                    verdict.channel, order.merchant_order_id, verdict.evidence
                );
                Ok(SettlementOutcome::Unchanged(order))
            },
        }
    }

    async fn settle_success(&self, order: Order, verdict: &Verdict) -> Result<SettlementOutcome, SettlementError> {
        let mid = order.merchant_order_id.clone();
        let mut current = order;
        let mut corrected = false;
        for _ in 0..MAX_TRANSITION_ROUNDS {
            match current.status {
                OrderStatusType::Completed => {
                    debug!("🧾️ Order {mid} is already completed. Treating the {} success as a replay.", verdict.channel);
                    let current = match self.ensure_entitlements(&current).await {
                        true if current.entitlements_granted_at.is_none() => {
                            self.db.fetch_order(&mid).await?.unwrap_or(current)
                        },
                        _ => current,
                    };
                    return Ok(SettlementOutcome::AlreadyProcessed(current));
                },
                OrderStatusType::Failed => match self.db.reopen_failed_order(&mid).await? {
                    Transition::Applied(o) => {
                        info!("🧾️ Order {mid} was marked as failed, but a {} signal reports success. Correcting.", verdict.channel);
                        corrected = true;
                        current = o;
                    },
                    Transition::NotApplied(o) => current = o,
                },
                OrderStatusType::Pending => match self.db.complete_order(&mid, verdict.settlement_details()).await? {
                    Transition::Applied(o) => {
                        let o = self.on_order_completed(o).await;
                        return Ok(if corrected { SettlementOutcome::Corrected(o) } else { SettlementOutcome::Completed(o) });
                    },
                    Transition::NotApplied(o) => {
                        debug!("🧾️ Order {mid} changed to {} before it could be completed here", o.status);
                        current = o;
                    },
                },
            }
        }
        error!("🧾️ Order {mid} kept changing state while being settled. Giving up on this signal.");
        Err(SettlementError::TransitionConflict(mid))
    }

    async fn settle_failure(&self, order: Order, verdict: &Verdict) -> Result<SettlementOutcome, SettlementError> {
        let mid = order.merchant_order_id.clone();
        match order.status {
            OrderStatusType::Completed => {
                warn!(
                    "🧾️ A {} failure arrived for order {mid}, which is already completed. Ignoring it. Reason: {}",
                    verdict.channel,
                    verdict.failure_reason()
                );
                Ok(SettlementOutcome::Unchanged(order))
            },
            OrderStatusType::Failed => {
                debug!("🧾️ Order {mid} has already failed");
                Ok(SettlementOutcome::Unchanged(order))
            },
            OrderStatusType::Pending => {
                let reason = verdict.failure_reason();
                match self.db.fail_order(&mid, reason, verdict.settlement_details()).await? {
                    Transition::Applied(o) => {
                        info!("🧾️ Order {} [{mid}] failed: {reason}", o.order_number());
                        self.producers.publish_order_failed(OrderFailedEvent::new(o.clone(), reason)).await;
                        Ok(SettlementOutcome::Failed(o))
                    },
                    Transition::NotApplied(o) => {
                        debug!("🧾️ Order {mid} is {} and was not failed", o.status);
                        Ok(SettlementOutcome::Unchanged(o))
                    },
                }
            },
        }
    }

    /// Runs the completion side effects. Only the winner of the completion transition gets here.
    async fn on_order_completed(&self, mut order: Order) -> Order {
        info!(
            "🧾️ Order {} [{}] completed for {}. Total: {} {}",
            order.order_number(),
            order.merchant_order_id,
            order.owner_id,
            order.total,
            order.currency
        );
        let (items, granted) = match self.db.fetch_order_items(order.id).await {
            Ok(items) => {
                let granted = self.grant_all(&order, &items).await;
                (items, granted)
            },
            Err(e) => {
                error!("🧾️ Could not load the items of order {}. Entitlements will be granted later. {e}", order.id);
                (Vec::new(), false)
            },
        };
        if granted {
            match self.db.mark_entitlements_granted(order.id).await {
                Ok(()) => order.entitlements_granted_at = Some(Utc::now()),
                Err(e) => error!("🧾️ Could not record the entitlement grant for order {}. {e}", order.id),
            }
        }
        match self.db.claim_notification(order.id).await {
            Ok(true) => {
                order.notification_sent = true;
                if let Err(e) = self.producers.send_receipt(&order.owner_id, &order, &items).await {
                    warn!("🧾️ The receipt for order {} could not be sent. {e}", order.order_number());
                }
            },
            Ok(false) => debug!("🧾️ The receipt for order {} has already been sent", order.order_number()),
            Err(e) => error!("🧾️ Could not claim the receipt notification for order {}. {e}", order.order_number()),
        }
        if let Err(e) = self.db.clear_cart(&order.owner_id).await {
            warn!("🧾️ Could not clear the cart of {} after order {}. {e}", order.owner_id, order.order_number());
        }
        self.producers.publish_order_completed(OrderCompletedEvent::new(order.clone(), items)).await;
        order
    }

    /// Grants every line of the order. Returns `true` only if every grant succeeded.
    async fn grant_all(&self, order: &Order, items: &[OrderItem]) -> bool {
        let mut all_granted = true;
        for item in items {
            match self.db.grant_access(&order.owner_id, item.item_id, Some(order.id)).await {
                Ok(GrantOutcome::Granted) => debug!("🧾️ {} now has access to item {}", order.owner_id, item.item_id),
                Ok(GrantOutcome::AlreadyGranted) => trace!("🧾️ {} already had access to item {}", order.owner_id, item.item_id),
                Err(e) => {
                    error!("🧾️ Granting item {} for order {} failed. {e}", item.item_id, order.order_number());
                    all_granted = false;
                },
            }
        }
        all_granted
    }

    /// Makes sure a completed order's entitlements exist. Returns `true` when they are all in place.
    async fn ensure_entitlements(&self, order: &Order) -> bool {
        if order.entitlements_granted_at.is_some() {
            return true;
        }
        let items = match self.db.fetch_order_items(order.id).await {
            Ok(items) => items,
            Err(e) => {
                error!("🧾️ Could not load the items of order {}. {e}", order.id);
                return false;
            },
        };
        if !self.grant_all(order, &items).await {
            return false;
        }
        match self.db.mark_entitlements_granted(order.id).await {
            Ok(()) => {
                info!("🧾️ Missing entitlements for order {} were granted", order.order_number());
                true
            },
            Err(e) => {
                error!("🧾️ Could not record the entitlement grant for order {}. {e}", order.id);
                false
            },
        }
    }

    async fn record_signal(&self, verdict: &Verdict) {
        if let Err(e) = self.db.log_signal(verdict.to_signal()).await {
            warn!("🧾️ Could not record a {} signal in the audit log. {e}", verdict.channel);
        }
    }

    //------------------------------------------   Fallback   ------------------------------------------------------
    /// Handles the purchaser's return from the payment page.
    ///
    /// The redirect is checked and recorded, but it never decides the outcome by itself. If the order is still
    /// pending, the webhook is given a grace period to arrive, after which the gateway is asked directly and the
    /// answer goes through [`Self::process_signal`].
    pub async fn resolve_redirect(
        &self,
        query: &RedirectQuery,
        owner_id: Option<&str>,
    ) -> Result<RedirectResolution, SettlementError> {
        let verified = verify_mac(&self.hmac_secret, &canonical_redirect_string(query), query.hmac()).map_err(|e| {
            warn!("🔐️ Rejecting redirect for {:?}. {e}", query.merchant_order_id());
            e
        })?;
        let order = match (query.merchant_order_id(), owner_id) {
            (Some(mid), _) => self.db.fetch_order(&mid).await?.ok_or(SettlementError::OrderNotFound(mid))?,
            (None, Some(owner)) => {
                self.db.latest_pending_order_for_owner(owner).await?.ok_or(SettlementError::MissingCorrelationId)?
            },
            (None, None) => return Err(SettlementError::MissingCorrelationId),
        };
        if owner_id.is_some_and(|owner| owner != order.owner_id) {
            warn!("🧾️ {owner_id:?} followed the redirect for an order belonging to {}", order.owner_id);
            return Err(SettlementError::NotOrderOwner);
        }
        let mid = order.merchant_order_id.clone();
        let mut fields = SignalFields::from(query);
        fields.merchant_order_id = Some(mid.clone());
        let raw = serde_json::to_string(query).unwrap_or_default();
        let audit = Verdict::normalize(fields, SignalChannel::Redirect, Some(order.total), verified, raw);
        self.record_signal(&audit).await;

        if !order.is_pending() {
            return Ok(RedirectResolution::new(order, false));
        }
        trace!("🧾️ Order {mid} is still pending. Waiting {:?} for the webhook.", self.options.redirect_grace);
        tokio::time::sleep(self.options.redirect_grace).await;
        let order = self.db.fetch_order(&mid).await?.ok_or_else(|| SettlementError::OrderNotFound(mid.clone()))?;
        if !order.is_pending() {
            return Ok(RedirectResolution::new(order, false));
        }
        debug!("🧾️ No webhook for order {mid} yet. Asking the gateway.");
        match self.inquire_and_settle(&mid).await {
            Ok(outcome) => {
                let order = outcome.order().cloned().unwrap_or(order);
                Ok(RedirectResolution::new(order, true))
            },
            Err(e @ (SettlementError::GatewayRetryable(_) | SettlementError::GatewayUnavailable(_))) => {
                warn!("🧾️ Inquiry for order {mid} failed. Showing the pending state. {e}");
                Ok(RedirectResolution::new(order, false))
            },
            Err(e) => Err(e),
        }
    }

    /// Asks the gateway for the state of the order's transaction, and settles the order with the answer.
    pub async fn inquire_and_settle(&self, mid: &MerchantOrderId) -> Result<SettlementOutcome, SettlementError> {
        let transaction = self.gateway.inquire(mid).await.map_err(|e| {
            warn!("💳️ Inquiry for order {mid} failed. {e}");
            SettlementError::from(e)
        })?;
        let mut fields = SignalFields::from(&transaction);
        match &fields.merchant_order_id {
            Some(echoed) if echoed != mid => {
                error!("💳️ Inquiry for order {mid} returned a transaction for order {echoed}. Ignoring it.");
                return Err(SettlementError::OrderNotFound(mid.clone()));
            },
            Some(_) => {},
            None => fields.merchant_order_id = Some(mid.clone()),
        }
        let raw = serde_json::to_string(&transaction).unwrap_or_default();
        self.process_signal(fields, SignalChannel::Inquiry, true, raw).await
    }

    //------------------------------------------ Reconciliation ----------------------------------------------------
    /// One reconciliation pass. Grants entitlements that completed orders are missing, and asks the gateway about
    /// pending orders that have been quiet for longer than the configured age.
    pub async fn reconcile(&self) -> Result<ReconciliationReport, SettlementError> {
        let mut report = ReconciliationReport::default();
        for order in self.db.orders_missing_entitlements().await? {
            if self.ensure_entitlements(&order).await {
                report.regranted += 1;
            } else {
                report.errors += 1;
            }
        }
        let age = chrono::Duration::from_std(self.options.stale_pending_age).unwrap_or_else(|_| chrono::Duration::minutes(15));
        for order in self.db.stale_pending_orders(age).await? {
            report.inquired += 1;
            match self.inquire_and_settle(&order.merchant_order_id).await {
                Ok(outcome) if outcome.status().is_some_and(|s| s != OrderStatusType::Pending) => report.settled += 1,
                Ok(_) => trace!("🧾️ Order {} is still pending at the gateway", order.merchant_order_id),
                Err(e) => {
                    warn!("🧾️ Reconciliation of order {} failed. {e}", order.merchant_order_id);
                    report.errors += 1;
                },
            }
        }
        if report != ReconciliationReport::default() {
            info!("🧾️ Reconciliation pass complete: {report:?}");
        }
        Ok(report)
    }

    //------------------------------------------    Queries   ------------------------------------------------------
    /// Fetches an order and its items on behalf of `owner_id`. Orders of other owners are reported as missing.
    pub async fn order_for_owner(&self, mid: &MerchantOrderId, owner_id: &str) -> Result<OrderWithItems, SettlementError> {
        let order = self
            .db
            .fetch_order(mid)
            .await?
            .filter(|o| o.owner_id == owner_id)
            .ok_or_else(|| SettlementError::OrderNotFound(mid.clone()))?;
        let items = self.db.fetch_order_items(order.id).await?;
        Ok(OrderWithItems::new(order, items))
    }

    pub async fn orders_for_owner(&self, owner_id: &str) -> Result<Vec<Order>, SettlementError> {
        let orders = self.db.search_orders(OrderQueryFilter::default().with_owner_id(owner_id)).await?;
        Ok(orders)
    }

    pub async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, SettlementError> {
        let orders = self.db.search_orders(query).await?;
        Ok(orders)
    }

    pub async fn signals_for_order(&self, mid: &MerchantOrderId) -> Result<Vec<SettlementSignal>, SettlementError> {
        let signals = self.db.fetch_signals(mid).await?;
        Ok(signals)
    }
}
