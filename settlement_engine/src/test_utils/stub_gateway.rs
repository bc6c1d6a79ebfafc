use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use lms_common::Money;

use crate::{
    db_types::MerchantOrderId,
    gateway::{
        GatewayError,
        GatewayOrder,
        PaymentGateway,
        PaymentSession,
        SessionRequest,
        TransactionData,
        TransactionObject,
        WebhookPayload,
    },
};

#[derive(Debug, Default)]
struct StubState {
    session_error: Option<GatewayError>,
    inquiries: HashMap<MerchantOrderId, Result<TransactionObject, GatewayError>>,
    sessions: Vec<SessionRequest>,
    inquiry_count: usize,
}

/// An in-memory payment gateway. Sessions succeed unless told otherwise, and inquiries answer with whatever was
/// registered for the order (a pending transaction by default).
#[derive(Debug, Clone, Default)]
pub struct StubGateway {
    state: Arc<Mutex<StubState>>,
}

impl StubGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_sessions_with(&self, error: GatewayError) {
        self.state.lock().unwrap().session_error = Some(error);
    }

    pub fn restore_sessions(&self) {
        self.state.lock().unwrap().session_error = None;
    }

    pub fn answer_inquiry(&self, mid: &MerchantOrderId, response: Result<TransactionObject, GatewayError>) {
        self.state.lock().unwrap().inquiries.insert(mid.clone(), response);
    }

    pub fn sessions(&self) -> Vec<SessionRequest> {
        self.state.lock().unwrap().sessions.clone()
    }

    pub fn inquiry_count(&self) -> usize {
        self.state.lock().unwrap().inquiry_count
    }
}

impl PaymentGateway for StubGateway {
    async fn create_session(&self, request: SessionRequest) -> Result<PaymentSession, GatewayError> {
        let mut state = self.state.lock().unwrap();
        if let Some(e) = state.session_error.clone() {
            return Err(e);
        }
        let n = state.sessions.len() + 1;
        state.sessions.push(request);
        Ok(PaymentSession {
            gateway_order_id: format!("gw-{n}"),
            payment_url: format!("https://pay.example.test/iframe?token=tok-{n}"),
        })
    }

    async fn inquire(&self, merchant_order_id: &MerchantOrderId) -> Result<TransactionObject, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.inquiry_count += 1;
        state
            .inquiries
            .get(merchant_order_id)
            .cloned()
            .unwrap_or_else(|| Ok(pending_transaction(merchant_order_id, Money::zero())))
    }
}

fn transaction(mid: &MerchantOrderId, amount: Money) -> TransactionObject {
    TransactionObject {
        id: Some(format!("txn-{}", rand::random::<u32>())),
        amount_cents: Some(amount),
        currency: Some("EGP".into()),
        order: Some(GatewayOrder {
            id: Some(format!("gw-order-{}", mid.as_str())),
            merchant_order_id: Some(mid.to_string()),
            amount_cents: Some(amount),
            paid_amount_cents: None,
        }),
        ..Default::default()
    }
}

pub fn successful_transaction(mid: &MerchantOrderId, amount: Money) -> TransactionObject {
    TransactionObject {
        success: Some(true),
        pending: Some(false),
        error_occured: Some(false),
        is_voided: Some(false),
        is_refunded: Some(false),
        ..transaction(mid, amount)
    }
}

/// A declined transaction. The gateway puts the decline reason in `data.message`.
pub fn failed_transaction(mid: &MerchantOrderId, amount: Money, message: &str) -> TransactionObject {
    TransactionObject {
        success: Some(false),
        pending: Some(false),
        data: Some(TransactionData { message: Some(message.to_string()), txn_response_code: None }),
        ..transaction(mid, amount)
    }
}

pub fn pending_transaction(mid: &MerchantOrderId, amount: Money) -> TransactionObject {
    TransactionObject { success: Some(false), pending: Some(true), ..transaction(mid, amount) }
}

pub fn webhook(obj: TransactionObject) -> WebhookPayload {
    WebhookPayload { kind: "TRANSACTION".into(), obj }
}
