//! Receipt delivery.
//!
//! The settlement engine emits a [`ReceiptEvent`] once per completed order. The hook registered here POSTs it as JSON
//! to `LMS_RECEIPT_WEBHOOK_URL` (typically the mailer service), or just logs it when no URL is configured. Delivery
//! failures are logged and never touch the order.
use std::{sync::Arc, time::Duration};

use log::*;
use reqwest::Client;
use serde::Serialize;
use settlement_engine::{
    db_types::Money,
    events::{EventHandlers, EventHooks, ReceiptEvent},
};

pub const RECEIPT_EVENT_BUFFER_SIZE: usize = 25;
const RECEIPT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Serialize)]
pub struct ReceiptLine {
    pub item_id: i64,
    pub title: String,
    pub price: Money,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReceiptMessage {
    pub owner_id: String,
    pub order_number: String,
    pub merchant_order_id: String,
    pub currency: String,
    pub subtotal: Money,
    pub discount_code: Option<String>,
    pub discount: Money,
    pub total: Money,
    pub lines: Vec<ReceiptLine>,
}

impl From<&ReceiptEvent> for ReceiptMessage {
    fn from(ev: &ReceiptEvent) -> Self {
        Self {
            owner_id: ev.owner_id.clone(),
            order_number: ev.order_number.clone(),
            merchant_order_id: ev.order.merchant_order_id.to_string(),
            currency: ev.order.currency.clone(),
            subtotal: ev.order.subtotal,
            discount_code: ev.order.discount_code.clone(),
            discount: ev.order.discount_amount,
            total: ev.order.total,
            lines: ev
                .items
                .iter()
                .map(|i| ReceiptLine { item_id: i.item_id, title: i.title.clone(), price: i.final_price })
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReceiptDispatcher {
    url: Option<String>,
    client: Arc<Client>,
}

impl ReceiptDispatcher {
    pub fn new(url: Option<String>) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(RECEIPT_TIMEOUT).build()?;
        Ok(Self { url, client: Arc::new(client) })
    }

    pub async fn deliver(&self, message: ReceiptMessage) {
        let Some(url) = &self.url else {
            info!(
                "📬️ Receipt for order {} ({} {}) to {}: {} line(s). No receipt URL is configured, so it was not sent.",
                message.order_number,
                message.total,
                message.currency,
                message.owner_id,
                message.lines.len()
            );
            return;
        };
        match self.client.post(url).json(&message).send().await {
            Ok(res) if res.status().is_success() => {
                info!("📬️ Receipt for order {} delivered to {}", message.order_number, message.owner_id);
            },
            Ok(res) => {
                error!("📬️ Receipt for order {} was refused. Status {}", message.order_number, res.status());
            },
            Err(e) => error!("📬️ Receipt for order {} could not be delivered. {e}", message.order_number),
        }
    }
}

/// Registers the receipt hook. The returned handlers still need to be started.
pub fn create_receipt_event_handlers(dispatcher: ReceiptDispatcher) -> EventHandlers {
    let mut hooks = EventHooks::default();
    hooks.on_receipt(move |ev| {
        let message = ReceiptMessage::from(&ev);
        let dispatcher = dispatcher.clone();
        Box::pin(async move { dispatcher.deliver(message).await })
    });
    hooks.on_order_failed(|ev| {
        info!("📬️ Order {} failed: {}", ev.order.order_number(), ev.reason);
        Box::pin(async {})
    });
    EventHandlers::new(RECEIPT_EVENT_BUFFER_SIZE, hooks)
}

#[cfg(test)]
mod test {
    use chrono::Utc;
    use settlement_engine::db_types::{MerchantOrderId, Order, OrderItem, OrderStatusType};

    use super::*;

    #[test]
    fn receipt_message_from_event() {
        let now = Utc::now();
        let order = Order {
            id: 7,
            merchant_order_id: MerchantOrderId::from("lms-7".to_string()),
            owner_id: "alice".into(),
            status: OrderStatusType::Completed,
            subtotal: Money::from(500),
            discount_code: Some("TENOFF".into()),
            discount_amount: Money::from(50),
            total: Money::from(450),
            currency: "EGP".into(),
            gateway_transaction_id: Some("9001".into()),
            gateway_order_id: Some("4242".into()),
            payment_url: None,
            gateway_response: None,
            failure_reason: None,
            notification_sent: true,
            entitlements_granted_at: Some(now),
            created_at: now,
            updated_at: now,
            completed_at: Some(now),
        };
        let item = OrderItem {
            id: 1,
            order_id: 7,
            item_id: 3,
            title: "Rust 101".into(),
            original_price: Money::from(500),
            final_price: Money::from(500),
            commission: Money::from(100),
            instructor_share: Money::from(400),
        };
        let ev = ReceiptEvent { owner_id: "alice".into(), order_number: order.order_number(), order, items: vec![item] };
        let msg = ReceiptMessage::from(&ev);
        assert_eq!(msg.merchant_order_id, "lms-7");
        assert_eq!(msg.total, Money::from(450));
        assert_eq!(msg.discount, Money::from(50));
        assert_eq!(msg.lines.len(), 1);
        assert_eq!(msg.lines[0].title, "Rust 101");
    }
}
