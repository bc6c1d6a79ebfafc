use std::{future::Future, pin::Pin, sync::Arc};

use log::*;

use crate::{
    db_types::{Order, OrderItem},
    events::{
        EventHandler,
        EventProducer,
        Handler,
        NotificationError,
        OrderCompletedEvent,
        OrderFailedEvent,
        ReceiptEvent,
        ReceiptNotifier,
    },
};

type BoxedHandlerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_completed_producer: Vec<EventProducer<OrderCompletedEvent>>,
    pub order_failed_producer: Vec<EventProducer<OrderFailedEvent>>,
    pub receipt_producer: Vec<EventProducer<ReceiptEvent>>,
}

impl EventProducers {
    pub async fn publish_order_completed(&self, event: OrderCompletedEvent) {
        for emitter in &self.order_completed_producer {
            debug!("📬️ Notifying order completed hook subscribers");
            emitter.publish_event(event.clone()).await;
        }
    }

    pub async fn publish_order_failed(&self, event: OrderFailedEvent) {
        for emitter in &self.order_failed_producer {
            debug!("📬️ Notifying order failed hook subscribers");
            emitter.publish_event(event.clone()).await;
        }
    }
}

impl ReceiptNotifier for EventProducers {
    async fn send_receipt(&self, owner_id: &str, order: &Order, items: &[OrderItem]) -> Result<(), NotificationError> {
        let event = ReceiptEvent {
            owner_id: owner_id.to_string(),
            order_number: order.order_number(),
            order: order.clone(),
            items: items.to_vec(),
        };
        if self.receipt_producer.is_empty() {
            trace!("📬️ No receipt subscribers are registered. Receipt for {} not sent.", event.order_number);
            return Ok(());
        }
        for emitter in &self.receipt_producer {
            emitter.try_publish_event(event.clone()).await.map_err(|e| NotificationError::Undeliverable(e.to_string()))?;
        }
        debug!("📬️ Receipt for {} handed to {} subscriber(s)", event.order_number, self.receipt_producer.len());
        Ok(())
    }
}

pub struct EventHandlers {
    pub on_order_completed: Option<EventHandler<OrderCompletedEvent>>,
    pub on_order_failed: Option<EventHandler<OrderFailedEvent>>,
    pub on_receipt: Option<EventHandler<ReceiptEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_order_completed = hooks.on_order_completed.map(|f| EventHandler::new(buffer_size, f));
        let on_order_failed = hooks.on_order_failed.map(|f| EventHandler::new(buffer_size, f));
        let on_receipt = hooks.on_receipt.map(|f| EventHandler::new(buffer_size, f));
        Self { on_order_completed, on_order_failed, on_receipt }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_order_completed {
            result.order_completed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_failed {
            result.order_failed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_receipt {
            result.receipt_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_order_completed {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_order_failed {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_receipt {
            tokio::spawn(handler.start_handler());
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_completed: Option<Handler<OrderCompletedEvent>>,
    pub on_order_failed: Option<Handler<OrderFailedEvent>>,
    pub on_receipt: Option<Handler<ReceiptEvent>>,
}

impl EventHooks {
    pub fn on_order_completed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderCompletedEvent) -> BoxedHandlerFuture) + Send + Sync + 'static {
        self.on_order_completed = Some(Arc::new(f));
        self
    }

    pub fn on_order_failed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderFailedEvent) -> BoxedHandlerFuture) + Send + Sync + 'static {
        self.on_order_failed = Some(Arc::new(f));
        self
    }

    pub fn on_receipt<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(ReceiptEvent) -> BoxedHandlerFuture) + Send + Sync + 'static {
        self.on_receipt = Some(Arc::new(f));
        self
    }
}
