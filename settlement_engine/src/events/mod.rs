mod channel;
mod event_types;
mod hooks;
mod notifier;

pub use channel::{EventChannelClosed, EventHandler, EventProducer, Handler};
pub use event_types::*;
pub use hooks::{EventHandlers, EventHooks, EventProducers};
pub use notifier::{NotificationError, ReceiptNotifier};
