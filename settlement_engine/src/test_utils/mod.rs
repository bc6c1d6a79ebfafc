//! Helpers for tests that need a real database or a payment gateway. Enabled by the `test_utils` feature.
pub mod prepare_env;
mod stub_gateway;

pub use stub_gateway::{failed_transaction, pending_transaction, successful_transaction, webhook, StubGateway};
