//! Course Purchase Settlement Engine
//!
//! The settlement engine turns a purchaser's cart into a paid order and course access. It prices carts on the server,
//! applies discount codes, opens payment sessions with the payment gateway, and settles orders from the gateway's
//! signals exactly once, however many times and through however many channels those signals arrive.
//!
//! The library is divided into these sections:
//! 1. Storage ([`traits`]). The backend contracts, plus a SQLite implementation ([`SqliteDatabase`]). You should not
//!    need to touch the database directly. The data types stored in it live in [`db_types`] and are public.
//! 2. The gateway adapter ([`gateway`]). Payload shapes, MAC verification and signal normalization, plus the
//!    [`gateway::PaymentGateway`] contract for outbound calls.
//! 3. The public API: [`CartApi`], [`DiscountApi`] and [`SettlementApi`].
//!
//! The engine also emits events when orders complete or fail, and when a receipt should be sent. A small actor
//! framework in [`events`] lets the server hook into them.
mod db;
mod se_api;

pub mod db_types;
pub mod events;
pub mod gateway;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use db::sqlite::SqliteDatabase;
pub use db::traits;
pub use se_api::{
    cart_api::CartApi,
    cart_objects,
    discount_api::{DiscountApi, DiscountQuote},
    errors::{CartApiError, DiscountError, DiscountRejection, SettlementError},
    order_objects,
    settlement_api::SettlementApi,
    settlement_objects,
    settlement_objects::{SettlementOptions, SettlementOutcome},
};
