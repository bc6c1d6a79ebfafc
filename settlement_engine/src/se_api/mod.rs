//! # Settlement engine public API
//!
//! The `se_api` module exposes the programmatic API of the settlement engine. Each API is created by supplying a
//! backend that implements the storage traits it needs, so the same logic runs against SQLite in production and
//! whatever the tests care to provide.
//!
//! * [`cart_api`] revalues carts against the catalog. It is the only source of prices.
//! * [`discount_api`] evaluates discount codes against a revalued cart and manages the code applied to a session.
//! * [`settlement_api`] is the settlement coordinator: checkout, the webhook/redirect/inquiry pipeline, the guarded
//!   order transitions and their side effects, and reconciliation.
//!
//! ```rust,ignore
//! use settlement_engine::{SettlementApi, SettlementOptions, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url(&url, 5).await?;
//! let api = SettlementApi::new(db, gateway, producers, SettlementOptions::default());
//! let outcome = api.process_webhook(&payload, Some(&mac)).await?;
//! ```
pub mod cart_api;
pub mod cart_objects;
pub mod discount_api;
pub mod errors;
pub mod order_objects;
pub mod settlement_api;
pub mod settlement_objects;
