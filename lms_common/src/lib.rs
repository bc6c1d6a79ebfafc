mod money;

pub mod helpers;
pub mod op;
pub mod retry;
mod secret;

pub use money::{Money, MoneyConversionError, DEFAULT_CURRENCY_CODE};
pub use secret::Secret;
