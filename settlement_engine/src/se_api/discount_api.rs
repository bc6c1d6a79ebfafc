use std::fmt::Debug;

use chrono::Utc;
use lms_common::Money;
use log::*;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    db_types::normalize_code,
    se_api::{
        cart_api::CartApi,
        cart_objects::ValidatedCart,
        errors::{DiscountError, DiscountRejection},
    },
    traits::{CartStore, CatalogManagement, DiscountManagement, EntitlementGranter},
};

static CODE_FORMAT: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[A-Z0-9][A-Z0-9_-]{1,31}$").ok());

/// The result of a successful discount evaluation, priced against a freshly revalued cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountQuote {
    pub code: String,
    pub amount: Money,
    pub subtotal: Money,
    pub total: Money,
}

/// `DiscountApi` decides whether a discount code applies to a cart, and manages the code stored with the owner's
/// session. Only the code is ever stored; the amount is recomputed each time from the server-side subtotal.
pub struct DiscountApi<B> {
    db: B,
}

impl<B> Debug for DiscountApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DiscountApi")
    }
}

impl<B> DiscountApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> DiscountApi<B>
where B: DiscountManagement
{
    /// Evaluates `code` for `owner_id` against a revalued cart.
    ///
    /// Checks run in a fixed order: existence, activity, validity window, global usage cap, per-owner usage cap,
    /// first-purchase restriction, minimum subtotal, empty cart, and finally that the amount fits inside the
    /// subtotal. The first failing check decides the rejection.
    pub async fn evaluate(&self, code: &str, owner_id: &str, cart: &ValidatedCart) -> Result<DiscountQuote, DiscountError> {
        let code = normalize_code(code);
        let well_formed = CODE_FORMAT.as_ref().map_or(true, |re| re.is_match(&code));
        if !well_formed {
            debug!("🏷️ Discount code '{code}' is malformed");
            return Err(DiscountRejection::NotFound.into());
        }
        let discount = self.db.fetch_discount(&code).await?.ok_or(DiscountRejection::NotFound)?;
        if !discount.active {
            return Err(DiscountRejection::Inactive.into());
        }
        let now = Utc::now();
        if now < discount.starts_at {
            return Err(DiscountRejection::NotYetValid.into());
        }
        if discount.ends_at.is_some_and(|end| now > end) {
            return Err(DiscountRejection::Expired.into());
        }
        if let Some(max_uses) = discount.max_uses {
            if self.db.reservation_count(&code).await? >= max_uses {
                return Err(DiscountRejection::UsageLimitReached.into());
            }
        }
        if discount.max_uses_per_user > 0 &&
            self.db.reservation_count_for_owner(&code, owner_id).await? >= discount.max_uses_per_user
        {
            return Err(DiscountRejection::AlreadyUsed.into());
        }
        if discount.first_purchase_only && self.db.completed_order_count(owner_id).await? > 0 {
            return Err(DiscountRejection::NotFirstPurchase.into());
        }
        let subtotal = cart.total;
        if let Some(minimum) = discount.min_subtotal {
            if subtotal < minimum {
                return Err(DiscountRejection::BelowMinimumSubtotal { minimum }.into());
            }
        }
        if cart.is_empty() {
            return Err(DiscountRejection::EmptyCart.into());
        }
        let amount = discount.amount_for(subtotal);
        if amount > subtotal {
            return Err(DiscountRejection::ExceedsSubtotal { amount, subtotal }.into());
        }
        let total = subtotal - amount;
        if total.is_negative() {
            return Err(DiscountRejection::NegativeTotal.into());
        }
        debug!("🏷️ Discount {code} is worth {amount} on a subtotal of {subtotal} for {owner_id}");
        Ok(DiscountQuote { code, amount, subtotal, total })
    }
}

impl<B> DiscountApi<B>
where B: DiscountManagement + CartStore + CatalogManagement + EntitlementGranter + Clone
{
    /// Evaluates `code` against the owner's revalued session cart, and stores the code if it is accepted.
    pub async fn apply_to_session(&self, code: &str, owner_id: &str) -> Result<DiscountQuote, DiscountError> {
        let cart = CartApi::new(self.db.clone()).revalue_session_cart(owner_id).await?;
        let quote = self.evaluate(code, owner_id, &cart).await.map_err(|e| {
            info!("🏷️ Discount code '{code}' rejected for {owner_id}. {e}");
            e
        })?;
        self.db.set_applied_discount(owner_id, &quote.code).await?;
        info!("🏷️ Discount {} applied to the cart of {owner_id}", quote.code);
        Ok(quote)
    }

    pub async fn remove_from_session(&self, owner_id: &str) -> Result<(), DiscountError> {
        self.db.clear_applied_discount(owner_id).await?;
        debug!("🏷️ Discount removed from the cart of {owner_id}");
        Ok(())
    }

    /// Re-derives the quote for the code stored with the owner's session, if there is one.
    pub async fn quote_for_session(&self, owner_id: &str, cart: &ValidatedCart) -> Result<Option<DiscountQuote>, DiscountError> {
        match self.db.applied_discount(owner_id).await? {
            Some(code) => self.evaluate(&code, owner_id, cart).await.map(Some),
            None => Ok(None),
        }
    }
}
