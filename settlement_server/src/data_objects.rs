use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use settlement_engine::{
    cart_objects::ValidatedCart,
    db_types::{MerchantOrderId, OrderStatusType},
    order_objects::OrderQueryFilter,
    settlement_objects::SettlementOutcome,
    DiscountQuote,
    DiscountRejection,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddItemRequest {
    pub item_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyDiscountRequest {
    pub code: String,
}

/// The cart as the purchaser sees it: revalued lines plus the quote for the applied code, if any.
#[derive(Debug, Clone, Serialize)]
pub struct CartResponse {
    pub cart: ValidatedCart,
    pub discount: Option<DiscountQuote>,
    /// Set when the stored code no longer applies to the revalued cart. Checkout will refuse it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_rejection: Option<DiscountRejection>,
}

/// The gateway puts its MAC in the query string of webhook calls.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookParams {
    pub hmac: Option<String>,
}

/// What the webhook endpoint tells the gateway. Any 200 stops its retries.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<SettlementOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl WebhookAck {
    pub fn settled(outcome: SettlementOutcome) -> Self {
        Self { received: true, outcome: Some(outcome), note: None }
    }

    pub fn noted<S: Display>(note: S) -> Self {
        Self { received: true, outcome: None, note: Some(note.to_string()) }
    }
}

/// Query string for the admin order search. `status` is a comma-separated list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderSearchParams {
    pub owner_id: Option<String>,
    pub merchant_order_id: Option<String>,
    pub discount_code: Option<String>,
    pub currency: Option<String>,
    pub status: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl TryFrom<OrderSearchParams> for OrderQueryFilter {
    type Error = String;

    fn try_from(params: OrderSearchParams) -> Result<Self, Self::Error> {
        let mut query = OrderQueryFilter::default();
        if let Some(owner_id) = params.owner_id {
            query = query.with_owner_id(&owner_id);
        }
        if let Some(mid) = params.merchant_order_id {
            let mid = mid.parse::<MerchantOrderId>().map_err(|e| e.to_string())?;
            query = query.with_merchant_order_id(mid);
        }
        if let Some(code) = params.discount_code {
            query = query.with_discount_code(&code);
        }
        if let Some(currency) = params.currency {
            query = query.with_currency(&currency);
        }
        if let Some(statuses) = params.status {
            for s in statuses.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                let status = s.parse::<OrderStatusType>().map_err(|e| e.to_string())?;
                query = query.with_status(status);
            }
        }
        if let Some(since) = params.since {
            query = query.with_since(since);
        }
        if let Some(until) = params.until {
            query = query.with_until(until);
        }
        Ok(query)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn search_params_to_filter() {
        let params = OrderSearchParams {
            owner_id: Some("alice".into()),
            status: Some("Pending, Failed".into()),
            discount_code: Some(" tenoff ".into()),
            ..Default::default()
        };
        let query = OrderQueryFilter::try_from(params).unwrap();
        assert_eq!(query.owner_id.as_deref(), Some("alice"));
        assert_eq!(query.status, Some(vec![OrderStatusType::Pending, OrderStatusType::Failed]));
        assert_eq!(query.discount_code.as_deref(), Some("TENOFF"));
    }

    #[test]
    fn bad_status_is_an_error() {
        let params = OrderSearchParams { status: Some("Paid".into()), ..Default::default() };
        assert!(OrderQueryFilter::try_from(params).is_err());
    }
}
