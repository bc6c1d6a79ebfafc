//! The three shapes in which the payment gateway tells us about a transaction, and the flat [`SignalFields`] view
//! that normalization works from.
use std::collections::BTreeMap;

use lms_common::Money;
use serde::{Deserialize, Serialize};

use crate::db_types::MerchantOrderId;

/// Gateway payloads are loose about types: booleans and numbers regularly arrive as strings.
mod lenient {
    use lms_common::Money;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn opt_string<'de, D>(d: D) -> Result<Option<String>, D::Error>
    where D: Deserializer<'de> {
        let v = Option::<Value>::deserialize(d)?;
        Ok(match v {
            Some(Value::String(s)) => Some(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(Value::Bool(b)) => Some(b.to_string()),
            _ => None,
        })
    }

    pub fn opt_bool<'de, D>(d: D) -> Result<Option<bool>, D::Error>
    where D: Deserializer<'de> {
        let v = Option::<Value>::deserialize(d)?;
        Ok(match v {
            Some(Value::Bool(b)) => Some(b),
            Some(Value::String(s)) => super::parse_bool(&s),
            Some(Value::Number(n)) => n.as_i64().map(|n| n != 0),
            _ => None,
        })
    }

    pub fn opt_money<'de, D>(d: D) -> Result<Option<Money>, D::Error>
    where D: Deserializer<'de> {
        let v = Option::<Value>::deserialize(d)?;
        Ok(match v {
            Some(Value::Number(n)) => n.as_i64().map(Money::from),
            Some(Value::String(s)) => Money::try_from(s.as_str()).ok(),
            _ => None,
        })
    }
}

pub(crate) fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

//--------------------------------------  TransactionObject   ---------------------------------------------------------
/// A gateway transaction, as delivered in the webhook `obj` field and returned by the status inquiry API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionObject {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_bool")]
    pub success: Option<bool>,
    #[serde(default, deserialize_with = "lenient::opt_bool")]
    pub pending: Option<bool>,
    #[serde(default, deserialize_with = "lenient::opt_bool")]
    pub error_occured: Option<bool>,
    #[serde(default, deserialize_with = "lenient::opt_bool")]
    pub is_voided: Option<bool>,
    #[serde(default, deserialize_with = "lenient::opt_bool")]
    pub is_refunded: Option<bool>,
    #[serde(default, deserialize_with = "lenient::opt_bool")]
    pub is_3d_secure: Option<bool>,
    #[serde(default, deserialize_with = "lenient::opt_bool")]
    pub is_auth: Option<bool>,
    #[serde(default, deserialize_with = "lenient::opt_bool")]
    pub is_capture: Option<bool>,
    #[serde(default, deserialize_with = "lenient::opt_bool")]
    pub is_standalone_payment: Option<bool>,
    #[serde(default, deserialize_with = "lenient::opt_bool")]
    pub has_parent_transaction: Option<bool>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub integration_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub owner: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_money")]
    pub amount_cents: Option<Money>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub created_at: Option<String>,
    #[serde(default)]
    pub order: Option<GatewayOrder>,
    #[serde(default)]
    pub data: Option<TransactionData>,
    #[serde(default)]
    pub source_data: Option<SourceData>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayOrder {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub merchant_order_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_money")]
    pub amount_cents: Option<Money>,
    #[serde(default, deserialize_with = "lenient::opt_money")]
    pub paid_amount_cents: Option<Money>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionData {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub txn_response_code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceData {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub pan: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub sub_type: Option<String>,
    #[serde(rename = "type", default, deserialize_with = "lenient::opt_string")]
    pub kind: Option<String>,
}

impl TransactionObject {
    pub fn merchant_order_id(&self) -> Option<&str> {
        self.order.as_ref().and_then(|o| o.merchant_order_id.as_deref())
    }
}

//--------------------------------------    WebhookPayload     ---------------------------------------------------------
/// The JSON body of a webhook call. The MAC travels separately, in the `hmac` query parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookPayload {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub obj: TransactionObject,
}

impl WebhookPayload {
    pub fn is_transaction(&self) -> bool {
        self.kind.eq_ignore_ascii_case("TRANSACTION")
    }
}

//--------------------------------------     RedirectQuery     ---------------------------------------------------------
/// The flat query string the gateway appends to the browser redirect. Every value is a string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RedirectQuery(pub BTreeMap<String, String>);

impl RedirectQuery {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str).filter(|s| !s.is_empty())
    }

    pub fn flag(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(parse_bool)
    }

    pub fn money(&self, key: &str) -> Option<Money> {
        self.get(key).and_then(|s| Money::try_from(s).ok())
    }

    pub fn hmac(&self) -> Option<&str> {
        self.get("hmac")
    }

    pub fn merchant_order_id(&self) -> Option<MerchantOrderId> {
        self.get("merchant_order_id").and_then(|s| s.parse().ok())
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.0.insert(key.to_string(), value.to_string());
        self
    }
}

//--------------------------------------     SignalFields      ---------------------------------------------------------
/// The fields normalization looks at, extracted from any of the three signal shapes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalFields {
    pub merchant_order_id: Option<MerchantOrderId>,
    pub transaction_id: Option<String>,
    pub gateway_order_id: Option<String>,
    pub success: Option<bool>,
    pub pending: Option<bool>,
    pub error_occured: Option<bool>,
    pub is_voided: Option<bool>,
    pub is_refunded: Option<bool>,
    pub status: Option<String>,
    pub txn_response_code: Option<String>,
    pub message: Option<String>,
    pub amount: Option<Money>,
    pub paid_amount: Option<Money>,
}

impl SignalFields {
    /// Any flag that marks the transaction as failed. Failure flags are sticky: nothing else in the same signal can
    /// turn it into a success.
    pub fn has_failure_flag(&self) -> bool {
        [self.error_occured, self.is_voided, self.is_refunded].iter().any(|f| *f == Some(true))
    }
}

impl From<&TransactionObject> for SignalFields {
    fn from(obj: &TransactionObject) -> Self {
        let order = obj.order.clone().unwrap_or_default();
        let data = obj.data.clone().unwrap_or_default();
        Self {
            merchant_order_id: order.merchant_order_id.and_then(|s| s.parse().ok()),
            transaction_id: obj.id.clone(),
            gateway_order_id: order.id,
            success: obj.success,
            pending: obj.pending,
            error_occured: obj.error_occured,
            is_voided: obj.is_voided,
            is_refunded: obj.is_refunded,
            status: obj.status.clone(),
            txn_response_code: data.txn_response_code,
            message: data.message,
            amount: obj.amount_cents.or(order.amount_cents),
            paid_amount: order.paid_amount_cents,
        }
    }
}

impl From<&RedirectQuery> for SignalFields {
    fn from(q: &RedirectQuery) -> Self {
        Self {
            merchant_order_id: q.merchant_order_id(),
            transaction_id: q.get("id").map(String::from),
            gateway_order_id: q.get("order").map(String::from),
            success: q.flag("success"),
            pending: q.flag("pending"),
            error_occured: q.flag("error_occured"),
            is_voided: q.flag("is_voided"),
            is_refunded: q.flag("is_refunded"),
            status: q.get("status").map(String::from),
            txn_response_code: q.get("txn_response_code").map(String::from),
            message: q.get("data.message").map(String::from),
            amount: q.money("amount_cents"),
            paid_amount: q.money("paid_amount_cents"),
        }
    }
}
