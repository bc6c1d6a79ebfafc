use serde::{Deserialize, Serialize};
use settlement_engine::gateway::{BillingDetails, SessionItem, SessionRequest};

/// The gateway wants every billing field present, so missing optional ones are sent as "NA".
const NOT_APPLICABLE: &str = "NA";

#[derive(Debug, Clone, Serialize)]
pub struct AuthRequest {
    pub api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderItem {
    pub name: String,
    pub amount_cents: i64,
    pub quantity: u32,
}

impl From<&SessionItem> for OrderItem {
    fn from(item: &SessionItem) -> Self {
        Self { name: item.name.clone(), amount_cents: item.amount.value(), quantity: item.quantity }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderRegistration {
    pub auth_token: String,
    pub delivery_needed: bool,
    pub amount_cents: i64,
    pub currency: String,
    pub merchant_order_id: String,
    pub items: Vec<OrderItem>,
}

impl OrderRegistration {
    pub fn new(auth_token: &str, request: &SessionRequest) -> Self {
        Self {
            auth_token: auth_token.to_string(),
            delivery_needed: false,
            amount_cents: request.amount.value(),
            currency: request.currency.clone(),
            merchant_order_id: request.merchant_order_id.to_string(),
            items: request.items.iter().map(OrderItem::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisteredOrder {
    pub id: u64,
    #[serde(default)]
    pub merchant_order_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BillingData {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
    pub city: String,
    pub country: String,
    pub street: String,
    pub building: String,
    pub floor: String,
    pub apartment: String,
    pub postal_code: String,
    pub state: String,
}

impl From<&BillingDetails> for BillingData {
    fn from(b: &BillingDetails) -> Self {
        let or_na = |v: &Option<String>| v.clone().filter(|s| !s.trim().is_empty()).unwrap_or_else(|| NOT_APPLICABLE.into());
        Self {
            first_name: b.first_name.clone(),
            last_name: b.last_name.clone(),
            email: b.email.clone(),
            phone_number: b.phone_number.clone(),
            city: or_na(&b.city),
            country: or_na(&b.country),
            street: NOT_APPLICABLE.into(),
            building: NOT_APPLICABLE.into(),
            floor: NOT_APPLICABLE.into(),
            apartment: NOT_APPLICABLE.into(),
            postal_code: NOT_APPLICABLE.into(),
            state: NOT_APPLICABLE.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentKeyRequest {
    pub auth_token: String,
    pub amount_cents: i64,
    pub expiration: u64,
    pub order_id: u64,
    pub billing_data: BillingData,
    pub currency: String,
    pub integration_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirection_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct InquiryRequest {
    pub auth_token: String,
    pub merchant_order_id: String,
}
