use std::sync::Arc;

use lms_common::retry::{retry_with_backoff, RetryPolicy};
use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
    Method,
};
use serde::{de::DeserializeOwned, Serialize};
use settlement_engine::{
    db_types::MerchantOrderId,
    gateway::{GatewayError, PaymentGateway, PaymentSession, SessionRequest, TransactionObject},
};

use crate::{
    config::{PaygateConfig, PAYMENT_KEY_EXPIRY},
    data_objects::{
        AuthRequest,
        AuthResponse,
        BillingData,
        InquiryRequest,
        OrderRegistration,
        PaymentKeyRequest,
        RegisteredOrder,
        TokenResponse,
    },
    PaygateApiError,
};

#[derive(Clone)]
pub struct PaygateApi {
    config: PaygateConfig,
    client: Arc<Client>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for PaygateApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaygateApi ({})", self.config.base_url)
    }
}

impl PaygateApi {
    pub fn new(config: PaygateConfig) -> Result<Self, PaygateApiError> {
        let mut headers = HeaderMap::with_capacity(2);
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        headers.insert("Accept", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| PaygateApiError::Initialization(e.to_string()))?;
        let retry = RetryPolicy::new(config.max_retries);
        Ok(Self { config, client: Arc::new(client), retry })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &PaygateConfig {
        &self.config
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/api{path}", self.config.base_url)
    }

    pub fn iframe_url(&self, payment_token: &str) -> String {
        self.url(&format!("/acceptance/iframes/{}?payment_token={payment_token}", self.config.iframe_id))
    }

    /// Sends a single request. No retries.
    pub async fn rest_query<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, PaygateApiError> {
        let url = self.url(path);
        trace!("💳️ Sending REST query: {method} {url}");
        let mut req = self.client.request(method, url);
        if let Some(body) = body {
            req = req.json(body);
        }
        let response = req.send().await?;
        if response.status().is_success() {
            trace!("💳️ REST query successful. {}", response.status());
            let text = response.text().await?;
            if text.trim().is_empty() {
                return Err(PaygateApiError::EmptyResponse);
            }
            serde_json::from_str::<T>(&text).map_err(|e| PaygateApiError::JsonError(e.to_string()))
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            Err(PaygateApiError::QueryError { status, message })
        }
    }

    /// [`Self::rest_query`] with capped exponential backoff on transient errors.
    async fn query_with_retry<T: DeserializeOwned, B: Serialize>(
        &self,
        label: &str,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T, PaygateApiError> {
        retry_with_backoff(self.retry, label, PaygateApiError::is_transient, || {
            self.rest_query::<T, B>(method.clone(), path, Some(body))
        })
        .await
    }

    pub async fn authenticate(&self) -> Result<String, PaygateApiError> {
        let api_key = self
            .config
            .api_key
            .configured()
            .ok_or_else(|| PaygateApiError::Initialization("No gateway API key has been configured".into()))?;
        let request = AuthRequest { api_key: api_key.to_string() };
        let response: AuthResponse = self.query_with_retry("paygate auth", Method::POST, "/auth/tokens", &request).await?;
        trace!("💳️ Obtained gateway auth token");
        Ok(response.token)
    }

    pub async fn register_order(&self, auth_token: &str, request: &SessionRequest) -> Result<RegisteredOrder, PaygateApiError> {
        let registration = OrderRegistration::new(auth_token, request);
        let order: RegisteredOrder =
            self.query_with_retry("paygate order registration", Method::POST, "/ecommerce/orders", &registration).await?;
        debug!("💳️ Registered order {} with the gateway as #{}", request.merchant_order_id, order.id);
        Ok(order)
    }

    pub async fn request_payment_key(
        &self,
        auth_token: &str,
        gateway_order_id: u64,
        request: &SessionRequest,
    ) -> Result<String, PaygateApiError> {
        let key_request = PaymentKeyRequest {
            auth_token: auth_token.to_string(),
            amount_cents: request.amount.value(),
            expiration: PAYMENT_KEY_EXPIRY,
            order_id: gateway_order_id,
            billing_data: BillingData::from(&request.billing),
            currency: request.currency.clone(),
            integration_id: self.config.integration_id,
            redirection_url: request.redirect_url.clone(),
        };
        let response: TokenResponse =
            self.query_with_retry("paygate payment key", Method::POST, "/acceptance/payment_keys", &key_request).await?;
        Ok(response.token)
    }

    pub async fn transaction_inquiry(&self, merchant_order_id: &MerchantOrderId) -> Result<TransactionObject, PaygateApiError> {
        let auth_token = self.authenticate().await?;
        let request = InquiryRequest { auth_token, merchant_order_id: merchant_order_id.to_string() };
        let txn: TransactionObject = self
            .query_with_retry("paygate inquiry", Method::POST, "/ecommerce/orders/transaction_inquiry", &request)
            .await?;
        debug!("💳️ Inquiry for {merchant_order_id} returned transaction {:?}", txn.id);
        Ok(txn)
    }
}

impl PaymentGateway for PaygateApi {
    async fn create_session(&self, request: SessionRequest) -> Result<PaymentSession, GatewayError> {
        let auth_token = self.authenticate().await?;
        let order = self.register_order(&auth_token, &request).await?;
        let payment_token = self.request_payment_key(&auth_token, order.id, &request).await?;
        let payment_url = self.iframe_url(&payment_token);
        info!("💳️ Payment session {} created for order {}", order.id, request.merchant_order_id);
        Ok(PaymentSession { gateway_order_id: order.id.to_string(), payment_url })
    }

    async fn inquire(&self, merchant_order_id: &MerchantOrderId) -> Result<TransactionObject, GatewayError> {
        let txn = self.transaction_inquiry(merchant_order_id).await?;
        Ok(txn)
    }
}
