use mockall::mock;
use settlement_engine::{
    db_types::MerchantOrderId,
    gateway::{GatewayError, PaymentGateway, PaymentSession, SessionRequest, TransactionObject},
};

mock! {
    pub Gateway {}
    impl PaymentGateway for Gateway {
        async fn create_session(&self, request: SessionRequest) -> Result<PaymentSession, GatewayError>;
        async fn inquire(&self, merchant_order_id: &MerchantOrderId) -> Result<TransactionObject, GatewayError>;
    }
}

/// A gateway that must not be called at all.
pub fn silent_gateway() -> MockGateway {
    let mut gateway = MockGateway::new();
    gateway.expect_create_session().never();
    gateway.expect_inquire().never();
    gateway
}

pub fn session_for(request: &SessionRequest) -> PaymentSession {
    PaymentSession {
        gateway_order_id: format!("gw-{}", request.merchant_order_id),
        payment_url: format!("https://pay.example.test/iframe?order={}", request.merchant_order_id),
    }
}
