use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use log::error;
use settlement_engine::{CartApiError, DiscountError, DiscountRejection, SettlementError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("The service is temporarily unavailable. Please try again. {0}")]
    TemporarilyUnavailable(String),
    #[error("Payload deserialization error")]
    CouldNotDeserializePayload,
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Could not read request path: {0}")]
    InvalidRequestPath(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("Authentication Error. {0}")]
    AuthenticationError(#[from] AuthError),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("The request conflicts with the current state. {0}")]
    Conflict(String),
    #[error("The discount code was not accepted. {0}")]
    DiscountRejected(DiscountRejection),
    #[error("Payment session unavailable. {0}")]
    PaymentUnavailable(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::CouldNotDeserializePayload => StatusCode::BAD_REQUEST,
            Self::InvalidRequestPath(_) => StatusCode::BAD_REQUEST,
            Self::DiscountRejected(_) => StatusCode::BAD_REQUEST,
            Self::AuthenticationError(e) => match e {
                AuthError::MissingSession => StatusCode::UNAUTHORIZED,
                AuthError::InvalidSignature(_) => StatusCode::UNAUTHORIZED,
                AuthError::InsufficientPermissions(_) => StatusCode::FORBIDDEN,
                AuthError::ForbiddenPeer => StatusCode::FORBIDDEN,
                AuthError::NotOrderOwner => StatusCode::FORBIDDEN,
            },
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::PaymentUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::TemporarilyUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            Self::DiscountRejected(rejection) => {
                serde_json::json!({ "error": self.to_string(), "rejection": rejection })
            },
            _ => serde_json::json!({ "error": self.to_string() }),
        };
        HttpResponse::build(self.status_code()).insert_header(ContentType::json()).body(body.to_string())
    }
}

#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("No session owner was supplied with the request.")]
    MissingSession,
    #[error("Insufficient Permissions. {0}")]
    InsufficientPermissions(String),
    #[error("The request signature is invalid. {0}")]
    InvalidSignature(String),
    #[error("The request came from a peer that is not on the whitelist.")]
    ForbiddenPeer,
    #[error("The order belongs to someone else.")]
    NotOrderOwner,
}

impl From<CartApiError> for ServerError {
    fn from(e: CartApiError) -> Self {
        match e {
            CartApiError::DatabaseError(s) => Self::BackendError(s),
            CartApiError::ItemNotFound(_) => Self::NoRecordFound(e.to_string()),
            CartApiError::ItemUnavailable(_) | CartApiError::AlreadyOwned(_) => Self::Conflict(e.to_string()),
        }
    }
}

impl From<DiscountError> for ServerError {
    fn from(e: DiscountError) -> Self {
        match e {
            DiscountError::DatabaseError(s) => Self::BackendError(s),
            DiscountError::Rejected(r) => Self::DiscountRejected(r),
        }
    }
}

impl From<SettlementError> for ServerError {
    fn from(e: SettlementError) -> Self {
        if e.is_retryable() {
            return Self::TemporarilyUnavailable(e.to_string());
        }
        match e {
            SettlementError::DatabaseError(s) => {
                error!("💻️ Database error while settling: {s}");
                Self::BackendError(s)
            },
            SettlementError::OrderNotFound(_) => Self::NoRecordFound(e.to_string()),
            SettlementError::MissingCorrelationId => Self::InvalidRequestBody(e.to_string()),
            SettlementError::NotOrderOwner => Self::AuthenticationError(AuthError::NotOrderOwner),
            SettlementError::EmptyCart | SettlementError::InvalidBilling(_) => Self::InvalidRequestBody(e.to_string()),
            SettlementError::CheckoutInProgress(_) => Self::Conflict(e.to_string()),
            SettlementError::DiscountRejected(r) => Self::DiscountRejected(r),
            SettlementError::InvalidSignature(s) => Self::AuthenticationError(AuthError::InvalidSignature(s.to_string())),
            SettlementError::GatewayUnavailable(_) => Self::PaymentUnavailable(e.to_string()),
            _ => Self::Unspecified(e.to_string()),
        }
    }
}
