use settlement_engine::gateway::GatewayError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PaygateApiError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("Could not reach the gateway: {0}")]
    ConnectionError(String),
    #[error("The gateway did not respond in time: {0}")]
    Timeout(String),
    #[error("Request failed. Error {status}. {message}")]
    QueryError { status: u16, message: String },
    #[error("Could not deserialize JSON: {0}")]
    JsonError(String),
    #[error("The gateway returned an empty response")]
    EmptyResponse,
}

impl PaygateApiError {
    /// Connection problems, timeouts and 5xx responses are worth another attempt. Everything else is final.
    pub fn is_transient(&self) -> bool {
        match self {
            PaygateApiError::ConnectionError(_) | PaygateApiError::Timeout(_) => true,
            PaygateApiError::QueryError { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for PaygateApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            PaygateApiError::Timeout(e.to_string())
        } else if e.is_connect() || e.is_request() {
            PaygateApiError::ConnectionError(e.to_string())
        } else if e.is_decode() {
            PaygateApiError::JsonError(e.to_string())
        } else {
            PaygateApiError::ConnectionError(e.to_string())
        }
    }
}

impl From<PaygateApiError> for GatewayError {
    fn from(e: PaygateApiError) -> Self {
        match e {
            PaygateApiError::Initialization(s) | PaygateApiError::ConnectionError(s) => GatewayError::Unavailable(s),
            PaygateApiError::Timeout(s) => GatewayError::Timeout(s),
            PaygateApiError::QueryError { status, message } if status >= 500 => {
                GatewayError::Unavailable(format!("{status}: {message}"))
            },
            PaygateApiError::QueryError { status, message } => GatewayError::Rejected(format!("{status}: {message}")),
            PaygateApiError::JsonError(s) => GatewayError::InvalidResponse(s),
            PaygateApiError::EmptyResponse => GatewayError::InvalidResponse("empty response".to_string()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn transient_errors() {
        assert!(PaygateApiError::Timeout("slow".into()).is_transient());
        assert!(PaygateApiError::QueryError { status: 503, message: "busy".into() }.is_transient());
        assert!(PaygateApiError::QueryError { status: 429, message: "slow down".into() }.is_transient());
        assert!(!PaygateApiError::QueryError { status: 401, message: "bad key".into() }.is_transient());
        assert!(!PaygateApiError::JsonError("html".into()).is_transient());
    }

    #[test]
    fn gateway_error_mapping() {
        let e: GatewayError = PaygateApiError::QueryError { status: 401, message: "bad key".into() }.into();
        assert!(matches!(e, GatewayError::Rejected(_)));
        let e: GatewayError = PaygateApiError::QueryError { status: 502, message: "bad gateway".into() }.into();
        assert!(matches!(e, GatewayError::Unavailable(_)));
        let e: GatewayError = PaygateApiError::Timeout("slow".into()).into();
        assert!(matches!(e, GatewayError::Timeout(_)));
        let e: GatewayError = PaygateApiError::EmptyResponse.into();
        assert!(matches!(e, GatewayError::InvalidResponse(_)));
    }
}
