use super::EndpointClass;
use thiserror::Error;

/// Classified gateway failure
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    /// Local budget exhausted, or the exchange answered 429
    #[error("rate limited on {class} endpoints")]
    RateLimited { class: EndpointClass },
    #[error("circuit open on {class} endpoints")]
    CircuitOpen { class: EndpointClass },
    /// Bad credentials or missing permission
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Network failure or exchange-side 5xx
    #[error("transient failure: {0}")]
    Transient(String),
    /// Exchange refused the request on business grounds
    #[error("rejected by exchange: {0}")]
    Rejected(String),
}

impl GatewayError {
    /// Worth retrying inside the gateway
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Transient(_))
    }

    /// Needs operator intervention
    pub fn is_fatal(&self) -> bool {
        matches!(self, GatewayError::Unauthorized(_))
    }

    /// Signals the endpoint itself is unhealthy
    pub fn indicates_outage(&self) -> bool {
        matches!(self, GatewayError::Transient(_))
    }
}
