// Exchange gateway module
// Raw client contract plus the rate-limited, circuit-broken wrapper shared by all bots
pub mod circuit_breaker;
pub mod error;
pub mod rate_limit;
pub mod resilient;
pub mod retry;

pub use circuit_breaker::{Admission, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use error::GatewayError;
pub use rate_limit::{BucketConfig, RateLimitBudget, RateLimitPolicy, RateLimitSettings};
pub use resilient::{GatewaySettings, ResilientGateway};
pub use retry::RetryPolicy;

use crate::models::{Candle, OrderAck, OrderSpec, Timeframe};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fmt;

/// Endpoint families that get their own rate budget and breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointClass {
    /// Prices and candles
    MarketData,
    /// Balance and leverage
    Account,
    Order,
}

impl EndpointClass {
    pub const ALL: [EndpointClass; 3] = [
        EndpointClass::MarketData,
        EndpointClass::Account,
        EndpointClass::Order,
    ];
}

impl fmt::Display for EndpointClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointClass::MarketData => write!(f, "market-data"),
            EndpointClass::Account => write!(f, "account"),
            EndpointClass::Order => write!(f, "order"),
        }
    }
}

/// Exchange operations a bot depends on
///
/// Implemented by raw exchange clients and by [`ResilientGateway`], which wraps one.
/// Every failure comes back already classified as a [`GatewayError`].
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Candles ordered by close time, oldest first
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        lookback: usize,
    ) -> Result<Vec<Candle>, GatewayError>;

    async fn get_current_price(&self, symbol: &str) -> Result<Decimal, GatewayError>;

    async fn get_margin_balance(&self) -> Result<Decimal, GatewayError>;

    async fn set_leverage(&self, symbol: &str, multiplier: u32) -> Result<(), GatewayError>;

    async fn place_order(&self, order: &OrderSpec) -> Result<OrderAck, GatewayError>;

    /// Whether `OrderSpec::client_order_id` is honored as an idempotency key
    fn supports_client_order_id(&self) -> bool {
        false
    }
}
