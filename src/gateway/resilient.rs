use super::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, EndpointClass, ExchangeClient,
    GatewayError, RateLimitBudget, RateLimitSettings, RetryPolicy,
};
use crate::error::ConfigurationError;
use crate::models::{Candle, OrderAck, OrderSpec, Timeframe};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    pub rate_limits: RateLimitSettings,
    pub circuit_breaker: CircuitBreakerConfig,
    pub retry: RetryPolicy,
}

struct Breakers {
    market_data: CircuitBreaker,
    account: CircuitBreaker,
    order: CircuitBreaker,
}

/// Exchange client wrapper with rate limiting, retries and circuit breaking
///
/// Build one per exchange account and hand it to every bot behind an `Arc`;
/// the rate budget and breaker state are shared by all of them.
///
/// Reads and leverage changes retry on `Transient` failures. Orders only retry
/// when the raw client honors client order ids, reusing the same id on every
/// attempt; otherwise the first failure is returned to the caller.
pub struct ResilientGateway {
    client: Arc<dyn ExchangeClient>,
    budget: RateLimitBudget,
    breakers: Breakers,
    retry: RetryPolicy,
}

impl ResilientGateway {
    pub fn new(
        client: Arc<dyn ExchangeClient>,
        settings: &GatewaySettings,
    ) -> Result<Self, ConfigurationError> {
        let mut violations = Vec::new();
        if settings.retry.max_attempts == 0 {
            violations.push("retry max_attempts must be at least 1".to_string());
        }
        if settings.circuit_breaker.failure_threshold == 0 {
            violations.push("circuit breaker failure_threshold must be at least 1".to_string());
        }
        let budget = RateLimitBudget::new(&settings.rate_limits);
        if let Err(e) = &budget {
            violations.extend(e.violations.iter().cloned());
        }
        ConfigurationError::check(violations)?;
        let budget = budget?;

        let breaker = |class| CircuitBreaker::new(class, settings.circuit_breaker.clone());
        Ok(Self {
            client,
            budget,
            breakers: Breakers {
                market_data: breaker(EndpointClass::MarketData),
                account: breaker(EndpointClass::Account),
                order: breaker(EndpointClass::Order),
            },
            retry: settings.retry.clone(),
        })
    }

    fn breaker(&self, class: EndpointClass) -> &CircuitBreaker {
        match class {
            EndpointClass::MarketData => &self.breakers.market_data,
            EndpointClass::Account => &self.breakers.account,
            EndpointClass::Order => &self.breakers.order,
        }
    }

    pub fn circuit_state(&self, class: EndpointClass) -> CircuitState {
        self.breaker(class).state()
    }

    /// One guarded attempt: breaker, then rate budget, then the raw client
    async fn call_once<T, F, Fut>(
        &self,
        class: EndpointClass,
        operation: &'static str,
        call: F,
    ) -> Result<T, GatewayError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let breaker = self.breaker(class);
        let admission = breaker.try_acquire()?;

        if let Err(e) = self.budget.acquire(class).await {
            breaker.release_probe(admission);
            return Err(e);
        }

        let outcome = call().await;
        breaker.record(admission, &outcome);

        if let Err(e) = &outcome {
            tracing::debug!(%class, operation, "Exchange call failed: {}", e);
        }
        outcome
    }

    async fn call_with_retry<T, F, Fut>(
        &self,
        class: EndpointClass,
        operation: &'static str,
        mut call: F,
    ) -> Result<T, GatewayError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let mut attempt = 1;
        loop {
            match self.call_once(class, operation, &mut call).await {
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    tracing::warn!(
                        %class,
                        operation,
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Transient failure, retrying: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }
}

#[async_trait]
impl ExchangeClient for ResilientGateway {
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        lookback: usize,
    ) -> Result<Vec<Candle>, GatewayError> {
        self.call_with_retry(EndpointClass::MarketData, "fetch_candles", || {
            self.client.fetch_candles(symbol, timeframe, lookback)
        })
        .await
    }

    async fn get_current_price(&self, symbol: &str) -> Result<Decimal, GatewayError> {
        self.call_with_retry(EndpointClass::MarketData, "get_current_price", || {
            self.client.get_current_price(symbol)
        })
        .await
    }

    async fn get_margin_balance(&self) -> Result<Decimal, GatewayError> {
        self.call_with_retry(EndpointClass::Account, "get_margin_balance", || {
            self.client.get_margin_balance()
        })
        .await
    }

    async fn set_leverage(&self, symbol: &str, multiplier: u32) -> Result<(), GatewayError> {
        self.call_with_retry(EndpointClass::Account, "set_leverage", || {
            self.client.set_leverage(symbol, multiplier)
        })
        .await
    }

    async fn place_order(&self, order: &OrderSpec) -> Result<OrderAck, GatewayError> {
        let outcome = if self.client.supports_client_order_id() {
            let mut keyed = order.clone();
            keyed
                .client_order_id
                .get_or_insert_with(|| Uuid::new_v4().simple().to_string());

            self.call_with_retry(EndpointClass::Order, "place_order", || {
                self.client.place_order(&keyed)
            })
            .await
        } else {
            self.call_once(EndpointClass::Order, "place_order", || {
                self.client.place_order(order)
            })
            .await
        };

        if let Err(e) = &outcome {
            tracing::warn!(
                symbol = %order.symbol,
                side = order.side.as_str(),
                quantity = %order.quantity,
                "Order not placed: {}",
                e
            );
        }
        outcome
    }

    fn supports_client_order_id(&self) -> bool {
        self.client.supports_client_order_id()
    }
}
