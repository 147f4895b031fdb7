//! Scripted in-memory exchange for unit tests

use crate::gateway::{ExchangeClient, GatewayError};
use crate::models::{Candle, OrderAck, OrderSpec, Timeframe};
use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// `n` consecutive daily candles closing at 100, 101, 102, ...
pub fn rising_daily_candles(n: usize) -> Vec<Candle> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    (0..n)
        .map(|i| {
            let open_time = start + Duration::days(i as i64);
            let close = Decimal::from(100 + i as i64);
            Candle {
                open_time,
                close_time: open_time + Duration::days(1) - Duration::milliseconds(1),
                open: close - Decimal::ONE,
                high: close,
                low: close - Decimal::ONE,
                close,
                volume: Decimal::from(1_000),
            }
        })
        .collect()
}

#[derive(Default)]
pub struct ScriptedExchange {
    candles: Mutex<HashMap<Timeframe, Vec<Candle>>>,
    prices: Mutex<VecDeque<Decimal>>,
    last_price: Mutex<Decimal>,
    failures: Mutex<HashMap<&'static str, VecDeque<GatewayError>>>,
    calls: Mutex<HashMap<&'static str, usize>>,
    orders: Mutex<Vec<OrderSpec>>,
    leverage: Mutex<Option<(String, u32)>>,
    price_delay: Option<std::time::Duration>,
    idempotent: bool,
}

impl ScriptedExchange {
    pub fn new() -> Self {
        Self {
            last_price: Mutex::new(Decimal::ONE_HUNDRED),
            ..Self::default()
        }
    }

    pub fn with_candles(self, timeframe: Timeframe, candles: Vec<Candle>) -> Self {
        self.candles.lock().unwrap().insert(timeframe, candles);
        self
    }

    /// Prices returned by successive `get_current_price` calls; the last one repeats
    pub fn with_prices(self, prices: &[Decimal]) -> Self {
        self.prices.lock().unwrap().extend(prices.iter().copied());
        self
    }

    /// Sleep before answering each price read
    pub fn with_price_delay(mut self, delay: std::time::Duration) -> Self {
        self.price_delay = Some(delay);
        self
    }

    pub fn idempotent(mut self) -> Self {
        self.idempotent = true;
        self
    }

    /// Make the next `times` calls of `operation` fail with `error`
    pub fn fail_times(&self, operation: &'static str, error: GatewayError, times: usize) {
        let mut failures = self.failures.lock().unwrap();
        let queue = failures.entry(operation).or_default();
        for _ in 0..times {
            queue.push_back(error.clone());
        }
    }

    pub fn calls(&self, operation: &str) -> usize {
        self.calls.lock().unwrap().get(operation).copied().unwrap_or(0)
    }

    /// Every order the client saw, including failed attempts
    pub fn order_attempts(&self) -> Vec<OrderSpec> {
        self.orders.lock().unwrap().clone()
    }

    pub fn leverage(&self) -> Option<(String, u32)> {
        self.leverage.lock().unwrap().clone()
    }

    fn enter(&self, operation: &'static str) -> Result<(), GatewayError> {
        *self.calls.lock().unwrap().entry(operation).or_default() += 1;
        match self
            .failures
            .lock()
            .unwrap()
            .get_mut(operation)
            .and_then(|queue| queue.pop_front())
        {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ExchangeClient for ScriptedExchange {
    async fn fetch_candles(
        &self,
        _symbol: &str,
        timeframe: Timeframe,
        lookback: usize,
    ) -> Result<Vec<Candle>, GatewayError> {
        self.enter("fetch_candles")?;
        let candles = self
            .candles
            .lock()
            .unwrap()
            .get(&timeframe)
            .cloned()
            .unwrap_or_default();
        let skip = candles.len().saturating_sub(lookback);
        Ok(candles.into_iter().skip(skip).collect())
    }

    async fn get_current_price(&self, _symbol: &str) -> Result<Decimal, GatewayError> {
        if let Some(delay) = self.price_delay {
            tokio::time::sleep(delay).await;
        }
        self.enter("get_current_price")?;
        let mut last = self.last_price.lock().unwrap();
        if let Some(next) = self.prices.lock().unwrap().pop_front() {
            *last = next;
        }
        Ok(*last)
    }

    async fn get_margin_balance(&self) -> Result<Decimal, GatewayError> {
        self.enter("get_margin_balance")?;
        Ok(Decimal::from(10_000))
    }

    async fn set_leverage(&self, symbol: &str, multiplier: u32) -> Result<(), GatewayError> {
        self.enter("set_leverage")?;
        *self.leverage.lock().unwrap() = Some((symbol.to_string(), multiplier));
        Ok(())
    }

    async fn place_order(&self, order: &OrderSpec) -> Result<OrderAck, GatewayError> {
        let mut orders = self.orders.lock().unwrap();
        orders.push(order.clone());
        let order_id = orders.len().to_string();
        drop(orders);

        self.enter("place_order")?;
        Ok(OrderAck {
            order_id,
            average_price: None,
        })
    }

    fn supports_client_order_id(&self) -> bool {
        self.idempotent
    }
}
