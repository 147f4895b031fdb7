use crate::gateway::{ExchangeClient, GatewayError};
use crate::models::{Candle, OrderAck, OrderSide, OrderSpec, Timeframe};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy)]
struct PaperPosition {
    /// Signed size: positive long, negative short
    quantity: Decimal,
    entry_price: Decimal,
}

#[derive(Debug, Default)]
struct PaperAccount {
    wallet_balance: Decimal,
    realized_pnl: Decimal,
    leverage: HashMap<String, u32>,
    positions: HashMap<String, PaperPosition>,
    fills_by_client_id: HashMap<String, OrderAck>,
    next_order_id: u64,
}

impl PaperAccount {
    fn leverage_for(&self, symbol: &str) -> Decimal {
        Decimal::from(self.leverage.get(symbol).copied().unwrap_or(1))
    }

    fn used_margin(&self) -> Decimal {
        self.positions
            .iter()
            .map(|(symbol, p)| p.quantity.abs() * p.entry_price / self.leverage_for(symbol))
            .sum()
    }

    /// Apply a signed fill and return the realized PnL
    fn apply_fill(&mut self, symbol: &str, delta: Decimal, price: Decimal) -> Decimal {
        let current = self.positions.get(symbol).copied();

        let (position, pnl) = match current {
            None => (
                Some(PaperPosition {
                    quantity: delta,
                    entry_price: price,
                }),
                Decimal::ZERO,
            ),
            Some(p) if p.quantity.is_sign_positive() == delta.is_sign_positive() => {
                let size = p.quantity.abs() + delta.abs();
                let entry_price =
                    (p.quantity.abs() * p.entry_price + delta.abs() * price) / size;
                (
                    Some(PaperPosition {
                        quantity: p.quantity + delta,
                        entry_price,
                    }),
                    Decimal::ZERO,
                )
            }
            Some(p) => {
                let closed = delta.abs().min(p.quantity.abs());
                let side = if p.quantity.is_sign_positive() {
                    Decimal::ONE
                } else {
                    Decimal::NEGATIVE_ONE
                };
                let pnl = (price - p.entry_price) * closed * side;
                let remaining = p.quantity + delta;

                let position = if remaining.is_zero() {
                    None
                } else if remaining.is_sign_positive() == p.quantity.is_sign_positive() {
                    Some(PaperPosition {
                        quantity: remaining,
                        entry_price: p.entry_price,
                    })
                } else {
                    // flipped through zero; the remainder opened at this fill
                    Some(PaperPosition {
                        quantity: remaining,
                        entry_price: price,
                    })
                };
                (position, pnl)
            }
        };

        match position {
            Some(p) => self.positions.insert(symbol.to_string(), p),
            None => self.positions.remove(symbol),
        };
        self.wallet_balance += pnl;
        self.realized_pnl += pnl;
        pnl
    }
}

/// Simulated futures account over a real market-data source
///
/// Candles and prices come from the wrapped client; leverage, margin and
/// fills are kept in memory. Market orders fill at the current price.
pub struct PaperExchange {
    market: Arc<dyn ExchangeClient>,
    account: Mutex<PaperAccount>,
}

impl PaperExchange {
    pub fn new(market: Arc<dyn ExchangeClient>, initial_balance: Decimal) -> Self {
        Self {
            market,
            account: Mutex::new(PaperAccount {
                wallet_balance: initial_balance,
                ..PaperAccount::default()
            }),
        }
    }

    fn account(&self) -> MutexGuard<'_, PaperAccount> {
        self.account.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn realized_pnl(&self) -> Decimal {
        self.account().realized_pnl
    }

    /// Signed position size for `symbol`, zero when flat
    pub fn position(&self, symbol: &str) -> Decimal {
        self.account()
            .positions
            .get(symbol)
            .map_or(Decimal::ZERO, |p| p.quantity)
    }
}

#[async_trait]
impl ExchangeClient for PaperExchange {
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        lookback: usize,
    ) -> Result<Vec<Candle>, GatewayError> {
        self.market.fetch_candles(symbol, timeframe, lookback).await
    }

    async fn get_current_price(&self, symbol: &str) -> Result<Decimal, GatewayError> {
        self.market.get_current_price(symbol).await
    }

    /// Wallet balance; unrealized PnL is not marked to market
    async fn get_margin_balance(&self) -> Result<Decimal, GatewayError> {
        Ok(self.account().wallet_balance)
    }

    async fn set_leverage(&self, symbol: &str, multiplier: u32) -> Result<(), GatewayError> {
        if !(1..=125).contains(&multiplier) {
            return Err(GatewayError::Rejected(format!(
                "leverage {} outside 1..=125",
                multiplier
            )));
        }
        self.account().leverage.insert(symbol.to_string(), multiplier);
        Ok(())
    }

    async fn place_order(&self, order: &OrderSpec) -> Result<OrderAck, GatewayError> {
        let previous_fill = order
            .client_order_id
            .as_ref()
            .and_then(|id| self.account().fills_by_client_id.get(id).cloned());
        if let Some(ack) = previous_fill {
            return Ok(ack);
        }
        if order.quantity <= Decimal::ZERO {
            return Err(GatewayError::Rejected(format!(
                "quantity must be positive, got {}",
                order.quantity
            )));
        }

        let price = self.market.get_current_price(&order.symbol).await?;

        let mut account = self.account();
        // a resend with the same id may have filled while the price was read
        if let Some(ack) = order
            .client_order_id
            .as_ref()
            .and_then(|id| account.fills_by_client_id.get(id))
        {
            return Ok(ack.clone());
        }
        let current = account
            .positions
            .get(&order.symbol)
            .map_or(Decimal::ZERO, |p| p.quantity);
        let mut delta = match order.side {
            OrderSide::Buy => order.quantity,
            OrderSide::Sell => -order.quantity,
        };

        if order.reduce_only {
            if current.is_zero() || current.is_sign_positive() == delta.is_sign_positive() {
                return Err(GatewayError::Rejected(
                    "reduce-only order would not reduce the position".into(),
                ));
            }
            if delta.abs() > current.abs() {
                delta = -current;
            }
        } else if current.is_zero() || current.is_sign_positive() == delta.is_sign_positive() {
            let required = delta.abs() * price / account.leverage_for(&order.symbol);
            let available = account.wallet_balance - account.used_margin();
            if required > available {
                return Err(GatewayError::Rejected(format!(
                    "margin is insufficient: need {}, available {}",
                    required.round_dp(2),
                    available.round_dp(2)
                )));
            }
        }

        let pnl = account.apply_fill(&order.symbol, delta, price);
        account.next_order_id += 1;
        let ack = OrderAck {
            order_id: format!("paper-{}", account.next_order_id),
            average_price: Some(price),
        };
        if let Some(id) = &order.client_order_id {
            account.fills_by_client_id.insert(id.clone(), ack.clone());
        }

        tracing::info!(
            symbol = %order.symbol,
            side = order.side.as_str(),
            quantity = %delta.abs(),
            price = %price,
            realized_pnl = %pnl,
            balance = %account.wallet_balance,
            "Paper fill"
        );

        Ok(ack)
    }

    fn supports_client_order_id(&self) -> bool {
        true
    }
}
