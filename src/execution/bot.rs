use super::params::{BotParams, TradingConfig};
use crate::error::BotError;
use crate::gateway::{ExchangeClient, GatewayError};
use crate::indicators::{IndicatorPipeline, MarketSnapshot};
use crate::models::{Direction, ExitReason, OrderSpec, Timeframe, TradeDecision};
use crate::strategy::{RuleEvaluator, TrailingStopTracker};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotState {
    Stopped,
    Running,
}

/// What `execute_trade` did with the pending decision
#[derive(Debug, Clone, PartialEq)]
pub enum TradeOutcome {
    Entered {
        order_id: String,
        direction: Direction,
        entry_price: Decimal,
    },
    Exited {
        order_id: String,
        reason: ExitReason,
    },
    Held,
    Skipped {
        reason: String,
    },
}

#[derive(Debug, Clone)]
struct PendingDecision {
    decision: TradeDecision,
    price: Decimal,
}

/// One bot: a symbol, a rule set and its trailing stop
///
/// Driven either tick by tick (`start`, `process_market_data`, `execute_trade`,
/// `stop`) or by handing it to [`TradingBot::spawn`].
pub struct TradingBot {
    exchange: Arc<dyn ExchangeClient>,
    pipeline: IndicatorPipeline,
    evaluator: RuleEvaluator,
    tracker: TrailingStopTracker,
    trading: TradingConfig,
    state: BotState,
    pending: Option<PendingDecision>,
}

impl TradingBot {
    pub fn new(params: BotParams) -> Self {
        Self {
            exchange: params.exchange,
            pipeline: params.pipeline,
            evaluator: params.evaluator,
            tracker: params.tracker,
            trading: params.trading,
            state: BotState::Stopped,
            pending: None,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.trading.symbol
    }

    pub fn state(&self) -> BotState {
        self.state
    }

    pub fn tracker(&self) -> &TrailingStopTracker {
        &self.tracker
    }

    /// Set leverage on the exchange, then start accepting ticks
    pub async fn start(&mut self) -> Result<(), BotError> {
        if self.state == BotState::Running {
            return Ok(());
        }

        self.exchange
            .set_leverage(&self.trading.symbol, self.trading.leverage)
            .await?;
        self.state = BotState::Running;

        tracing::info!(
            symbol = %self.trading.symbol,
            direction = %self.evaluator.direction(),
            leverage = self.trading.leverage,
            "Bot started"
        );
        Ok(())
    }

    /// Back to STOPPED; the tracker is reset and any pending decision dropped
    pub fn stop(&mut self) {
        if self.tracker.is_open() {
            tracing::warn!(
                symbol = %self.trading.symbol,
                entry_price = %self.tracker.state().entry_price,
                "Stopping with an open position; exchange position left in place"
            );
        }
        self.tracker.reset();
        self.pending = None;
        self.state = BotState::Stopped;
        tracing::info!(symbol = %self.trading.symbol, "Bot stopped");
    }

    /// Evaluate a snapshot and hold the decision for `execute_trade`
    pub fn process_market_data(
        &mut self,
        snapshot: &MarketSnapshot,
        current_price: Decimal,
    ) -> TradeDecision {
        let decision = self.evaluator.evaluate(snapshot, &self.tracker, current_price);

        tracing::debug!(
            symbol = %self.trading.symbol,
            price = %current_price,
            decision = ?decision,
            "Evaluated market data"
        );

        self.pending = Some(PendingDecision {
            decision: decision.clone(),
            price: current_price,
        });
        decision
    }

    /// Act on the pending decision
    ///
    /// The tracker only changes after the exchange accepts the order, so a
    /// failed order leaves it as it was and the next tick decides again.
    pub async fn execute_trade(&mut self) -> Result<TradeOutcome, BotError> {
        let Some(PendingDecision { decision, price }) = self.pending.take() else {
            return Ok(TradeOutcome::Skipped {
                reason: "no pending decision".to_string(),
            });
        };

        match decision {
            TradeDecision::Enter(direction) => self.enter(direction, price).await,
            TradeDecision::Exit(reason) => self.exit(reason).await,
            TradeDecision::Hold => {
                if self.tracker.is_open() {
                    self.tracker.update(price)?;
                }
                Ok(TradeOutcome::Held)
            }
        }
    }

    async fn enter(&mut self, direction: Direction, price: Decimal) -> Result<TradeOutcome, BotError> {
        let balance = self.exchange.get_margin_balance().await?;
        let required_margin =
            self.trading.quantity * price / Decimal::from(self.trading.leverage.max(1));
        if balance < required_margin {
            tracing::warn!(
                symbol = %self.trading.symbol,
                balance = %balance,
                required = %required_margin,
                "Insufficient margin, skipping entry"
            );
            return Ok(TradeOutcome::Skipped {
                reason: format!("margin {} below required {}", balance, required_margin),
            });
        }

        let order = OrderSpec::market(
            self.trading.symbol.clone(),
            direction.entry_side(),
            self.trading.quantity,
        );
        let ack = self.exchange.place_order(&order).await?;

        let entry_price = ack.average_price.unwrap_or(price);
        self.tracker.initialize(direction, entry_price)?;

        tracing::info!(
            symbol = %self.trading.symbol,
            %direction,
            order_id = %ack.order_id,
            entry_price = %entry_price,
            stop_price = ?self.tracker.stop_price(),
            "Entered position"
        );

        Ok(TradeOutcome::Entered {
            order_id: ack.order_id,
            direction,
            entry_price,
        })
    }

    async fn exit(&mut self, reason: ExitReason) -> Result<TradeOutcome, BotError> {
        let Some(direction) = self.tracker.position() else {
            return Ok(TradeOutcome::Skipped {
                reason: "exit without an open position".to_string(),
            });
        };

        let order = OrderSpec::market(
            self.trading.symbol.clone(),
            direction.exit_side(),
            self.trading.quantity,
        )
        .reduce_only();
        let ack = self.exchange.place_order(&order).await?;

        let entry_price = self.tracker.state().entry_price;
        self.tracker.reset();

        tracing::info!(
            symbol = %self.trading.symbol,
            %direction,
            order_id = %ack.order_id,
            entry_price = %entry_price,
            exit_price = ?ack.average_price,
            %reason,
            "Exited position"
        );

        Ok(TradeOutcome::Exited {
            order_id: ack.order_id,
            reason,
        })
    }

    /// One full cycle: candles, snapshot, price, decision, action
    pub async fn tick(&mut self) -> Result<TradeOutcome, BotError> {
        if self.state != BotState::Running {
            return Ok(TradeOutcome::Skipped {
                reason: "bot is stopped".to_string(),
            });
        }

        let symbol = self.trading.symbol.clone();
        let daily = self
            .exchange
            .fetch_candles(&symbol, Timeframe::Daily, self.trading.daily_lookback)
            .await?;
        let weekly = self
            .exchange
            .fetch_candles(&symbol, Timeframe::Weekly, self.trading.weekly_lookback)
            .await?;
        let price = self.exchange.get_current_price(&symbol).await?;

        let snapshot = self.pipeline.snapshot(&daily, &weekly);
        self.process_market_data(&snapshot, price);
        self.execute_trade().await
    }

    /// Tick until `shutdown` turns true or a fatal error occurs
    ///
    /// Shutdown is checked between ticks; a tick that already started finishes.
    /// A bot that failed to start retries `start` at the top of each tick.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), BotError> {
        let mut ticker = interval(Duration::from_secs(self.trading.tick_interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }
            if *shutdown.borrow() {
                break;
            }

            if let Err(e) = self.start().await {
                if e.is_fatal() {
                    tracing::error!(symbol = %self.trading.symbol, "Bot failed to start: {}", e);
                    return Err(e);
                }
                tracing::warn!(symbol = %self.trading.symbol, "Start failed, retrying next tick: {}", e);
                continue;
            }

            match self.tick().await {
                Ok(TradeOutcome::Held) => {}
                Ok(outcome) => {
                    tracing::debug!(symbol = %self.trading.symbol, ?outcome, "Tick complete");
                }
                Err(e) if e.is_fatal() => {
                    tracing::error!(
                        symbol = %self.trading.symbol,
                        "Fatal error, halting bot: {}",
                        e
                    );
                    self.stop();
                    return Err(e);
                }
                Err(BotError::Gateway(e @ GatewayError::Rejected(_))) => {
                    tracing::warn!(symbol = %self.trading.symbol, "Order rejected, will re-evaluate next tick: {}", e);
                }
                Err(e) => {
                    tracing::warn!(symbol = %self.trading.symbol, "Tick failed, continuing: {}", e);
                }
            }
        }

        self.stop();
        Ok(())
    }

    /// Run on its own task
    pub fn spawn(self) -> BotHandle {
        let (shutdown, receiver) = watch::channel(false);
        let symbol = self.trading.symbol.clone();
        let task = tokio::spawn(self.run(receiver));
        BotHandle {
            symbol,
            shutdown,
            task,
        }
    }
}

pub struct BotHandle {
    symbol: String,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<Result<(), BotError>>,
}

impl BotHandle {
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Ask the bot to stop at its next tick boundary
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn join(self) -> anyhow::Result<()> {
        self.task.await??;
        Ok(())
    }
}
