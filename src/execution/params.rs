use crate::error::ConfigurationError;
use crate::gateway::ExchangeClient;
use crate::indicators::IndicatorPipeline;
use crate::models::Direction;
use crate::strategy::{Condition, RuleEvaluator, TrailingStopTracker};
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;

/// Market, sizing and cadence settings for one bot
#[derive(Debug, Clone, PartialEq)]
pub struct TradingConfig {
    pub symbol: String,
    pub leverage: u32,
    /// Order size in base asset units
    pub quantity: Decimal,
    pub tick_interval_secs: u64,
    pub daily_lookback: usize,
    pub weekly_lookback: usize,
}

fn default_tick_interval_secs() -> u64 {
    60
}

fn default_daily_lookback() -> usize {
    200
}

// Weekly candles; 60 covers the 34 bars MACD signal needs with room to spare
fn default_weekly_lookback() -> usize {
    60
}

impl TradingConfig {
    pub fn new(symbol: impl Into<String>, leverage: u32, quantity: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            leverage,
            quantity,
            tick_interval_secs: default_tick_interval_secs(),
            daily_lookback: default_daily_lookback(),
            weekly_lookback: default_weekly_lookback(),
        }
    }

    pub fn validate(&self) -> Vec<String> {
        let mut violations = Vec::new();
        if self.symbol.trim().is_empty() {
            violations.push("symbol must not be empty".to_string());
        }
        if !(1..=125).contains(&self.leverage) {
            violations.push(format!("leverage must be in 1..=125, got {}", self.leverage));
        }
        if self.quantity <= Decimal::ZERO {
            violations.push(format!("quantity must be positive, got {}", self.quantity));
        }
        if self.tick_interval_secs == 0 {
            violations.push("tick interval must be at least 1 second".to_string());
        }
        if self.daily_lookback == 0 || self.weekly_lookback == 0 {
            violations.push("candle lookbacks must be positive".to_string());
        }
        violations
    }
}

/// Everything a `TradingBot` needs, already validated
pub struct BotParams {
    pub exchange: Arc<dyn ExchangeClient>,
    pub pipeline: IndicatorPipeline,
    pub evaluator: RuleEvaluator,
    pub tracker: TrailingStopTracker,
    pub trading: TradingConfig,
}

impl fmt::Debug for BotParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotParams")
            .field("pipeline", &self.pipeline)
            .field("evaluator", &self.evaluator)
            .field("tracker", &self.tracker)
            .field("trading", &self.trading)
            .finish_non_exhaustive()
    }
}

/// Collects bot parts; `build` reports every missing or invalid one at once
#[derive(Default)]
pub struct BotParamsBuilder {
    exchange: Option<Arc<dyn ExchangeClient>>,
    direction: Option<Direction>,
    pipeline: Option<IndicatorPipeline>,
    tracker: Option<TrailingStopTracker>,
    trading: Option<TradingConfig>,
    entry_conditions: Vec<Arc<dyn Condition>>,
    exit_conditions: Vec<Arc<dyn Condition>>,
}

impl BotParamsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exchange(mut self, exchange: Arc<dyn ExchangeClient>) -> Self {
        self.exchange = Some(exchange);
        self
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    pub fn indicator_pipeline(mut self, pipeline: IndicatorPipeline) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    pub fn tracker(mut self, tracker: TrailingStopTracker) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn trading(mut self, trading: TradingConfig) -> Self {
        self.trading = Some(trading);
        self
    }

    pub fn entry_condition(mut self, condition: impl Condition + 'static) -> Self {
        self.entry_conditions.push(Arc::new(condition));
        self
    }

    pub fn exit_condition(mut self, condition: impl Condition + 'static) -> Self {
        self.exit_conditions.push(Arc::new(condition));
        self
    }

    pub fn entry_conditions(mut self, conditions: impl IntoIterator<Item = Arc<dyn Condition>>) -> Self {
        self.entry_conditions.extend(conditions);
        self
    }

    pub fn exit_conditions(mut self, conditions: impl IntoIterator<Item = Arc<dyn Condition>>) -> Self {
        self.exit_conditions.extend(conditions);
        self
    }

    pub fn build(self) -> Result<BotParams, ConfigurationError> {
        let mut violations = Vec::new();

        if self.exchange.is_none() {
            violations.push("exchange service is required".to_string());
        }
        if self.direction.is_none() {
            violations.push("direction is required".to_string());
        }
        if self.pipeline.is_none() {
            violations.push("indicator calculator is required".to_string());
        }
        if self.tracker.is_none() {
            violations.push("trailing stop tracker is required".to_string());
        }
        match &self.trading {
            Some(trading) => violations.extend(trading.validate()),
            None => violations.push("trading config is required".to_string()),
        }

        violations.extend(RuleEvaluator::validate(
            &self.entry_conditions,
            &self.exit_conditions,
        ));

        if let Some(pipeline) = &self.pipeline {
            for condition in self.entry_conditions.iter().chain(&self.exit_conditions) {
                for (timeframe, indicator) in condition.referenced_indicators() {
                    if !pipeline.contains(indicator) {
                        violations.push(format!(
                            "condition '{}' reads {} {} which is not computed",
                            condition.name(),
                            timeframe,
                            indicator
                        ));
                    }
                }
            }
        }

        match (self.exchange, self.direction, self.pipeline, self.tracker, self.trading) {
            (Some(exchange), Some(direction), Some(pipeline), Some(tracker), Some(trading))
                if violations.is_empty() =>
            {
                if trading.daily_lookback < pipeline.max_lookback() {
                    tracing::warn!(
                        symbol = %trading.symbol,
                        daily_lookback = trading.daily_lookback,
                        needed = pipeline.max_lookback(),
                        "Daily lookback shorter than the longest indicator; some readings will stay unavailable"
                    );
                }

                let evaluator =
                    RuleEvaluator::new(self.entry_conditions, self.exit_conditions, direction)?;
                Ok(BotParams {
                    exchange,
                    pipeline,
                    evaluator,
                    tracker,
                    trading,
                })
            }
            _ => Err(ConfigurationError::new(violations)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Timeframe;
    use crate::strategy::{Comparison, IndicatorComparison};
    use crate::testing::ScriptedExchange;
    use rust_decimal_macros::dec;

    fn macd_positive() -> IndicatorComparison {
        IndicatorComparison::against_constant(Timeframe::Daily, "MACD", Comparison::Above, 0.0)
    }

    fn complete() -> BotParamsBuilder {
        BotParamsBuilder::new()
            .exchange(Arc::new(ScriptedExchange::new()))
            .direction(Direction::Long)
            .indicator_pipeline(IndicatorPipeline::standard())
            .tracker(TrailingStopTracker::new(dec!(2.0)).unwrap())
            .trading(TradingConfig::new("BTCUSDT", 3, dec!(0.01)))
            .entry_condition(macd_positive())
            .exit_condition(IndicatorComparison::against_constant(
                Timeframe::Daily,
                "RSI",
                Comparison::Above,
                70.0,
            ))
    }

    #[test]
    fn test_complete_params_build() {
        let params = complete().build().unwrap();

        assert_eq!(params.evaluator.direction(), Direction::Long);
        assert_eq!(params.trading.symbol, "BTCUSDT");
    }

    #[test]
    fn test_lists_every_missing_field() {
        let err = BotParamsBuilder::new()
            .entry_condition(macd_positive())
            .exit_condition(macd_positive())
            .build()
            .unwrap_err();

        let message = err.to_string();
        for field in [
            "exchange service",
            "direction",
            "indicator calculator",
            "trailing stop tracker",
            "trading config",
        ] {
            assert!(message.contains(field), "missing '{}' in: {}", field, message);
        }
        assert_eq!(err.violations.len(), 5);
    }

    #[test]
    fn test_empty_exit_conditions_rejected() {
        let builder = BotParamsBuilder::new()
            .exchange(Arc::new(ScriptedExchange::new()))
            .direction(Direction::Short)
            .indicator_pipeline(IndicatorPipeline::standard())
            .tracker(TrailingStopTracker::new(dec!(2.0)).unwrap())
            .trading(TradingConfig::new("BTCUSDT", 3, dec!(0.01)))
            .entry_condition(macd_positive());

        let err = builder.build().unwrap_err();
        assert!(err.to_string().contains("exit conditions"));
    }

    #[test]
    fn test_unknown_indicator_reference() {
        let err = complete()
            .entry_condition(IndicatorComparison::against_constant(
                Timeframe::Weekly,
                "EMA_50",
                Comparison::Above,
                1.0,
            ))
            .build()
            .unwrap_err();

        assert_eq!(err.violations.len(), 1);
        assert!(err.violations[0].contains("EMA_50"));
    }

    #[test]
    fn test_invalid_trading_config() {
        let mut trading = TradingConfig::new("", 0, dec!(0));
        trading.tick_interval_secs = 0;

        assert_eq!(trading.validate().len(), 4);
    }

    #[test]
    fn test_default_lookbacks() {
        let trading = TradingConfig::new("BTCUSDT", 3, dec!(0.01));

        assert_eq!(trading.daily_lookback, 200);
        assert_eq!(trading.weekly_lookback, 60);
        assert!(trading.weekly_lookback >= IndicatorPipeline::standard().max_lookback());
    }

    #[test]
    fn test_params_debug_omits_exchange() {
        let rendered = format!("{:?}", complete().build().unwrap());

        assert!(rendered.contains("BTCUSDT"));
        assert!(!rendered.contains("exchange"));
    }
}
