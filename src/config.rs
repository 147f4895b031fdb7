use crate::error::ConfigurationError;
use crate::execution::{BotParams, BotParamsBuilder, TradingConfig};
use crate::gateway::{ExchangeClient, GatewaySettings};
use crate::indicators::{IndicatorPipeline, MACD, MACD_HISTOGRAM, MACD_SIGNAL, RSI};
use crate::models::Direction;
use crate::strategy::{Condition, IndicatorComparison, TrailingStopTracker};
use anyhow::Context;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";
const ENV_PREFIX: &str = "FUTURESBOT";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub gateway: GatewaySettings,
    #[serde(default)]
    pub bots: Vec<BotConfig>,
}

#[derive(Clone, Deserialize)]
pub struct ExchangeConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    #[serde(default = "default_recv_window_ms")]
    pub recv_window_ms: u64,
    /// Simulate fills instead of sending orders
    #[serde(default)]
    pub paper: bool,
    #[serde(default = "default_paper_balance")]
    pub paper_balance: Decimal,
}

fn default_base_url() -> String {
    "https://fapi.binance.com".to_string()
}

fn default_recv_window_ms() -> u64 {
    5_000
}

fn default_paper_balance() -> Decimal {
    Decimal::from(10_000)
}

impl fmt::Debug for ExchangeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangeConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("api_secret", &"<redacted>")
            .field("recv_window_ms", &self.recv_window_ms)
            .field("paper", &self.paper)
            .field("paper_balance", &self.paper_balance)
            .finish()
    }
}

/// One bot as written in the config file
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    pub symbol: String,
    pub direction: Direction,
    pub leverage: u32,
    pub quantity: Decimal,
    pub trailing_stop_percent: Decimal,
    #[serde(default)]
    pub tick_interval_secs: Option<u64>,
    #[serde(default)]
    pub daily_lookback: Option<usize>,
    #[serde(default)]
    pub weekly_lookback: Option<usize>,
    #[serde(default = "default_indicators")]
    pub indicators: Vec<String>,
    #[serde(default)]
    pub entry_conditions: Vec<IndicatorComparison>,
    #[serde(default)]
    pub exit_conditions: Vec<IndicatorComparison>,
}

fn default_indicators() -> Vec<String> {
    [MACD, MACD_SIGNAL, MACD_HISTOGRAM, RSI]
        .iter()
        .map(|name| name.to_string())
        .collect()
}

impl BotConfig {
    pub fn trading(&self) -> TradingConfig {
        let mut trading = TradingConfig::new(self.symbol.clone(), self.leverage, self.quantity);
        if let Some(secs) = self.tick_interval_secs {
            trading.tick_interval_secs = secs;
        }
        if let Some(bars) = self.daily_lookback {
            trading.daily_lookback = bars;
        }
        if let Some(bars) = self.weekly_lookback {
            trading.weekly_lookback = bars;
        }
        trading
    }

    /// Validate and assemble the bot's parameters around a shared exchange
    pub fn into_params(self, exchange: Arc<dyn ExchangeClient>) -> Result<BotParams, ConfigurationError> {
        let mut violations = Vec::new();

        let pipeline = match IndicatorPipeline::from_names(&self.indicators) {
            Ok(pipeline) => Some(pipeline),
            Err(unknown) => {
                violations.extend(unknown.into_iter().map(|name| format!("unknown indicator '{}'", name)));
                None
            }
        };
        let tracker = match TrailingStopTracker::new(self.trailing_stop_percent) {
            Ok(tracker) => Some(tracker),
            Err(e) => {
                violations.push(e.to_string());
                None
            }
        };

        let conditions = |list: Vec<IndicatorComparison>| {
            list.into_iter()
                .map(|c| Arc::new(c) as Arc<dyn Condition>)
                .collect::<Vec<_>>()
        };

        let mut builder = BotParamsBuilder::new()
            .exchange(exchange)
            .direction(self.direction)
            .trading(self.trading())
            .entry_conditions(conditions(self.entry_conditions))
            .exit_conditions(conditions(self.exit_conditions));
        if let Some(pipeline) = pipeline {
            builder = builder.indicator_pipeline(pipeline);
        }
        if let Some(tracker) = tracker {
            builder = builder.tracker(tracker);
        }

        match builder.build() {
            Ok(params) if violations.is_empty() => Ok(params),
            Ok(_) => Err(ConfigurationError::new(violations)),
            Err(e) => {
                // a missing pipeline or tracker was already explained above
                violations.extend(e.violations.into_iter().filter(|v| !v.ends_with("is required")));
                Err(ConfigurationError::new(violations))
            }
        }
    }
}

impl AppConfig {
    /// Load from a TOML file layered with `FUTURESBOT__`-prefixed environment variables
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?;

        let config: AppConfig = settings
            .try_deserialize()
            .context("Configuration does not match the expected layout")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let mut violations = Vec::new();
        if !self.exchange.paper
            && (self.exchange.api_key.is_empty() || self.exchange.api_secret.is_empty())
        {
            violations.push("exchange api_key and api_secret are required for live trading".to_string());
        }
        if self.bots.is_empty() {
            violations.push("at least one bot must be configured".to_string());
        }
        ConfigurationError::check(violations)
    }
}
