// Technical indicators module
// Candles -> bar series -> per-timeframe indicator sets

pub mod macd;
pub mod moving_average;
pub mod pipeline;
pub mod rsi;
pub mod series;

pub use macd::{calculate_macd, calculate_macd_signal, MacdParams};
pub use moving_average::calculate_ema_series;
pub use pipeline::{
    compute, indicator_by_name, Indicator, IndicatorPipeline, IndicatorSet, Macd, MarketSnapshot,
    Rsi, MACD, MACD_HISTOGRAM, MACD_SIGNAL, RSI,
};
pub use rsi::calculate_rsi;
pub use series::{Bar, BarSeries, SeriesError};
