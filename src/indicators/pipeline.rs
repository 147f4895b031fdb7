use super::macd::{calculate_macd, calculate_macd_signal, MacdParams};
use super::rsi::calculate_rsi;
use super::series::BarSeries;
use crate::models::{Candle, Timeframe};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const MACD: &str = "MACD";
pub const MACD_SIGNAL: &str = "MACD_SIGNAL";
pub const MACD_HISTOGRAM: &str = "MACD_HISTOGRAM";
pub const RSI: &str = "RSI";

/// A reading derived from a bar series
///
/// `compute` returns `None` (not available) when the series is shorter than
/// `min_bars`; that is the normal state early in a bot's life.
pub trait Indicator: Send + Sync {
    /// Key the reading is stored under in an [`IndicatorSet`]
    fn name(&self) -> &str;

    /// Bars required before a value exists
    fn min_bars(&self) -> usize;

    fn compute(&self, series: &BarSeries) -> Option<f64>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacdOutput {
    Line,
    Signal,
    Histogram,
}

#[derive(Debug, Clone)]
pub struct Macd {
    params: MacdParams,
    output: MacdOutput,
}

impl Macd {
    pub fn line(params: MacdParams) -> Self {
        Self {
            params,
            output: MacdOutput::Line,
        }
    }

    pub fn signal(params: MacdParams) -> Self {
        Self {
            params,
            output: MacdOutput::Signal,
        }
    }

    pub fn histogram(params: MacdParams) -> Self {
        Self {
            params,
            output: MacdOutput::Histogram,
        }
    }
}

impl Indicator for Macd {
    fn name(&self) -> &str {
        match self.output {
            MacdOutput::Line => MACD,
            MacdOutput::Signal => MACD_SIGNAL,
            MacdOutput::Histogram => MACD_HISTOGRAM,
        }
    }

    fn min_bars(&self) -> usize {
        match self.output {
            MacdOutput::Line => self.params.line_lookback(),
            MacdOutput::Signal | MacdOutput::Histogram => self.params.signal_lookback(),
        }
    }

    fn compute(&self, series: &BarSeries) -> Option<f64> {
        let closes = series.closes();
        match self.output {
            MacdOutput::Line => calculate_macd(&closes, &self.params),
            MacdOutput::Signal => calculate_macd_signal(&closes, &self.params),
            MacdOutput::Histogram => {
                let macd = calculate_macd(&closes, &self.params)?;
                let signal = calculate_macd_signal(&closes, &self.params)?;
                Some(macd - signal)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        Self { period }
    }
}

impl Indicator for Rsi {
    fn name(&self) -> &str {
        RSI
    }

    fn min_bars(&self) -> usize {
        self.period + 1
    }

    fn compute(&self, series: &BarSeries) -> Option<f64> {
        calculate_rsi(&series.closes(), self.period)
    }
}

/// Resolve a configured indicator name to its implementation
///
/// Known names: `MACD`, `MACD_SIGNAL`, `MACD_HISTOGRAM` (12/26/9) and `RSI` (14).
pub fn indicator_by_name(name: &str) -> Option<Arc<dyn Indicator>> {
    let params = MacdParams::default();
    let indicator: Arc<dyn Indicator> = match name {
        MACD => Arc::new(Macd::line(params)),
        MACD_SIGNAL => Arc::new(Macd::signal(params)),
        MACD_HISTOGRAM => Arc::new(Macd::histogram(params)),
        RSI => Arc::new(Rsi::new(14)),
        _ => return None,
    };
    Some(indicator)
}

/// Compute a single indicator over a candle window
///
/// Returns `None` when history is insufficient or the candles are out of order.
pub fn compute(indicator: &dyn Indicator, candles: &[Candle], timeframe: Timeframe) -> Option<f64> {
    match BarSeries::from_candles(candles, timeframe) {
        Ok(series) => indicator.compute(&series),
        Err(e) => {
            tracing::warn!(indicator = indicator.name(), %timeframe, "Unusable candle window: {}", e);
            None
        }
    }
}

/// Indicator readings for one timeframe, immutable once built
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSet {
    timeframe: Timeframe,
    values: BTreeMap<String, Option<f64>>,
}

impl IndicatorSet {
    pub fn new<I, S>(timeframe: Timeframe, values: I) -> Self
    where
        I: IntoIterator<Item = (S, Option<f64>)>,
        S: Into<String>,
    {
        Self {
            timeframe,
            values: values.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    /// Reading for `name`, `None` if unknown or not available
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied().flatten()
    }

    pub fn is_available(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<f64>)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Daily and weekly readings produced once per tick
#[derive(Debug, Clone, PartialEq)]
pub struct MarketSnapshot {
    pub daily: IndicatorSet,
    pub weekly: IndicatorSet,
}

impl MarketSnapshot {
    pub fn indicators(&self, timeframe: Timeframe) -> &IndicatorSet {
        match timeframe {
            Timeframe::Daily => &self.daily,
            Timeframe::Weekly => &self.weekly,
        }
    }
}

/// Ordered list of indicators computed for every timeframe
#[derive(Clone, Default)]
pub struct IndicatorPipeline {
    indicators: Vec<Arc<dyn Indicator>>,
}

impl IndicatorPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// MACD, signal, histogram and RSI(14)
    pub fn standard() -> Self {
        let params = MacdParams::default();
        Self::new()
            .with(Macd::line(params))
            .with(Macd::signal(params))
            .with(Macd::histogram(params))
            .with(Rsi::new(14))
    }

    /// Build from configured names, returning every unknown name on failure
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, Vec<String>> {
        let mut pipeline = Self::new();
        let mut unknown = Vec::new();

        for name in names {
            match indicator_by_name(name.as_ref()) {
                Some(indicator) => pipeline.indicators.push(indicator),
                None => unknown.push(name.as_ref().to_string()),
            }
        }

        if unknown.is_empty() {
            Ok(pipeline)
        } else {
            Err(unknown)
        }
    }

    pub fn with(mut self, indicator: impl Indicator + 'static) -> Self {
        self.indicators.push(Arc::new(indicator));
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.indicators.iter().map(|i| i.name()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.indicators.iter().any(|i| i.name() == name)
    }

    /// Largest bar count any configured indicator needs
    pub fn max_lookback(&self) -> usize {
        self.indicators.iter().map(|i| i.min_bars()).max().unwrap_or(0)
    }

    pub fn compute(&self, candles: &[Candle], timeframe: Timeframe) -> IndicatorSet {
        let series = match BarSeries::from_candles(candles, timeframe) {
            Ok(series) => series,
            Err(e) => {
                tracing::warn!(%timeframe, "Unusable candle window, all readings unavailable: {}", e);
                return IndicatorSet::new(
                    timeframe,
                    self.indicators.iter().map(|i| (i.name(), None)),
                );
            }
        };

        IndicatorSet::new(
            timeframe,
            self.indicators
                .iter()
                .map(|i| (i.name(), i.compute(&series))),
        )
    }

    pub fn snapshot(&self, daily: &[Candle], weekly: &[Candle]) -> MarketSnapshot {
        MarketSnapshot {
            daily: self.compute(daily, Timeframe::Daily),
            weekly: self.compute(weekly, Timeframe::Weekly),
        }
    }
}

impl std::fmt::Debug for IndicatorPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
