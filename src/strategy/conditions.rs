use crate::indicators::MarketSnapshot;
use crate::models::Timeframe;
use serde::Deserialize;
use std::fmt;

/// Predicate over a market snapshot
pub trait Condition: Send + Sync + fmt::Debug {
    /// Human-readable label, carried in exit reasons
    fn name(&self) -> String;

    fn is_satisfied(&self, snapshot: &MarketSnapshot) -> bool;

    /// Indicators this condition reads, for configuration checks
    fn referenced_indicators(&self) -> Vec<(Timeframe, &str)> {
        Vec::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Above,
    AtLeast,
    Below,
    AtMost,
}

impl Comparison {
    fn holds(&self, left: f64, right: f64) -> bool {
        match self {
            Comparison::Above => left > right,
            Comparison::AtLeast => left >= right,
            Comparison::Below => left < right,
            Comparison::AtMost => left <= right,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Comparison::Above => ">",
            Comparison::AtLeast => ">=",
            Comparison::Below => "<",
            Comparison::AtMost => "<=",
        };
        write!(f, "{}", symbol)
    }
}

/// Right-hand side of a comparison: another indicator or a constant
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    Constant(f64),
    Indicator(String),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Constant(value) => write!(f, "{}", value),
            Operand::Indicator(name) => write!(f, "{}", name),
        }
    }
}

/// `<timeframe> <indicator> <op> <operand>`, e.g. daily MACD > MACD_SIGNAL
///
/// False whenever either side is not available.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IndicatorComparison {
    pub timeframe: Timeframe,
    pub indicator: String,
    #[serde(rename = "op")]
    pub comparison: Comparison,
    #[serde(rename = "value")]
    pub operand: Operand,
}

impl IndicatorComparison {
    pub fn new(
        timeframe: Timeframe,
        indicator: impl Into<String>,
        comparison: Comparison,
        operand: Operand,
    ) -> Self {
        Self {
            timeframe,
            indicator: indicator.into(),
            comparison,
            operand,
        }
    }

    pub fn above_indicator(timeframe: Timeframe, indicator: &str, other: &str) -> Self {
        Self::new(timeframe, indicator, Comparison::Above, Operand::Indicator(other.to_string()))
    }

    pub fn against_constant(timeframe: Timeframe, indicator: &str, comparison: Comparison, value: f64) -> Self {
        Self::new(timeframe, indicator, comparison, Operand::Constant(value))
    }
}

impl Condition for IndicatorComparison {
    fn name(&self) -> String {
        format!(
            "{} {} {} {}",
            self.timeframe, self.indicator, self.comparison, self.operand
        )
    }

    fn is_satisfied(&self, snapshot: &MarketSnapshot) -> bool {
        let set = snapshot.indicators(self.timeframe);

        let Some(left) = set.get(&self.indicator) else {
            return false;
        };
        let right = match &self.operand {
            Operand::Constant(value) => Some(*value),
            Operand::Indicator(name) => set.get(name),
        };

        right.is_some_and(|right| self.comparison.holds(left, right))
    }

    fn referenced_indicators(&self) -> Vec<(Timeframe, &str)> {
        let mut names = vec![(self.timeframe, self.indicator.as_str())];
        if let Operand::Indicator(name) = &self.operand {
            names.push((self.timeframe, name.as_str()));
        }
        names
    }
}
