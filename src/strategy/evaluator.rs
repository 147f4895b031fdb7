use super::conditions::Condition;
use super::trailing_stop::TrailingStopTracker;
use crate::error::ConfigurationError;
use crate::indicators::MarketSnapshot;
use crate::models::{Direction, ExitReason, TradeDecision};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Turns a snapshot plus trailing-stop state into a trade decision
///
/// While flat: ENTER when every entry condition holds.
/// While in a position: EXIT on the trailing stop first, then on the first exit
/// condition that holds. Anything else is HOLD.
#[derive(Debug, Clone)]
pub struct RuleEvaluator {
    entry_conditions: Vec<Arc<dyn Condition>>,
    exit_conditions: Vec<Arc<dyn Condition>>,
    direction: Direction,
}

impl RuleEvaluator {
    pub fn new(
        entry_conditions: Vec<Arc<dyn Condition>>,
        exit_conditions: Vec<Arc<dyn Condition>>,
        direction: Direction,
    ) -> Result<Self, ConfigurationError> {
        ConfigurationError::check(Self::validate(&entry_conditions, &exit_conditions))?;

        Ok(Self {
            entry_conditions,
            exit_conditions,
            direction,
        })
    }

    /// Violations in a pair of condition sets
    pub fn validate(
        entry_conditions: &[Arc<dyn Condition>],
        exit_conditions: &[Arc<dyn Condition>],
    ) -> Vec<String> {
        let mut violations = Vec::new();
        if entry_conditions.is_empty() {
            violations.push("entry conditions must not be empty".to_string());
        }
        if exit_conditions.is_empty() {
            violations.push("exit conditions must not be empty".to_string());
        }
        violations
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn entry_conditions(&self) -> &[Arc<dyn Condition>] {
        &self.entry_conditions
    }

    pub fn exit_conditions(&self) -> &[Arc<dyn Condition>] {
        &self.exit_conditions
    }

    pub fn evaluate(
        &self,
        snapshot: &MarketSnapshot,
        tracker: &TrailingStopTracker,
        current_price: Decimal,
    ) -> TradeDecision {
        if !tracker.is_open() {
            let all_entries_hold = self
                .entry_conditions
                .iter()
                .all(|condition| condition.is_satisfied(snapshot));

            return if all_entries_hold {
                TradeDecision::Enter(self.direction)
            } else {
                TradeDecision::Hold
            };
        }

        if tracker.check_trigger(current_price) {
            if let Some(stop_price) = tracker.stop_price() {
                return TradeDecision::Exit(ExitReason::TrailingStop { stop_price });
            }
        }

        self.exit_conditions
            .iter()
            .find(|condition| condition.is_satisfied(snapshot))
            .map(|condition| {
                TradeDecision::Exit(ExitReason::Condition {
                    name: condition.name(),
                })
            })
            .unwrap_or(TradeDecision::Hold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::IndicatorSet;
    use crate::models::Timeframe;
    use crate::strategy::conditions::{Comparison, IndicatorComparison};
    use rust_decimal_macros::dec;

    fn snapshot(macd: f64, signal: f64, rsi: f64, weekly_macd: f64) -> MarketSnapshot {
        MarketSnapshot {
            daily: IndicatorSet::new(
                Timeframe::Daily,
                vec![("MACD", Some(macd)), ("MACD_SIGNAL", Some(signal)), ("RSI", Some(rsi))],
            ),
            weekly: IndicatorSet::new(Timeframe::Weekly, vec![("MACD", Some(weekly_macd))]),
        }
    }

    fn evaluator() -> RuleEvaluator {
        let entry: Vec<Arc<dyn Condition>> = vec![
            Arc::new(IndicatorComparison::above_indicator(Timeframe::Daily, "MACD", "MACD_SIGNAL")),
            Arc::new(IndicatorComparison::against_constant(
                Timeframe::Weekly,
                "MACD",
                Comparison::Above,
                0.0,
            )),
        ];
        let exit: Vec<Arc<dyn Condition>> = vec![
            Arc::new(IndicatorComparison::against_constant(
                Timeframe::Daily,
                "RSI",
                Comparison::Above,
                70.0,
            )),
            Arc::new(IndicatorComparison::new(
                Timeframe::Daily,
                "MACD",
                Comparison::Below,
                crate::strategy::conditions::Operand::Indicator("MACD_SIGNAL".to_string()),
            )),
        ];
        RuleEvaluator::new(entry, exit, Direction::Long).unwrap()
    }

    fn flat() -> TrailingStopTracker {
        TrailingStopTracker::new(dec!(2.0)).unwrap()
    }

    fn open_at(price: Decimal) -> TrailingStopTracker {
        let mut tracker = flat();
        tracker.initialize(Direction::Long, price).unwrap();
        tracker
    }

    #[test]
    fn test_enter_when_all_entry_conditions_hold() {
        let decision = evaluator().evaluate(&snapshot(2.0, 1.0, 50.0, 1.0), &flat(), dec!(100));
        assert_eq!(decision, TradeDecision::Enter(Direction::Long));
    }

    #[test]
    fn test_hold_when_any_entry_condition_fails() {
        let weekly_down = evaluator().evaluate(&snapshot(2.0, 1.0, 50.0, -1.0), &flat(), dec!(100));
        let daily_down = evaluator().evaluate(&snapshot(0.5, 1.0, 50.0, 1.0), &flat(), dec!(100));

        assert_eq!(weekly_down, TradeDecision::Hold);
        assert_eq!(daily_down, TradeDecision::Hold);
    }

    #[test]
    fn test_exit_when_any_exit_condition_holds() {
        let decision = evaluator().evaluate(&snapshot(2.0, 1.0, 75.0, 1.0), &open_at(dec!(100)), dec!(101));

        assert_eq!(
            decision,
            TradeDecision::Exit(ExitReason::Condition {
                name: "daily RSI > 70".to_string()
            })
        );
    }

    #[test]
    fn test_hold_in_position_without_exit_signal() {
        let decision = evaluator().evaluate(&snapshot(2.0, 1.0, 50.0, 1.0), &open_at(dec!(100)), dec!(99));
        assert_eq!(decision, TradeDecision::Hold);
    }

    #[test]
    fn test_trailing_stop_takes_precedence() {
        // RSI exit also holds, but the stop is reported
        let decision = evaluator().evaluate(&snapshot(0.5, 1.0, 75.0, 1.0), &open_at(dec!(100)), dec!(97));

        assert_eq!(
            decision,
            TradeDecision::Exit(ExitReason::TrailingStop { stop_price: dec!(98) })
        );
    }

    #[test]
    fn test_empty_exit_conditions_rejected() {
        let entry: Vec<Arc<dyn Condition>> = vec![Arc::new(IndicatorComparison::above_indicator(
            Timeframe::Daily,
            "MACD",
            "MACD_SIGNAL",
        ))];

        let err = RuleEvaluator::new(entry, Vec::new(), Direction::Long).unwrap_err();
        assert!(err.to_string().contains("exit conditions"));
    }

    #[test]
    fn test_both_empty_sets_reported_together() {
        let err = RuleEvaluator::new(Vec::new(), Vec::new(), Direction::Short).unwrap_err();
        assert_eq!(err.violations.len(), 2);
    }
}
