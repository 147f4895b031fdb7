// Trading strategy module
// Entry/exit conditions, the rule evaluator and the trailing stop
pub mod conditions;
pub mod evaluator;
pub mod trailing_stop;

pub use conditions::{Comparison, Condition, IndicatorComparison, Operand};
pub use evaluator::RuleEvaluator;
pub use trailing_stop::{TrackerError, TrailingStopState, TrailingStopTracker};
