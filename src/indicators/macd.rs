use super::moving_average::calculate_ema_series;
use serde::Deserialize;

/// MACD periods, in bars
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct MacdParams {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
}

impl Default for MacdParams {
    fn default() -> Self {
        Self {
            fast: 12,
            slow: 26,
            signal: 9,
        }
    }
}

impl MacdParams {
    /// Bars needed before the MACD line exists
    pub fn line_lookback(&self) -> usize {
        self.slow
    }

    /// Bars needed before the signal line exists
    pub fn signal_lookback(&self) -> usize {
        self.slow + self.signal - 1
    }

    fn is_valid(&self) -> bool {
        self.fast > 0 && self.signal > 0 && self.fast < self.slow
    }
}

/// MACD line (fast EMA - slow EMA), one value per bar from bar `slow` onwards
pub fn macd_line(closes: &[f64], params: &MacdParams) -> Vec<f64> {
    if !params.is_valid() {
        return Vec::new();
    }

    let fast = calculate_ema_series(closes, params.fast);
    let slow = calculate_ema_series(closes, params.slow);

    // fast starts `slow - fast` bars earlier than slow
    let offset = params.slow - params.fast;
    slow.iter()
        .enumerate()
        .filter_map(|(i, slow_ema)| fast.get(i + offset).map(|fast_ema| fast_ema - slow_ema))
        .collect()
}

/// Latest MACD line value
pub fn calculate_macd(closes: &[f64], params: &MacdParams) -> Option<f64> {
    macd_line(closes, params).last().copied()
}

/// Latest signal line value (EMA of the MACD line)
pub fn calculate_macd_signal(closes: &[f64], params: &MacdParams) -> Option<f64> {
    let line = macd_line(closes, params);
    calculate_ema_series(&line, params.signal).last().copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rising(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 + i as f64).collect()
    }

    #[test]
    fn test_macd_available_from_slow_period() {
        let params = MacdParams::default();

        assert!(calculate_macd(&rising(25), &params).is_none());
        assert!(calculate_macd(&rising(26), &params).is_some());
    }

    #[test]
    fn test_signal_needs_extra_bars() {
        let params = MacdParams::default();

        assert!(calculate_macd_signal(&rising(33), &params).is_none());
        assert!(calculate_macd_signal(&rising(34), &params).is_some());
        assert_eq!(params.signal_lookback(), 34);
    }

    #[test]
    fn test_macd_positive_in_uptrend() {
        let params = MacdParams::default();
        let macd = calculate_macd(&rising(40), &params).unwrap();

        assert!(macd > 0.0);
    }

    #[test]
    fn test_macd_flat_prices_is_zero() {
        let params = MacdParams::default();
        let closes = vec![50.0; 40];

        assert_eq!(calculate_macd(&closes, &params), Some(0.0));
        assert_eq!(calculate_macd_signal(&closes, &params), Some(0.0));
    }

    #[test]
    fn test_line_length() {
        let params = MacdParams::default();
        assert_eq!(macd_line(&rising(30), &params).len(), 5);
    }

    #[test]
    fn test_invalid_params_yield_nothing() {
        let params = MacdParams {
            fast: 26,
            slow: 12,
            signal: 9,
        };
        assert!(calculate_macd(&rising(40), &params).is_none());
    }
}
