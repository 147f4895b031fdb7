use crate::models::{Candle, Timeframe};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SeriesError {
    #[error("candle {index} closes at or before its predecessor")]
    OutOfOrder { index: usize },
}

// 1970-01-05T00:00:00Z
const FIRST_MONDAY_SECS: i64 = 4 * 86_400;

/// One bar of a [`BarSeries`]
#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub end_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// Candles bucketed into bars of one timeframe
///
/// Buckets are aligned to Monday 00:00 UTC, so daily candles map one-to-one
/// onto daily bars and daily candles roll up into Monday-based weekly bars.
#[derive(Debug, Clone)]
pub struct BarSeries {
    timeframe: Timeframe,
    bars: Vec<Bar>,
}

impl BarSeries {
    pub fn from_candles(candles: &[Candle], timeframe: Timeframe) -> Result<Self, SeriesError> {
        if let Some(index) = candles
            .windows(2)
            .position(|pair| pair[1].close_time <= pair[0].close_time)
        {
            return Err(SeriesError::OutOfOrder { index: index + 1 });
        }

        let bucket_secs = timeframe.bar_duration().num_seconds();

        let mut bars: Vec<Bar> = Vec::new();
        let mut current_bucket = None;

        for candle in candles {
            let bucket = (candle.open_time.timestamp() - FIRST_MONDAY_SECS).div_euclid(bucket_secs);

            match bars.last_mut() {
                Some(bar) if current_bucket == Some(bucket) => {
                    bar.end_time = candle.close_time;
                    bar.high = bar.high.max(candle.high);
                    bar.low = bar.low.min(candle.low);
                    bar.close = candle.close;
                    bar.volume += candle.volume;
                }
                _ => {
                    bars.push(Bar {
                        end_time: candle.close_time,
                        open: candle.open,
                        high: candle.high,
                        low: candle.low,
                        close: candle.close,
                        volume: candle.volume,
                    });
                    current_bucket = Some(bucket);
                }
            }
        }

        Ok(Self { timeframe, bars })
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    /// Close prices as floats for the indicator math
    pub fn closes(&self) -> Vec<f64> {
        self.bars
            .iter()
            .map(|bar| bar.close.to_f64().unwrap_or_default())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn daily_candle(day: i64, close: Decimal) -> Candle {
        // 2024-01-01 is a Monday
        let open_time = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(day);
        Candle {
            open_time,
            close_time: open_time + Duration::days(1) - Duration::milliseconds(1),
            open: close,
            high: close + dec!(1),
            low: close - dec!(1),
            close,
            volume: dec!(10),
        }
    }

    #[test]
    fn test_daily_candles_map_one_to_one() {
        let candles: Vec<Candle> = (0..5).map(|d| daily_candle(d, dec!(100) + Decimal::from(d))).collect();
        let series = BarSeries::from_candles(&candles, Timeframe::Daily).unwrap();

        assert_eq!(series.len(), 5);
        assert_eq!(series.closes(), vec![100.0, 101.0, 102.0, 103.0, 104.0]);
    }

    #[test]
    fn test_daily_candles_roll_up_into_weeks() {
        let candles: Vec<Candle> = (0..10).map(|d| daily_candle(d, dec!(100) + Decimal::from(d))).collect();
        let series = BarSeries::from_candles(&candles, Timeframe::Weekly).unwrap();

        assert_eq!(series.len(), 2);
        let first = &series.bars()[0];
        assert_eq!(first.open, dec!(100));
        assert_eq!(first.close, dec!(106));
        assert_eq!(first.high, dec!(107));
        assert_eq!(first.low, dec!(99));
        assert_eq!(first.volume, dec!(70));
        assert_eq!(series.bars()[1].close, dec!(109));
    }

    #[test]
    fn test_out_of_order_candles_rejected() {
        let candles = vec![daily_candle(1, dec!(100)), daily_candle(0, dec!(101))];
        let result = BarSeries::from_candles(&candles, Timeframe::Daily);

        assert_eq!(result.unwrap_err(), SeriesError::OutOfOrder { index: 1 });
    }

    #[test]
    fn test_empty_input() {
        let series = BarSeries::from_candles(&[], Timeframe::Daily).unwrap();
        assert!(series.is_empty());
    }
}
