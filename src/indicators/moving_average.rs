/// Exponential Moving Average series, seeded with the SMA of the first `period` values
///
/// Element `i` of the result is the EMA at `values[period - 1 + i]`. Returns an
/// empty vector when there are fewer than `period` values.
pub fn calculate_ema_series(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let seed = values[..period].iter().sum::<f64>() / period as f64;

    let mut series = Vec::with_capacity(values.len() - period + 1);
    series.push(seed);

    let mut ema = seed;
    for value in &values[period..] {
        ema = (value - ema) * multiplier + ema;
        series.push(ema);
    }

    series
}
