//! ATR (Average True Range) as a rolling mean of true range.
//!
//! TR[0] = high - low; TR[i] = max(H-L, |H-C[i-1]|, |L-C[i-1]|).
//! ATR[i] = mean(TR[i-n+1..=i]). Warmup: first (n-1) bars invalid.

use crate::domain::candle::Candle;
use crate::domain::indicator::{IndicatorSeries, IndicatorType};

pub fn calculate_atr(candles: &[Candle], period: usize) -> IndicatorSeries {
    IndicatorSeries::from_options(
        IndicatorType::Atr(period),
        candles,
        rolling_mean(&true_ranges(candles), period),
    )
}

pub(crate) fn true_ranges(candles: &[Candle]) -> Vec<f64> {
    candles
        .iter()
        .enumerate()
        .map(|(i, candle)| {
            if i == 0 {
                candle.high - candle.low
            } else {
                candle.true_range(candles[i - 1].close)
            }
        })
        .collect()
}

/// Mean of each trailing window of `period` values, recomputed per window
/// so that a value never depends on how long the input is.
pub(crate) fn rolling_mean(input: &[f64], period: usize) -> Vec<Option<f64>> {
    rolling_sum(input, period)
        .into_iter()
        .map(|sum| sum.map(|s| s / period as f64))
        .collect()
}

pub(crate) fn rolling_sum(input: &[f64], period: usize) -> Vec<Option<f64>> {
    (0..input.len())
        .map(|i| {
            if period == 0 || i + 1 < period {
                None
            } else {
                Some(input[i + 1 - period..=i].iter().sum::<f64>())
            }
        })
        .collect()
}
