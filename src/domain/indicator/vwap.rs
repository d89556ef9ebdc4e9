//! Rolling VWAP: sum(close * volume, n) / sum(volume, n).
//!
//! Invalid during the first (n-1) bars and whenever the window has no volume.

use crate::domain::candle::Candle;
use crate::domain::indicator::atr::rolling_sum;
use crate::domain::indicator::{IndicatorSeries, IndicatorType};

pub fn calculate_vwap(candles: &[Candle], period: usize) -> IndicatorSeries {
    let weighted: Vec<f64> = candles.iter().map(|c| c.close * c.volume).collect();
    let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();

    let values = rolling_sum(&weighted, period)
        .into_iter()
        .zip(rolling_sum(&volumes, period))
        .map(|(num, den)| match (num, den) {
            (Some(num), Some(den)) if den > 0.0 => Some(num / den),
            _ => None,
        })
        .collect();

    IndicatorSeries::from_options(IndicatorType::Vwap(period), candles, values)
}
