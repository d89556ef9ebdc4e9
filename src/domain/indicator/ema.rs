//! Exponential Moving Average over closes or volumes.
//!
//! k = 2/(n+1), seed with first SMA, then EMA[i] = X[i]*k + EMA[i-1]*(1-k).
//! Warmup: first (n-1) bars are invalid.

use crate::domain::candle::Candle;
use crate::domain::indicator::{IndicatorSeries, IndicatorType};

pub fn calculate_ema(candles: &[Candle], period: usize) -> IndicatorSeries {
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    IndicatorSeries::from_options(
        IndicatorType::Ema(period),
        candles,
        ema_values(&closes, period),
    )
}

pub fn calculate_volume_ema(candles: &[Candle], period: usize) -> IndicatorSeries {
    let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();
    IndicatorSeries::from_options(
        IndicatorType::VolumeEma(period),
        candles,
        ema_values(&volumes, period),
    )
}

pub(crate) fn ema_values(input: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; input.len()];
    }

    let k = 2.0 / (period as f64 + 1.0);
    let mut values = Vec::with_capacity(input.len());
    let mut ema = 0.0;
    let mut sum = 0.0;

    for (i, &x) in input.iter().enumerate() {
        if i < period - 1 {
            sum += x;
            values.push(None);
        } else if i == period - 1 {
            sum += x;
            ema = sum / period as f64;
            values.push(Some(ema));
        } else {
            ema = x * k + ema * (1.0 - k);
            values.push(Some(ema));
        }
    }

    values
}
