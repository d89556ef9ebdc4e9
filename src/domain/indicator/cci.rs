//! CCI (Commodity Channel Index).
//!
//! CCI = (TP - SMA(TP, n)) / (0.015 * MAD), MAD being the mean absolute
//! deviation of TP around its SMA. A window with MAD == 0 yields 0.
//! Warmup: first (n-1) bars invalid.

use crate::domain::candle::Candle;
use crate::domain::indicator::{IndicatorSeries, IndicatorType};

const LAMBERT: f64 = 0.015;

pub fn calculate_cci(candles: &[Candle], period: usize) -> IndicatorSeries {
    let tp: Vec<f64> = candles.iter().map(Candle::typical_price).collect();

    let values = (0..candles.len())
        .map(|i| {
            if period == 0 || i + 1 < period {
                return None;
            }
            let window = &tp[i + 1 - period..=i];
            let sma = window.iter().sum::<f64>() / period as f64;
            let mad = window.iter().map(|x| (x - sma).abs()).sum::<f64>() / period as f64;
            if mad == 0.0 {
                Some(0.0)
            } else {
                Some((tp[i] - sma) / (LAMBERT * mad))
            }
        })
        .collect();

    IndicatorSeries::from_options(IndicatorType::Cci(period), candles, values)
}
