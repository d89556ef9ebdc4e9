//! Momentum(n)[i] = C[i] / C[i-n] * 100
//!
//! 100 means unchanged over n bars. If C[i-n] == 0 the bar is invalid.
//! Warmup: first n bars invalid.

use crate::domain::candle::Candle;
use crate::domain::indicator::{IndicatorSeries, IndicatorType};

pub fn calculate_momentum(candles: &[Candle], period: usize) -> IndicatorSeries {
    let values = (0..candles.len())
        .map(|i| {
            if period == 0 || i < period {
                return None;
            }
            let reference = candles[i - period].close;
            if reference == 0.0 {
                None
            } else {
                Some(candles[i].close / reference * 100.0)
            }
        })
        .collect();

    IndicatorSeries::from_options(IndicatorType::Momentum(period), candles, values)
}
