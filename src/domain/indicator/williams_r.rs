//! Williams %R = -100 * (HH - C) / (HH - LL + eps) over the last n bars.
//!
//! Range [-100, 0]. Warmup: first (n-1) bars invalid.

use crate::domain::candle::Candle;
use crate::domain::indicator::{EPSILON, IndicatorSeries, IndicatorType};

pub fn calculate_williams_r(candles: &[Candle], period: usize) -> IndicatorSeries {
    let values = (0..candles.len())
        .map(|i| {
            if period == 0 || i + 1 < period {
                return None;
            }
            let window = &candles[i + 1 - period..=i];
            let highest = window.iter().map(|c| c.high).fold(f64::MIN, f64::max);
            let lowest = window.iter().map(|c| c.low).fold(f64::MAX, f64::min);
            Some(-100.0 * (highest - candles[i].close) / (highest - lowest + EPSILON))
        })
        .collect();

    IndicatorSeries::from_options(IndicatorType::WilliamsR(period), candles, values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_support::{candle, wavy_candles};

    #[test]
    fn close_at_high_is_zero_and_at_low_is_minus_100() {
        let candles = vec![
            candle(0, 10.0, 12.0, 8.0, 10.0, 1.0),
            candle(1, 10.0, 14.0, 9.0, 14.0, 1.0),
            candle(2, 10.0, 11.0, 6.0, 6.0, 1.0),
        ];
        let series = calculate_williams_r(&candles, 2);
        assert!(series.value_at(1).unwrap().abs() < 1e-6);
        assert!((series.value_at(2).unwrap() + 100.0).abs() < 1e-6);
    }

    #[test]
    fn williams_bounded() {
        let series = calculate_williams_r(&wavy_candles(80), 14);
        for point in series.values.iter().filter(|p| p.valid) {
            assert!((-100.0..=0.0).contains(&point.value), "%R {}", point.value);
        }
    }

    #[test]
    fn flat_window_does_not_divide_by_zero() {
        let candles: Vec<Candle> = (0..4).map(|i| candle(i, 5.0, 5.0, 5.0, 5.0, 1.0)).collect();
        let series = calculate_williams_r(&candles, 3);
        assert_eq!(series.value_at(3), Some(0.0));
    }
}
