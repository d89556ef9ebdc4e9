//! ADX (Average Directional Index).
//!
//! +DM[i] = H[i]-H[i-1] when it exceeds L[i-1]-L[i] and is positive, else 0.
//! -DM[i] = L[i-1]-L[i] when it exceeds H[i]-H[i-1] and is positive, else 0.
//! +DI = 100 * sum(+DM, n) / (sum(ATR, n) + eps), -DI likewise.
//! DX = 100 * |+DI - -DI| / (+DI + -DI + eps); ADX = mean(DX, n).
//!
//! Warmup: ATR needs n-1 bars, its rolling sum another n-1, the DX mean
//! another n-1, so the first 3(n-1) bars are invalid.

use crate::domain::candle::Candle;
use crate::domain::indicator::atr::{rolling_mean, rolling_sum, true_ranges};
use crate::domain::indicator::{EPSILON, IndicatorSeries, IndicatorType};

pub fn calculate_adx(candles: &[Candle], period: usize) -> IndicatorSeries {
    let values = if period == 0 {
        vec![None; candles.len()]
    } else {
        adx_values(candles, period)
    };
    IndicatorSeries::from_options(IndicatorType::Adx(period), candles, values)
}

fn adx_values(candles: &[Candle], period: usize) -> Vec<Option<f64>> {
    let (plus_dm, minus_dm) = directional_movement(candles);
    let atr = rolling_mean(&true_ranges(candles), period);
    let atr_sum = rolling_sum_valid(&atr, period);
    let plus_sum = rolling_sum(&plus_dm, period);
    let minus_sum = rolling_sum(&minus_dm, period);

    let dx: Vec<Option<f64>> = (0..candles.len())
        .map(|i| {
            let atr_sum = atr_sum[i]?;
            let pdi = 100.0 * plus_sum[i]? / (atr_sum + EPSILON);
            let mdi = 100.0 * minus_sum[i]? / (atr_sum + EPSILON);
            Some(100.0 * (pdi - mdi).abs() / (pdi + mdi + EPSILON))
        })
        .collect();

    rolling_sum_valid(&dx, period)
        .into_iter()
        .map(|sum| sum.map(|s| s / period as f64))
        .collect()
}

fn directional_movement(candles: &[Candle]) -> (Vec<f64>, Vec<f64>) {
    let mut plus = vec![0.0; candles.len()];
    let mut minus = vec![0.0; candles.len()];
    for i in 1..candles.len() {
        let up = candles[i].high - candles[i - 1].high;
        let down = candles[i - 1].low - candles[i].low;
        if up > down && up > 0.0 {
            plus[i] = up;
        }
        if down > up && down > 0.0 {
            minus[i] = down;
        }
    }
    (plus, minus)
}

/// Trailing sum that is valid only when every value in the window is.
fn rolling_sum_valid(input: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    (0..input.len())
        .map(|i| {
            if i + 1 < period {
                return None;
            }
            input[i + 1 - period..=i].iter().copied().sum::<Option<f64>>()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_support::{candle, wavy_candles};

    fn trending(count: usize, step: f64) -> Vec<Candle> {
        (0..count)
            .map(|i| {
                let base = 100.0 + i as f64 * step;
                candle(i, base, base + 1.0, base - 1.0, base, 1000.0)
            })
            .collect()
    }

    #[test]
    fn adx_warmup_is_three_periods() {
        let series = calculate_adx(&wavy_candles(40), 5);
        for i in 0..12 {
            assert!(!series.values[i].valid, "bar {} should be invalid", i);
        }
        assert!(series.values[12].valid);
    }

    #[test]
    fn strong_uptrend_has_high_adx() {
        let series = calculate_adx(&trending(60, 2.0), 14);
        let v = series.value_at(59).unwrap();
        // -DM is zero throughout, so DX saturates
        assert!(v > 99.0, "adx {}", v);
    }

    #[test]
    fn flat_market_has_zero_adx() {
        let candles: Vec<Candle> = (0..50).map(|i| candle(i, 10.0, 11.0, 9.0, 10.0, 1.0)).collect();
        let series = calculate_adx(&candles, 5);
        assert!(series.value_at(49).unwrap().abs() < 1e-9);
    }

    #[test]
    fn adx_bounded() {
        let series = calculate_adx(&wavy_candles(150), 14);
        for point in series.values.iter().filter(|p| p.valid) {
            assert!((0.0..=100.0).contains(&point.value), "adx {}", point.value);
        }
    }

    #[test]
    fn directional_movement_picks_larger_side() {
        let candles = vec![
            candle(0, 10.0, 12.0, 8.0, 10.0, 1.0),
            // up 3, down -1
            candle(1, 12.0, 15.0, 9.0, 14.0, 1.0),
            // up -2, down 4
            candle(2, 10.0, 13.0, 5.0, 6.0, 1.0),
        ];
        let (plus, minus) = directional_movement(&candles);
        assert_eq!(plus, vec![0.0, 3.0, 0.0]);
        assert_eq!(minus, vec![0.0, 0.0, 4.0]);
    }

    #[test]
    fn adx_zero_period() {
        let series = calculate_adx(&wavy_candles(10), 0);
        assert!(series.values.iter().all(|p| !p.valid));
    }
}
