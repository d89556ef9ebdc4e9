//! RSI (Relative Strength Index).
//!
//! Uses Wilder's smoothing for average gain/loss calculation:
//! - First average: simple mean of gains/losses over first n changes
//! - Subsequent: avg = (prev_avg * (n-1) + current) / n
//!
//! Formula: RSI = 100 - (100 / (1 + avg_gain / avg_loss))
//! If avg_loss == 0: RSI = 100 (this includes a perfectly flat run).
//!
//! Warmup: first n bars are invalid (need n price changes to compute initial average).

use crate::domain::candle::Candle;
use crate::domain::indicator::{IndicatorSeries, IndicatorType};

pub fn calculate_rsi(candles: &[Candle], period: usize) -> IndicatorSeries {
    let mut values = vec![None; candles.len()];
    if period == 0 || candles.len() <= period {
        return IndicatorSeries::from_options(IndicatorType::Rsi(period), candles, values);
    }

    let changes: Vec<f64> = candles.windows(2).map(|w| w[1].close - w[0].close).collect();
    let gain = |c: f64| if c > 0.0 { c } else { 0.0 };
    let loss = |c: f64| if c < 0.0 { -c } else { 0.0 };

    let mut avg_gain = changes[..period].iter().map(|&c| gain(c)).sum::<f64>() / period as f64;
    let mut avg_loss = changes[..period].iter().map(|&c| loss(c)).sum::<f64>() / period as f64;
    values[period] = Some(rsi_from(avg_gain, avg_loss));

    for i in (period + 1)..candles.len() {
        let change = changes[i - 1];
        avg_gain = (avg_gain * (period - 1) as f64 + gain(change)) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + loss(change)) / period as f64;
        values[i] = Some(rsi_from(avg_gain, avg_loss));
    }

    IndicatorSeries::from_options(IndicatorType::Rsi(period), candles, values)
}

fn rsi_from(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        100.0
    } else {
        (100.0 - (100.0 / (1.0 + avg_gain / avg_loss))).clamp(0.0, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_support::candles_from_closes;
    use proptest::prelude::*;

    #[test]
    fn rsi_empty() {
        assert!(calculate_rsi(&[], 14).is_empty());
    }

    #[test]
    fn rsi_warmup_period() {
        let closes: Vec<f64> = (1..=15).map(|i| 100.0 + (i as f64 % 5.0) * 2.0).collect();
        let series = calculate_rsi(&candles_from_closes(&closes), 14);

        assert_eq!(series.len(), 15);
        for i in 0..14 {
            assert!(!series.values[i].valid, "bar {} should be invalid", i);
        }
        assert!(series.values[14].valid);
    }

    #[test]
    fn rsi_all_gains_is_100() {
        let closes: Vec<f64> = (0..15).map(|i| 100.0 + i as f64).collect();
        let series = calculate_rsi(&candles_from_closes(&closes), 14);
        assert!((series.value_at(14).unwrap() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rsi_all_losses_is_0() {
        let closes: Vec<f64> = (0..15).map(|i| 100.0 - i as f64).collect();
        let series = calculate_rsi(&candles_from_closes(&closes), 14);
        assert!(series.value_at(14).unwrap().abs() < f64::EPSILON);
    }

    #[test]
    fn rsi_flat_run_maps_to_100() {
        let series = calculate_rsi(&candles_from_closes(&[50.0; 20]), 14);
        assert_eq!(series.value_at(19), Some(100.0));
    }

    #[test]
    fn rsi_balanced_moves_is_50() {
        let closes: Vec<f64> = (0..21)
            .map(|i| if i % 2 == 0 { 100.0 } else { 101.0 })
            .collect();
        let series = calculate_rsi(&candles_from_closes(&closes), 10);
        // alternating unit steps settle near 100 * (n-1) / (2n-1) after a down step
        let v = series.value_at(20).unwrap();
        assert!(v > 40.0 && v < 60.0, "rsi {}", v);
    }

    #[test]
    fn rsi_zero_period() {
        let series = calculate_rsi(&candles_from_closes(&[100.0, 101.0]), 0);
        assert_eq!(series.len(), 2);
        assert!(series.values.iter().all(|p| !p.valid));
    }

    proptest! {
        #[test]
        fn rsi_bounded(closes in prop::collection::vec(0.01f64..1000.0, 2..80), period in 1usize..20) {
            let series = calculate_rsi(&candles_from_closes(&closes), period);
            for point in series.values.iter().filter(|p| p.valid) {
                prop_assert!((0.0..=100.0).contains(&point.value), "rsi {}", point.value);
            }
        }
    }
}
