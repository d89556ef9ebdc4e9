//! Candle representation and exchange timeframes.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::ScoretraderError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub turnover: f64,
}

impl Candle {
    /// (high + low + close) / 3
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    /// max(high - low, |high - prev_close|, |low - prev_close|)
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }
}

/// Rejects sequences whose open times are not strictly increasing.
pub fn check_order(candles: &[Candle]) -> Result<(), ScoretraderError> {
    for (i, pair) in candles.windows(2).enumerate() {
        if pair[1].open_time <= pair[0].open_time {
            return Err(ScoretraderError::CandleOrder { index: i + 1 });
        }
    }
    Ok(())
}

/// Kline interval as the exchange names it ("15", "60", "D", ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeframe {
    Minutes(u32),
    Day,
    Week,
}

impl Timeframe {
    pub fn duration(&self) -> Duration {
        match self {
            Timeframe::Minutes(m) => Duration::minutes(i64::from(*m)),
            Timeframe::Day => Duration::days(1),
            Timeframe::Week => Duration::weeks(1),
        }
    }

    /// Time at which a candle opened at `open_time` is complete.
    pub fn close_time(&self, open_time: DateTime<Utc>) -> DateTime<Utc> {
        open_time + self.duration()
    }
}

impl FromStr for Timeframe {
    type Err = ScoretraderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "D" | "d" => Ok(Timeframe::Day),
            "W" | "w" => Ok(Timeframe::Week),
            other => match other.parse::<u32>() {
                Ok(m @ (1 | 3 | 5 | 15 | 30 | 60 | 120 | 240 | 360 | 720)) => {
                    Ok(Timeframe::Minutes(m))
                }
                _ => Err(ScoretraderError::UnknownTimeframe {
                    value: s.to_string(),
                }),
            },
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timeframe::Minutes(m) => write!(f, "{}", m),
            Timeframe::Day => write!(f, "D"),
            Timeframe::Week => write!(f, "W"),
        }
    }
}

/// Index of the last higher-timeframe candle fully closed by the time the
/// base candle at `base_open` closes.
pub fn last_closed_index(
    higher: &[Candle],
    higher_tf: Timeframe,
    base_open: DateTime<Utc>,
    base_tf: Timeframe,
) -> Option<usize> {
    let base_close = base_tf.close_time(base_open);
    let count = higher.partition_point(|c| higher_tf.close_time(c.open_time) <= base_close);
    count.checked_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(minutes: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_704_067_200, 0).unwrap() + Duration::minutes(minutes)
    }

    fn sample_candle() -> Candle {
        Candle {
            open_time: at(0),
            open: 100.0,
            high: 110.0,
            low: 90.0,
            close: 105.0,
            volume: 50_000.0,
            turnover: 5_250_000.0,
        }
    }

    fn flat_candle(minutes: i64) -> Candle {
        Candle {
            open_time: at(minutes),
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 1.0,
            turnover: 1.0,
        }
    }

    #[test]
    fn typical_price() {
        let candle = sample_candle();
        let expected = (110.0 + 90.0 + 105.0) / 3.0;
        assert!((candle.typical_price() - expected).abs() < f64::EPSILON);
    }

    #[test]
    fn true_range_hl_dominates() {
        assert!((sample_candle().true_range(100.0) - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn true_range_gap_up() {
        // |110-70| = 40
        assert!((sample_candle().true_range(70.0) - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn true_range_gap_down() {
        // |90-130| = 40
        assert!((sample_candle().true_range(130.0) - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn colour() {
        let candle = sample_candle();
        assert!(candle.is_bullish());
        assert!(!candle.is_bearish());
        let doji = flat_candle(0);
        assert!(!doji.is_bullish());
        assert!(!doji.is_bearish());
    }

    #[test]
    fn order_check_rejects_duplicates() {
        let candles = vec![flat_candle(0), flat_candle(15), flat_candle(15)];
        match check_order(&candles) {
            Err(ScoretraderError::CandleOrder { index }) => assert_eq!(index, 2),
            other => panic!("expected CandleOrder, got {:?}", other),
        }
        assert!(check_order(&candles[..2]).is_ok());
    }

    #[test]
    fn timeframe_parse_and_display() {
        assert_eq!("15".parse::<Timeframe>().unwrap(), Timeframe::Minutes(15));
        assert_eq!("D".parse::<Timeframe>().unwrap(), Timeframe::Day);
        assert_eq!(Timeframe::Minutes(60).to_string(), "60");
        assert!("7".parse::<Timeframe>().is_err());
        assert!("hourly".parse::<Timeframe>().is_err());
    }

    #[test]
    fn higher_candle_usable_only_after_close() {
        let higher: Vec<Candle> = (0..3).map(|h| flat_candle(h * 60)).collect();
        let base = Timeframe::Minutes(15);
        let hour = Timeframe::Minutes(60);

        // base bar 00:30-00:45: the 00:00 hour is still forming
        assert_eq!(last_closed_index(&higher, hour, at(30), base), None);
        // base bar 00:45-01:00 closes with the first hour
        assert_eq!(last_closed_index(&higher, hour, at(45), base), Some(0));
        assert_eq!(last_closed_index(&higher, hour, at(100), base), Some(0));
        assert_eq!(last_closed_index(&higher, hour, at(165), base), Some(2));
    }
}
