//! Indicator feed: turns a candle series into an aligned indicator set and
//! point-in-time snapshots for the scorer.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::domain::candle::Candle;
use crate::domain::error::ScoretraderError;
use crate::domain::indicator::{IndicatorSeries, IndicatorType, compute_indicators};

/// Lookback periods for every indicator the scorer reads.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorPeriods {
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub ema_trend: usize,
    pub rsi: usize,
    pub atr: usize,
    pub adx: usize,
    pub cci: usize,
    pub vwap: usize,
    pub williams_r: usize,
    pub momentum: usize,
    pub volume_ema: usize,
}

impl Default for IndicatorPeriods {
    fn default() -> Self {
        Self {
            ema_fast: 9,
            ema_slow: 21,
            ema_trend: 200,
            rsi: 14,
            atr: 14,
            adx: 14,
            cci: 20,
            vwap: 20,
            williams_r: 14,
            momentum: 10,
            volume_ema: 20,
        }
    }
}

impl IndicatorPeriods {
    pub fn types(&self) -> Vec<IndicatorType> {
        vec![
            IndicatorType::Ema(self.ema_fast),
            IndicatorType::Ema(self.ema_slow),
            IndicatorType::Ema(self.ema_trend),
            IndicatorType::Rsi(self.rsi),
            IndicatorType::Atr(self.atr),
            IndicatorType::Adx(self.adx),
            IndicatorType::Cci(self.cci),
            IndicatorType::Vwap(self.vwap),
            IndicatorType::WilliamsR(self.williams_r),
            IndicatorType::Momentum(self.momentum),
            IndicatorType::VolumeEma(self.volume_ema),
        ]
    }

    /// Longest lookback across all configured indicators.
    pub fn warmup(&self) -> usize {
        self.types().iter().map(IndicatorType::lookback).max().unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
pub struct IndicatorFeed {
    periods: IndicatorPeriods,
}

impl IndicatorFeed {
    pub fn new(periods: IndicatorPeriods) -> Self {
        Self { periods }
    }

    pub fn compute(&self, candles: &[Candle]) -> IndicatorSet {
        IndicatorSet {
            periods: self.periods.clone(),
            series: compute_indicators(candles, &self.periods.types()),
            len: candles.len(),
        }
    }
}

/// Every indicator value at one bar. `None` marks a value that is not
/// available at this bar and must not be scored.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub ema_fast: Option<f64>,
    pub ema_slow: Option<f64>,
    pub ema_trend: Option<f64>,
    pub rsi: Option<f64>,
    pub atr: Option<f64>,
    pub adx: Option<f64>,
    pub cci: Option<f64>,
    pub vwap: Option<f64>,
    pub williams_r: Option<f64>,
    pub momentum: Option<f64>,
    pub volume_ema: Option<f64>,
    /// Consecutive bullish candles ending at this bar.
    pub bull_run: usize,
    /// Consecutive bearish candles ending at this bar.
    pub bear_run: usize,
}

/// EMA stack of a higher-timeframe candle.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendView {
    pub open_time: DateTime<Utc>,
    pub close: f64,
    pub ema_fast: Option<f64>,
    pub ema_slow: Option<f64>,
    pub ema_trend: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct IndicatorSet {
    periods: IndicatorPeriods,
    series: HashMap<IndicatorType, IndicatorSeries>,
    len: usize,
}

impl IndicatorSet {
    pub fn warmup(&self) -> usize {
        self.periods.warmup()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn value(&self, indicator_type: IndicatorType, index: usize) -> Option<f64> {
        self.series
            .get(&indicator_type)
            .and_then(|s| s.value_at(index))
    }

    /// Snapshot of bar `index`, refused while the set is still warming up.
    pub fn snapshot(&self, candles: &[Candle], index: usize) -> Result<Snapshot, ScoretraderError> {
        let need = self.warmup() + 1;
        if index >= candles.len() || index >= self.len {
            return Err(ScoretraderError::InsufficientHistory {
                have: candles.len().min(self.len),
                need: index + 1,
            });
        }
        if index + 1 < need {
            return Err(ScoretraderError::InsufficientHistory {
                have: index + 1,
                need,
            });
        }

        let p = &self.periods;
        let candle = &candles[index];
        Ok(Snapshot {
            open_time: candle.open_time,
            open: candle.open,
            high: candle.high,
            low: candle.low,
            close: candle.close,
            volume: candle.volume,
            ema_fast: self.value(IndicatorType::Ema(p.ema_fast), index),
            ema_slow: self.value(IndicatorType::Ema(p.ema_slow), index),
            ema_trend: self.value(IndicatorType::Ema(p.ema_trend), index),
            rsi: self.value(IndicatorType::Rsi(p.rsi), index),
            atr: self.value(IndicatorType::Atr(p.atr), index),
            adx: self.value(IndicatorType::Adx(p.adx), index),
            cci: self.value(IndicatorType::Cci(p.cci), index),
            vwap: self.value(IndicatorType::Vwap(p.vwap), index),
            williams_r: self.value(IndicatorType::WilliamsR(p.williams_r), index),
            momentum: self.value(IndicatorType::Momentum(p.momentum), index),
            volume_ema: self.value(IndicatorType::VolumeEma(p.volume_ema), index),
            bull_run: run_length(&candles[..=index], Candle::is_bullish),
            bear_run: run_length(&candles[..=index], Candle::is_bearish),
        })
    }

    /// EMA stack at `index`; values still warming up come back as `None`.
    pub fn trend_at(&self, candles: &[Candle], index: usize) -> Option<TrendView> {
        let candle = candles.get(index)?;
        let p = &self.periods;
        Some(TrendView {
            open_time: candle.open_time,
            close: candle.close,
            ema_fast: self.value(IndicatorType::Ema(p.ema_fast), index),
            ema_slow: self.value(IndicatorType::Ema(p.ema_slow), index),
            ema_trend: self.value(IndicatorType::Ema(p.ema_trend), index),
        })
    }
}

fn run_length(candles: &[Candle], colour: fn(&Candle) -> bool) -> usize {
    candles.iter().rev().take_while(|c| colour(c)).count()
}
