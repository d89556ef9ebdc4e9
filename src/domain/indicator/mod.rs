//! Technical indicator implementations.
//!
//! This module provides types for representing indicator values and series:
//! - `IndicatorPoint`: A single point in an indicator time series
//! - `IndicatorType`: Indicator identity + parameters (serves as HashMap key)
//! - `IndicatorSeries`: A time series of indicator values aligned 1:1 with candles
//!
//! Every calculator is causal: the point at index `i` is computed from
//! `candles[..=i]` only. Points inside the warm-up window carry
//! `valid == false` and must not be read as values.

pub mod adx;
pub mod atr;
pub mod cci;
pub mod ema;
pub mod momentum;
pub mod rsi;
pub mod vwap;
pub mod williams_r;

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;

use crate::domain::candle::Candle;

/// Added to denominators that can legitimately reach zero.
pub const EPSILON: f64 = 1e-10;

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorPoint {
    pub open_time: DateTime<Utc>,
    pub valid: bool,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorType {
    Ema(usize),
    VolumeEma(usize),
    Rsi(usize),
    Atr(usize),
    Adx(usize),
    Cci(usize),
    Vwap(usize),
    WilliamsR(usize),
    Momentum(usize),
}

impl IndicatorType {
    /// Index of the first bar at which the indicator can be valid.
    pub fn lookback(&self) -> usize {
        match *self {
            IndicatorType::Ema(n)
            | IndicatorType::VolumeEma(n)
            | IndicatorType::Atr(n)
            | IndicatorType::Cci(n)
            | IndicatorType::Vwap(n)
            | IndicatorType::WilliamsR(n) => n.saturating_sub(1),
            IndicatorType::Rsi(n) | IndicatorType::Momentum(n) => n,
            IndicatorType::Adx(n) => 3 * n.saturating_sub(1),
        }
    }

    pub fn calculate(&self, candles: &[Candle]) -> IndicatorSeries {
        match *self {
            IndicatorType::Ema(n) => ema::calculate_ema(candles, n),
            IndicatorType::VolumeEma(n) => ema::calculate_volume_ema(candles, n),
            IndicatorType::Rsi(n) => rsi::calculate_rsi(candles, n),
            IndicatorType::Atr(n) => atr::calculate_atr(candles, n),
            IndicatorType::Adx(n) => adx::calculate_adx(candles, n),
            IndicatorType::Cci(n) => cci::calculate_cci(candles, n),
            IndicatorType::Vwap(n) => vwap::calculate_vwap(candles, n),
            IndicatorType::WilliamsR(n) => williams_r::calculate_williams_r(candles, n),
            IndicatorType::Momentum(n) => momentum::calculate_momentum(candles, n),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    pub values: Vec<IndicatorPoint>,
}

impl IndicatorSeries {
    /// Builds a series from per-candle optional values; `None` marks the bar invalid.
    pub fn from_options(
        indicator_type: IndicatorType,
        candles: &[Candle],
        values: Vec<Option<f64>>,
    ) -> Self {
        let values = candles
            .iter()
            .zip(values)
            .map(|(candle, value)| IndicatorPoint {
                open_time: candle.open_time,
                valid: value.is_some(),
                value: value.unwrap_or(0.0),
            })
            .collect();
        IndicatorSeries {
            indicator_type,
            values,
        }
    }

    /// The value at `index`, or `None` when out of range or still warming up.
    pub fn value_at(&self, index: usize) -> Option<f64> {
        self.values
            .get(index)
            .filter(|point| point.valid)
            .map(|point| point.value)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

pub fn compute_indicators(
    candles: &[Candle],
    types: &[IndicatorType],
) -> HashMap<IndicatorType, IndicatorSeries> {
    types
        .iter()
        .map(|t| (*t, t.calculate(candles)))
        .collect()
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Ema(period) => write!(f, "EMA({})", period),
            IndicatorType::VolumeEma(period) => write!(f, "VOLUME_EMA({})", period),
            IndicatorType::Rsi(period) => write!(f, "RSI({})", period),
            IndicatorType::Atr(period) => write!(f, "ATR({})", period),
            IndicatorType::Adx(period) => write!(f, "ADX({})", period),
            IndicatorType::Cci(period) => write!(f, "CCI({})", period),
            IndicatorType::Vwap(period) => write!(f, "VWAP({})", period),
            IndicatorType::WilliamsR(period) => write!(f, "WILLIAMS_R({})", period),
            IndicatorType::Momentum(period) => write!(f, "MOMENTUM({})", period),
        }
    }
}
