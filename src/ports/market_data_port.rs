//! Candle and price access port.

use chrono::{DateTime, Utc};

use crate::domain::candle::{Candle, Timeframe};
use crate::domain::error::ScoretraderError;

pub trait MarketDataPort {
    /// Candles ordered by open time, oldest first. `limit` caps the count,
    /// keeping the most recent candles of the range.
    fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Candle>, ScoretraderError>;

    fn get_current_price(&self, symbol: &str) -> Result<f64, ScoretraderError>;
}

impl<T: MarketDataPort + ?Sized> MarketDataPort for &T {
    fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Candle>, ScoretraderError> {
        (**self).fetch_candles(symbol, timeframe, start, end, limit)
    }

    fn get_current_price(&self, symbol: &str) -> Result<f64, ScoretraderError> {
        (**self).get_current_price(symbol)
    }
}
