//! Download cache for ranged candle fetches.
//!
//! Ranges are stored as `{symbol}_{timeframe}_{start}-{end}.json` (epoch
//! milliseconds). A missing or unreadable file falls through to the inner
//! port and is rewritten.

use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::domain::candle::{Candle, Timeframe};
use crate::domain::error::ScoretraderError;
use crate::ports::market_data_port::MarketDataPort;

pub struct CachedMarketData<P> {
    inner: P,
    dir: PathBuf,
}

impl<P: MarketDataPort> CachedMarketData<P> {
    pub fn new(inner: P, dir: PathBuf) -> Self {
        Self { inner, dir }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    fn cache_path(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> PathBuf {
        self.dir.join(format!(
            "{}_{}_{}-{}.json",
            symbol,
            timeframe,
            start.timestamp_millis(),
            end.timestamp_millis()
        ))
    }

    fn read(&self, path: &Path) -> Result<Vec<Candle>, ScoretraderError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn store(&self, path: &Path, candles: &[Candle]) -> Result<(), ScoretraderError> {
        fs::create_dir_all(&self.dir)?;
        fs::write(path, serde_json::to_string(candles)?)?;
        Ok(())
    }
}

impl<P: MarketDataPort> MarketDataPort for CachedMarketData<P> {
    fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Candle>, ScoretraderError> {
        let (Some(from), Some(to)) = (start, end) else {
            return self.inner.fetch_candles(symbol, timeframe, start, end, limit);
        };
        let path = self.cache_path(symbol, timeframe, from, to);

        match self.read(&path) {
            Ok(mut candles) => {
                debug!(path = %path.display(), count = candles.len(), "cache hit");
                if candles.len() > limit {
                    candles.drain(..candles.len() - limit);
                }
                return Ok(candles);
            }
            Err(err) if path.exists() => {
                warn!(path = %path.display(), error = %err, "discarding unreadable cache file");
            }
            Err(_) => {}
        }

        let candles = self
            .inner
            .fetch_candles(symbol, timeframe, start, end, limit)?;
        if let Err(err) = self.store(&path, &candles) {
            warn!(path = %path.display(), error = %err, "cache write failed");
        }
        Ok(candles)
    }

    fn get_current_price(&self, symbol: &str) -> Result<f64, ScoretraderError> {
        self.inner.get_current_price(symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_support::{at, wavy_candles};
    use std::cell::Cell;
    use tempfile::TempDir;

    struct CountingFeed {
        candles: Vec<Candle>,
        calls: Cell<u32>,
    }

    impl MarketDataPort for CountingFeed {
        fn fetch_candles(
            &self,
            _symbol: &str,
            _timeframe: Timeframe,
            start: Option<DateTime<Utc>>,
            end: Option<DateTime<Utc>>,
            _limit: usize,
        ) -> Result<Vec<Candle>, ScoretraderError> {
            self.calls.set(self.calls.get() + 1);
            Ok(self
                .candles
                .iter()
                .filter(|c| start.is_none_or(|s| c.open_time >= s))
                .filter(|c| end.is_none_or(|e| c.open_time <= e))
                .cloned()
                .collect())
        }

        fn get_current_price(&self, _symbol: &str) -> Result<f64, ScoretraderError> {
            Ok(self.candles.last().map_or(0.0, |c| c.close))
        }
    }

    fn cached(dir: &TempDir) -> CachedMarketData<CountingFeed> {
        CachedMarketData::new(
            CountingFeed {
                candles: wavy_candles(40),
                calls: Cell::new(0),
            },
            dir.path().join("cache"),
        )
    }

    #[test]
    fn second_ranged_fetch_is_served_from_disk() {
        let dir = TempDir::new().unwrap();
        let cache = cached(&dir);
        let tf = Timeframe::Minutes(15);

        let first = cache.fetch_candles("BTCUSDT", tf, Some(at(5)), Some(at(20)), 1000).unwrap();
        let second = cache.fetch_candles("BTCUSDT", tf, Some(at(5)), Some(at(20)), 1000).unwrap();

        assert_eq!(first.len(), 16);
        assert_eq!(first, second);
        assert_eq!(cache.inner().calls.get(), 1);

        let name = format!(
            "BTCUSDT_15_{}-{}.json",
            at(5).timestamp_millis(),
            at(20).timestamp_millis()
        );
        assert!(dir.path().join("cache").join(name).exists());
    }

    #[test]
    fn open_ended_fetch_bypasses_cache() {
        let dir = TempDir::new().unwrap();
        let cache = cached(&dir);
        let tf = Timeframe::Minutes(15);

        cache.fetch_candles("BTCUSDT", tf, None, None, 10).unwrap();
        cache.fetch_candles("BTCUSDT", tf, None, None, 10).unwrap();

        assert_eq!(cache.inner().calls.get(), 2);
        assert!(!dir.path().join("cache").exists());
    }

    #[test]
    fn corrupt_cache_file_falls_back_to_inner() {
        let dir = TempDir::new().unwrap();
        let cache = cached(&dir);
        let tf = Timeframe::Minutes(15);
        let path = cache.cache_path("BTCUSDT", tf, at(0), at(9));
        fs::create_dir_all(dir.path().join("cache")).unwrap();
        fs::write(&path, "not json").unwrap();

        let candles = cache.fetch_candles("BTCUSDT", tf, Some(at(0)), Some(at(9)), 1000).unwrap();
        assert_eq!(candles.len(), 10);
        assert_eq!(cache.inner().calls.get(), 1);
        // rewritten with valid content
        assert_eq!(cache.read(&path).unwrap(), candles);
    }
}
