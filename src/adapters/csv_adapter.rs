//! CSV kline file adapter.
//!
//! Files live under a base directory as `{symbol}_{timeframe}.csv` with the
//! columns `open_time,open,high,low,close,volume[,turnover]`. `open_time` is
//! either epoch milliseconds or an RFC 3339 timestamp.

use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::candle::{Candle, Timeframe};
use crate::domain::error::ScoretraderError;
use crate::ports::market_data_port::MarketDataPort;

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str, timeframe: Timeframe) -> PathBuf {
        self.base_path.join(format!("{}_{}.csv", symbol, timeframe))
    }
}

/// Reads every candle in `path`, sorted by open time.
pub fn read_candles(path: &Path) -> Result<Vec<Candle>, ScoretraderError> {
    let source_name = path.display().to_string();
    let content = fs::read_to_string(path)?;

    let mut rdr = csv::Reader::from_reader(content.as_bytes());
    let mut candles = Vec::new();

    for (row, result) in rdr.records().enumerate() {
        let invalid = |reason: String| ScoretraderError::InvalidData {
            source_name: source_name.clone(),
            reason: format!("row {}: {}", row + 1, reason),
        };
        let record = result.map_err(|e| invalid(format!("CSV parse error: {}", e)))?;

        let field = |index: usize, name: &str| -> Result<f64, ScoretraderError> {
            record
                .get(index)
                .ok_or_else(|| invalid(format!("missing {} column", name)))?
                .trim()
                .parse()
                .map_err(|e| invalid(format!("invalid {} value: {}", name, e)))
        };

        let time_str = record
            .get(0)
            .ok_or_else(|| invalid("missing open_time column".into()))?;
        let open_time = parse_open_time(time_str).map_err(invalid)?;

        let close = field(4, "close")?;
        let volume = field(5, "volume")?;
        let turnover = match record.get(6) {
            Some(value) if !value.trim().is_empty() => field(6, "turnover")?,
            _ => close * volume,
        };

        candles.push(Candle {
            open_time,
            open: field(1, "open")?,
            high: field(2, "high")?,
            low: field(3, "low")?,
            close,
            volume,
            turnover,
        });
    }

    candles.sort_by_key(|c| c.open_time);
    Ok(candles)
}

fn parse_open_time(value: &str) -> Result<DateTime<Utc>, String> {
    let value = value.trim();
    if let Ok(millis) = value.parse::<i64>() {
        return DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| format!("open_time out of range: {}", millis));
    }
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("invalid open_time {:?}: {}", value, e))
}

impl MarketDataPort for CsvAdapter {
    fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Candle>, ScoretraderError> {
        let path = self.csv_path(symbol, timeframe);
        if !path.exists() {
            return Err(ScoretraderError::NoData {
                symbol: symbol.to_string(),
                timeframe: timeframe.to_string(),
            });
        }

        let mut candles: Vec<Candle> = read_candles(&path)?
            .into_iter()
            .filter(|c| start.is_none_or(|s| c.open_time >= s))
            .filter(|c| end.is_none_or(|e| c.open_time <= e))
            .collect();
        if candles.len() > limit {
            candles.drain(..candles.len() - limit);
        }
        Ok(candles)
    }

    /// Close of the most recent candle across the symbol's files.
    fn get_current_price(&self, symbol: &str) -> Result<f64, ScoretraderError> {
        let entries = fs::read_dir(&self.base_path)?;
        let prefix = format!("{}_", symbol);
        let mut latest: Option<Candle> = None;

        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let name_str = name.to_string_lossy();
            if !(name_str.starts_with(&prefix) && name_str.ends_with(".csv")) {
                continue;
            }
            if let Some(last) = read_candles(&entry.path())?.pop() {
                if latest.as_ref().is_none_or(|l| last.open_time > l.open_time) {
                    latest = Some(last);
                }
            }
        }

        latest.map(|c| c.close).ok_or_else(|| ScoretraderError::NoData {
            symbol: symbol.to_string(),
            timeframe: "any".into(),
        })
    }
}
