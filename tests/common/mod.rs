#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use scoretrader::domain::candle::{Candle, Timeframe};
use scoretrader::domain::error::ScoretraderError;
use scoretrader::domain::feed::IndicatorPeriods;
use scoretrader::domain::ledger::{FeePolicy, FeeTiming};
use scoretrader::domain::live::LiveConfig;
use scoretrader::domain::position::{ExchangePosition, Management, Side, StopPolicy};
use scoretrader::domain::retry::RetryPolicy;
use scoretrader::domain::score::ScoringConfig;
use scoretrader::domain::sizing::{RiskNormalized, Sizing};
use scoretrader::domain::strategy::Strategy;
use scoretrader::ports::execution_port::{ExecutionPort, MarketOrder};
use scoretrader::ports::market_data_port::MarketDataPort;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::time::Duration as StdDuration;

pub const SYMBOL: &str = "BTCUSDT";

/// 2024-01-01T00:00:00Z plus `i` fifteen-minute bars.
pub fn at(i: usize) -> DateTime<Utc> {
    DateTime::from_timestamp(1_704_067_200, 0).unwrap() + Duration::minutes(15 * i as i64)
}

pub fn make_candle(i: usize, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Candle {
    Candle {
        open_time: at(i),
        open,
        high,
        low,
        close,
        volume,
        turnover: close * volume,
    }
}

/// Bar `i` of a steady one-point-per-bar rally.
pub fn rally_candle(i: usize, volume: f64) -> Candle {
    let close = 100.0 + i as f64;
    make_candle(i, close - 0.8, close + 0.3, close - 1.0, close, volume)
}

/// Steady rally with a volume spike on the last bar.
pub fn rally(count: usize) -> Vec<Candle> {
    (0..count)
        .map(|i| rally_candle(i, if i + 1 == count { 5000.0 } else { 1000.0 }))
        .collect()
}

pub fn wavy_candles(count: usize) -> Vec<Candle> {
    (0..count)
        .map(|i| {
            let x = i as f64;
            let close = 100.0 + (x * 0.7).sin() * 5.0 + x * 0.05;
            let open = close - (x * 1.3).cos();
            let high = open.max(close) + 0.5 + (x * 0.2).sin().abs();
            let low = open.min(close) - 0.5 - (x * 0.3).cos().abs();
            make_candle(i, open, high, low, close, 1000.0 + (x * 0.9).sin().abs() * 500.0)
        })
        .collect()
}

pub fn to_csv(candles: &[Candle]) -> String {
    let mut out = String::from("open_time,open,high,low,close,volume,turnover\n");
    for c in candles {
        out.push_str(&format!(
            "{},{},{},{},{},{},{}\n",
            c.open_time.timestamp_millis(),
            c.open,
            c.high,
            c.low,
            c.close,
            c.volume,
            c.turnover
        ));
    }
    out
}

/// Short lookbacks (warm-up 7, first decision at bar 8).
pub fn quick_periods() -> IndicatorPeriods {
    IndicatorPeriods {
        ema_fast: 3,
        ema_slow: 5,
        ema_trend: 8,
        rsi: 4,
        atr: 4,
        adx: 3,
        cci: 5,
        vwap: 5,
        williams_r: 4,
        momentum: 3,
        volume_ema: 5,
    }
}

/// Strategy that enters long on the last bar of `rally(30)`.
pub fn quick_strategy() -> Strategy {
    Strategy {
        name: "test".into(),
        symbol: SYMBOL.into(),
        timeframe: Timeframe::Minutes(15),
        higher_timeframe: None,
        periods: quick_periods(),
        scoring: ScoringConfig {
            min_score: 4,
            ..ScoringConfig::default()
        },
        stops: StopPolicy::default(),
        management: Management::default(),
        sizing: Sizing::RiskNormalized(RiskNormalized {
            risk_fraction: 0.01,
        }),
        leverage: 1.0,
        fees: FeePolicy {
            fee_pct: 0.0,
            timing: FeeTiming::RoundTripOnOpen,
            leverage: 1.0,
        },
    }
}

pub fn quick_live_config() -> LiveConfig {
    LiveConfig {
        poll_interval: StdDuration::ZERO,
        retry: RetryPolicy {
            attempts: 3,
            backoff: StdDuration::ZERO,
        },
        candle_limit: 1000,
        quote_asset: "USDT".into(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scripted {
    /// Retryable read failure.
    Transient,
    /// Non-retryable rejection.
    Reject,
}

/// In-memory exchange with scripted failures per operation.
pub struct MockExchange {
    pub candles: RefCell<Vec<Candle>>,
    pub higher: RefCell<Vec<Candle>>,
    pub position: RefCell<Option<ExchangePosition>>,
    pub balance: Cell<f64>,
    pub min_qty: Cell<f64>,
    pub orders: RefCell<Vec<MarketOrder>>,
    pub limits: RefCell<Vec<(Side, f64, f64)>>,
    pub stops: RefCell<Vec<f64>>,
    /// When false, reduce-only limits rest without touching the position.
    pub fill_limits: Cell<bool>,
    calls: RefCell<HashMap<&'static str, u32>>,
    script: RefCell<HashMap<&'static str, VecDeque<Scripted>>>,
}

impl MockExchange {
    pub fn new(candles: Vec<Candle>) -> Self {
        Self {
            candles: RefCell::new(candles),
            higher: RefCell::new(Vec::new()),
            position: RefCell::new(None),
            balance: Cell::new(1000.0),
            min_qty: Cell::new(0.001),
            orders: RefCell::new(Vec::new()),
            limits: RefCell::new(Vec::new()),
            stops: RefCell::new(Vec::new()),
            fill_limits: Cell::new(true),
            calls: RefCell::new(HashMap::new()),
            script: RefCell::new(HashMap::new()),
        }
    }

    /// The next `times` calls to `operation` fail with `kind`.
    pub fn fail(&self, operation: &'static str, kind: Scripted, times: usize) {
        let mut script = self.script.borrow_mut();
        let queue = script.entry(operation).or_default();
        queue.extend(std::iter::repeat_n(kind, times));
    }

    pub fn calls(&self, operation: &str) -> u32 {
        self.calls.borrow().get(operation).copied().unwrap_or(0)
    }

    pub fn push_candle(&self, candle: Candle) {
        self.candles.borrow_mut().push(candle);
    }

    pub fn close_position(&self) {
        self.position.replace(None);
    }

    fn enter(&self, operation: &'static str) -> Result<(), ScoretraderError> {
        *self.calls.borrow_mut().entry(operation).or_default() += 1;
        let next = self
            .script
            .borrow_mut()
            .get_mut(operation)
            .and_then(|q| q.pop_front());
        match next {
            None => Ok(()),
            Some(Scripted::Transient) => Err(ScoretraderError::data_fetch(operation, "timeout")),
            Some(Scripted::Reject) => Err(ScoretraderError::execution(operation, "rejected")),
        }
    }
}

impl MarketDataPort for MockExchange {
    fn fetch_candles(
        &self,
        _symbol: &str,
        timeframe: Timeframe,
        _start: Option<DateTime<Utc>>,
        _end: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Candle>, ScoretraderError> {
        self.enter("fetch_candles")?;
        let source = if timeframe == Timeframe::Minutes(15) {
            self.candles.borrow()
        } else {
            self.higher.borrow()
        };
        let skip = source.len().saturating_sub(limit);
        Ok(source[skip..].to_vec())
    }

    fn get_current_price(&self, _symbol: &str) -> Result<f64, ScoretraderError> {
        self.enter("get_current_price")?;
        Ok(self.candles.borrow().last().map_or(0.0, |c| c.close))
    }
}

impl ExecutionPort for MockExchange {
    fn get_open_position(&self, _symbol: &str) -> Result<Option<ExchangePosition>, ScoretraderError> {
        self.enter("get_open_position")?;
        Ok(self.position.borrow().clone())
    }

    fn get_account_balance(&self, _asset: &str) -> Result<f64, ScoretraderError> {
        self.enter("get_account_balance")?;
        Ok(self.balance.get())
    }

    fn get_min_order_qty(&self, _symbol: &str) -> Result<f64, ScoretraderError> {
        self.enter("get_min_order_qty")?;
        Ok(self.min_qty.get())
    }

    fn place_market_order(&self, order: &MarketOrder) -> Result<(), ScoretraderError> {
        self.enter("place_market_order")?;
        let close = self.candles.borrow().last().map_or(0.0, |c| c.close);
        self.position.replace(Some(ExchangePosition {
            side: order.side,
            entry_price: close,
            stop_price: order.stop_price.unwrap_or(0.0),
            target_price: order.target_price.unwrap_or(0.0),
            size: order.qty,
        }));
        self.orders.borrow_mut().push(order.clone());
        Ok(())
    }

    fn place_reduce_only_limit(
        &self,
        _symbol: &str,
        side: Side,
        qty: f64,
        price: f64,
    ) -> Result<(), ScoretraderError> {
        self.enter("place_reduce_only_limit")?;
        if self.fill_limits.get() {
            if let Some(p) = self.position.borrow_mut().as_mut() {
                p.size -= qty;
            }
        }
        self.limits.borrow_mut().push((side, qty, price));
        Ok(())
    }

    fn set_stop(&self, _symbol: &str, price: f64) -> Result<(), ScoretraderError> {
        self.enter("set_stop")?;
        if let Some(p) = self.position.borrow_mut().as_mut() {
            p.stop_price = price;
        }
        self.stops.borrow_mut().push(price);
        Ok(())
    }
}
