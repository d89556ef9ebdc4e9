//! Simulated exchange over a replayed candle series.
//!
//! Bars are revealed one at a time with [`PaperExchange::advance`]. Market
//! orders fill at the latest revealed close; the resting stop, target and
//! reduce-only limit fill on a later bar that touches them, the target
//! before the stop.

use chrono::{DateTime, Utc};
use std::cell::RefCell;
use tracing::debug;

use crate::domain::candle::{Candle, Timeframe};
use crate::domain::error::ScoretraderError;
use crate::domain::position::{ExchangePosition, Side};
use crate::ports::execution_port::{ExecutionPort, MarketOrder};
use crate::ports::market_data_port::MarketDataPort;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillKind {
    Market,
    Limit,
    Stop,
    Target,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaperFill {
    pub time: DateTime<Utc>,
    pub kind: FillKind,
    /// Side of the order that filled.
    pub side: Side,
    pub qty: f64,
    pub price: f64,
}

#[derive(Debug, Clone)]
struct PaperPosition {
    side: Side,
    entry_price: f64,
    stop_price: f64,
    target_price: f64,
    size: f64,
}

#[derive(Debug, Clone)]
struct RestingLimit {
    side: Side,
    qty: f64,
    price: f64,
}

#[derive(Debug)]
struct PaperState {
    revealed: usize,
    balance: f64,
    position: Option<PaperPosition>,
    limit: Option<RestingLimit>,
    fills: Vec<PaperFill>,
}

pub struct PaperExchange {
    symbol: String,
    timeframe: Timeframe,
    candles: Vec<Candle>,
    higher: Option<(Timeframe, Vec<Candle>)>,
    min_qty: f64,
    state: RefCell<PaperState>,
}

impl PaperExchange {
    pub fn new(
        symbol: &str,
        timeframe: Timeframe,
        candles: Vec<Candle>,
        initial_balance: f64,
        min_qty: f64,
    ) -> Self {
        Self {
            symbol: symbol.to_string(),
            timeframe,
            candles,
            higher: None,
            min_qty,
            state: RefCell::new(PaperState {
                revealed: 0,
                balance: initial_balance,
                position: None,
                limit: None,
                fills: Vec::new(),
            }),
        }
    }

    /// Serves `candles` for `timeframe` requests, limited to the candles
    /// closed by the latest revealed base bar.
    pub fn with_higher(mut self, timeframe: Timeframe, candles: Vec<Candle>) -> Self {
        self.higher = Some((timeframe, candles));
        self
    }

    /// Reveals the next bar and fills resting orders it touches. Returns
    /// false once the series is exhausted.
    pub fn advance(&self) -> bool {
        let mut state = self.state.borrow_mut();
        let Some(bar) = self.candles.get(state.revealed) else {
            return false;
        };
        state.revealed += 1;
        fill_resting(&mut state, bar);
        true
    }

    pub fn remaining(&self) -> usize {
        self.candles.len() - self.state.borrow().revealed
    }

    pub fn balance(&self) -> f64 {
        self.state.borrow().balance
    }

    pub fn fills(&self) -> Vec<PaperFill> {
        self.state.borrow().fills.clone()
    }

    fn latest(&self) -> Option<&Candle> {
        let revealed = self.state.borrow().revealed;
        revealed.checked_sub(1).and_then(|i| self.candles.get(i))
    }

    fn check_symbol(&self, operation: &str, symbol: &str) -> Result<(), ScoretraderError> {
        if symbol == self.symbol {
            Ok(())
        } else {
            Err(ScoretraderError::Exchange {
                operation: operation.into(),
                reason: format!("unknown symbol {}", symbol),
            })
        }
    }
}

/// Realizes `qty` of the position at `price` into the balance.
fn realize(state: &mut PaperState, qty: f64, price: f64) {
    if let Some(position) = state.position.as_mut() {
        let qty = qty.min(position.size);
        state.balance += position.side.sign() * (price - position.entry_price) * qty;
        position.size -= qty;
        if position.size <= 0.0 {
            state.position = None;
            state.limit = None;
        }
    }
}

fn fill_resting(state: &mut PaperState, bar: &Candle) {
    let Some(position) = state.position.clone() else {
        return;
    };

    if let Some(limit) = state.limit.clone() {
        if touched(position.side, limit.price, bar) {
            debug!(price = limit.price, qty = limit.qty, "paper limit filled");
            record(state, bar.open_time, FillKind::Limit, limit.side, limit.qty, limit.price);
            state.limit = None;
            realize(state, limit.qty, limit.price);
        }
    }

    let Some(position) = state.position.clone() else {
        return;
    };
    let target_hit = position.target_price > 0.0 && touched(position.side, position.target_price, bar);
    let stop_hit = position.stop_price > 0.0
        && match position.side {
            Side::Long => bar.low <= position.stop_price,
            Side::Short => bar.high >= position.stop_price,
        };
    let exit = if target_hit {
        Some((FillKind::Target, position.target_price))
    } else if stop_hit {
        Some((FillKind::Stop, position.stop_price))
    } else {
        None
    };
    if let Some((kind, price)) = exit {
        debug!(?kind, price, "paper position closed");
        record(state, bar.open_time, kind, position.side.opposite(), position.size, price);
        realize(state, position.size, price);
    }
}

/// Favourable price reached by `bar` for a position on `side`.
fn touched(side: Side, price: f64, bar: &Candle) -> bool {
    match side {
        Side::Long => bar.high >= price,
        Side::Short => bar.low <= price,
    }
}

fn record(state: &mut PaperState, time: DateTime<Utc>, kind: FillKind, side: Side, qty: f64, price: f64) {
    state.fills.push(PaperFill {
        time,
        kind,
        side,
        qty,
        price,
    });
}

impl MarketDataPort for PaperExchange {
    fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Candle>, ScoretraderError> {
        self.check_symbol("fetch_candles", symbol)?;
        let Some(latest) = self.latest() else {
            return Ok(Vec::new());
        };

        let visible: &[Candle] = if timeframe == self.timeframe {
            &self.candles[..self.state.borrow().revealed]
        } else {
            match &self.higher {
                Some((tf, candles)) if *tf == timeframe => {
                    let cutoff = self.timeframe.close_time(latest.open_time);
                    let count = candles.partition_point(|c| tf.close_time(c.open_time) <= cutoff);
                    &candles[..count]
                }
                _ => {
                    return Err(ScoretraderError::NoData {
                        symbol: symbol.to_string(),
                        timeframe: timeframe.to_string(),
                    });
                }
            }
        };

        let mut candles: Vec<Candle> = visible
            .iter()
            .filter(|c| start.is_none_or(|s| c.open_time >= s))
            .filter(|c| end.is_none_or(|e| c.open_time <= e))
            .cloned()
            .collect();
        if candles.len() > limit {
            candles.drain(..candles.len() - limit);
        }
        Ok(candles)
    }

    fn get_current_price(&self, symbol: &str) -> Result<f64, ScoretraderError> {
        self.check_symbol("get_current_price", symbol)?;
        self.latest()
            .map(|c| c.close)
            .ok_or_else(|| ScoretraderError::NoData {
                symbol: symbol.to_string(),
                timeframe: self.timeframe.to_string(),
            })
    }
}

impl ExecutionPort for PaperExchange {
    fn get_open_position(&self, symbol: &str) -> Result<Option<ExchangePosition>, ScoretraderError> {
        self.check_symbol("get_open_position", symbol)?;
        Ok(self.state.borrow().position.as_ref().map(|p| ExchangePosition {
            side: p.side,
            entry_price: p.entry_price,
            stop_price: p.stop_price,
            target_price: p.target_price,
            size: p.size,
        }))
    }

    fn get_account_balance(&self, _asset: &str) -> Result<f64, ScoretraderError> {
        Ok(self.state.borrow().balance)
    }

    fn get_min_order_qty(&self, symbol: &str) -> Result<f64, ScoretraderError> {
        self.check_symbol("get_min_order_qty", symbol)?;
        Ok(self.min_qty)
    }

    fn place_market_order(&self, order: &MarketOrder) -> Result<(), ScoretraderError> {
        self.check_symbol("place_market_order", &order.symbol)?;
        let Some(bar) = self.latest().cloned() else {
            return Err(ScoretraderError::execution("place_market_order", "no price yet"));
        };
        if order.qty < self.min_qty {
            return Err(ScoretraderError::execution(
                "place_market_order",
                format!("qty {} below minimum {}", order.qty, self.min_qty),
            ));
        }
        let mut state = self.state.borrow_mut();
        if state.position.is_some() {
            return Err(ScoretraderError::execution("place_market_order", "position already open"));
        }
        state.position = Some(PaperPosition {
            side: order.side,
            entry_price: bar.close,
            stop_price: order.stop_price.unwrap_or(0.0),
            target_price: order.target_price.unwrap_or(0.0),
            size: order.qty,
        });
        record(&mut state, bar.open_time, FillKind::Market, order.side, order.qty, bar.close);
        Ok(())
    }

    /// Fills at once when the latest bar already reached `price`, otherwise
    /// rests until a later bar touches it.
    fn place_reduce_only_limit(
        &self,
        symbol: &str,
        side: Side,
        qty: f64,
        price: f64,
    ) -> Result<(), ScoretraderError> {
        self.check_symbol("place_reduce_only_limit", symbol)?;
        let latest = self.latest().cloned();
        let mut state = self.state.borrow_mut();
        let Some(position) = state.position.clone() else {
            return Err(ScoretraderError::execution("place_reduce_only_limit", "no open position"));
        };
        if side != position.side.opposite() {
            return Err(ScoretraderError::execution(
                "place_reduce_only_limit",
                "reduce-only order must be on the closing side",
            ));
        }
        match latest {
            Some(bar) if touched(position.side, price, &bar) => {
                record(&mut state, bar.open_time, FillKind::Limit, side, qty, price);
                realize(&mut state, qty, price);
            }
            _ => state.limit = Some(RestingLimit { side, qty, price }),
        }
        Ok(())
    }

    fn set_stop(&self, symbol: &str, price: f64) -> Result<(), ScoretraderError> {
        self.check_symbol("set_stop", symbol)?;
        let mut state = self.state.borrow_mut();
        match state.position.as_mut() {
            Some(position) => {
                position.stop_price = price;
                Ok(())
            }
            None => Err(ScoretraderError::execution("set_stop", "no open position")),
        }
    }
}
