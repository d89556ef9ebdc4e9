//! Account, position and order port.
//!
//! Read operations report transient failures as `DataFetch` so that the
//! caller can retry them. Order placement is never retried.

use crate::domain::error::ScoretraderError;
use crate::domain::position::{ExchangePosition, Side};

/// Market entry with its protective stop and target.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketOrder {
    pub symbol: String,
    pub side: Side,
    pub qty: f64,
    pub stop_price: Option<f64>,
    pub target_price: Option<f64>,
}

pub trait ExecutionPort {
    fn get_open_position(&self, symbol: &str) -> Result<Option<ExchangePosition>, ScoretraderError>;

    fn get_account_balance(&self, asset: &str) -> Result<f64, ScoretraderError>;

    fn get_min_order_qty(&self, symbol: &str) -> Result<f64, ScoretraderError>;

    fn place_market_order(&self, order: &MarketOrder) -> Result<(), ScoretraderError>;

    /// Reduce-only limit on the closing side of the position.
    fn place_reduce_only_limit(
        &self,
        symbol: &str,
        side: Side,
        qty: f64,
        price: f64,
    ) -> Result<(), ScoretraderError>;

    fn set_stop(&self, symbol: &str, price: f64) -> Result<(), ScoretraderError>;
}

impl<T: ExecutionPort + ?Sized> ExecutionPort for &T {
    fn get_open_position(&self, symbol: &str) -> Result<Option<ExchangePosition>, ScoretraderError> {
        (**self).get_open_position(symbol)
    }

    fn get_account_balance(&self, asset: &str) -> Result<f64, ScoretraderError> {
        (**self).get_account_balance(asset)
    }

    fn get_min_order_qty(&self, symbol: &str) -> Result<f64, ScoretraderError> {
        (**self).get_min_order_qty(symbol)
    }

    fn place_market_order(&self, order: &MarketOrder) -> Result<(), ScoretraderError> {
        (**self).place_market_order(order)
    }

    fn place_reduce_only_limit(
        &self,
        symbol: &str,
        side: Side,
        qty: f64,
        price: f64,
    ) -> Result<(), ScoretraderError> {
        (**self).place_reduce_only_limit(symbol, side, qty, price)
    }

    fn set_stop(&self, symbol: &str, price: f64) -> Result<(), ScoretraderError> {
        (**self).set_stop(symbol, price)
    }
}
