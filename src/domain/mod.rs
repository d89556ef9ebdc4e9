//! Core domain types and logic.

pub mod backtest;
pub mod candle;
pub mod config_validation;
pub mod decision;
pub mod error;
pub mod feed;
pub mod indicator;
pub mod ledger;
pub mod live;
pub mod position;
pub mod retry;
pub mod score;
pub mod sizing;
pub mod strategy;
