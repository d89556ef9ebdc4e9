//! Concrete adapter implementations for ports.

pub mod candle_cache;
pub mod csv_adapter;
pub mod file_config_adapter;
pub mod json_report_adapter;
pub mod paper_exchange;
