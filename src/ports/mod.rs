//! Port traits for the engine's collaborators.

pub mod config_port;
pub mod execution_port;
pub mod market_data_port;
pub mod report_port;
