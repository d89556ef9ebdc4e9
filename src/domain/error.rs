//! Domain error types.

/// Top-level error type for scoretrader.
#[derive(Debug, thiserror::Error)]
pub enum ScoretraderError {
    #[error("data fetch failed ({operation}): {reason}")]
    DataFetch { operation: String, reason: String },

    #[error("exchange rejected {operation}: {reason}")]
    Exchange { operation: String, reason: String },

    #[error("insufficient history: have {have} bars, need {need}")]
    InsufficientHistory { have: usize, need: usize },

    #[error("invalid sizing: {reason}")]
    InvalidSizing { reason: String },

    #[error("order execution failed ({operation}): {reason}")]
    Execution { operation: String, reason: String },

    #[error("position state could not be reconciled: {reason}")]
    StateReconciliation { reason: String },

    #[error("unrecognised position side {value:?}")]
    UnknownPositionSide { value: String },

    #[error("unrecognised timeframe {value:?}")]
    UnknownTimeframe { value: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("no candles for {symbol} {timeframe}")]
    NoData { symbol: String, timeframe: String },

    #[error("malformed data in {source_name}: {reason}")]
    InvalidData { source_name: String, reason: String },

    #[error("candles out of order at index {index}: open times must be strictly increasing")]
    CandleOrder { index: usize },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ScoretraderError {
    /// Transient read failures are the only errors worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ScoretraderError::DataFetch { .. })
    }

    pub fn data_fetch(operation: &str, reason: impl Into<String>) -> Self {
        ScoretraderError::DataFetch {
            operation: operation.to_string(),
            reason: reason.into(),
        }
    }

    pub fn execution(operation: &str, reason: impl Into<String>) -> Self {
        ScoretraderError::Execution {
            operation: operation.to_string(),
            reason: reason.into(),
        }
    }

    /// Short machine-readable family name, used in decision records.
    pub fn kind(&self) -> &'static str {
        match self {
            ScoretraderError::DataFetch { .. } => "data_fetch",
            ScoretraderError::Exchange { .. } => "exchange",
            ScoretraderError::InsufficientHistory { .. } => "insufficient_history",
            ScoretraderError::InvalidSizing { .. } => "invalid_sizing",
            ScoretraderError::Execution { .. } => "execution",
            ScoretraderError::StateReconciliation { .. } => "state_reconciliation",
            ScoretraderError::UnknownPositionSide { .. } => "unknown_position_side",
            ScoretraderError::UnknownTimeframe { .. } => "unknown_timeframe",
            ScoretraderError::ConfigParse { .. }
            | ScoretraderError::ConfigMissing { .. }
            | ScoretraderError::ConfigInvalid { .. } => "config",
            ScoretraderError::NoData { .. } => "no_data",
            ScoretraderError::CandleOrder { .. } => "candle_order",
            ScoretraderError::InvalidData { .. } => "invalid_data",
            ScoretraderError::Json(_) => "json",
            ScoretraderError::Io(_) => "io",
        }
    }
}

impl From<&ScoretraderError> for std::process::ExitCode {
    fn from(err: &ScoretraderError) -> Self {
        let code: u8 = match err {
            ScoretraderError::Io(_) | ScoretraderError::Json(_) => 1,
            ScoretraderError::ConfigParse { .. }
            | ScoretraderError::ConfigMissing { .. }
            | ScoretraderError::ConfigInvalid { .. }
            | ScoretraderError::UnknownTimeframe { .. } => 2,
            ScoretraderError::DataFetch { .. }
            | ScoretraderError::Exchange { .. }
            | ScoretraderError::StateReconciliation { .. }
            | ScoretraderError::UnknownPositionSide { .. } => 3,
            ScoretraderError::Execution { .. } | ScoretraderError::InvalidSizing { .. } => 4,
            ScoretraderError::NoData { .. }
            | ScoretraderError::CandleOrder { .. }
            | ScoretraderError::InvalidData { .. }
            | ScoretraderError::InsufficientHistory { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_data_fetch_is_retryable() {
        assert!(ScoretraderError::data_fetch("fetch_candles", "timeout").is_retryable());
        assert!(!ScoretraderError::execution("place_market_order", "rejected").is_retryable());
        assert!(
            !ScoretraderError::Exchange {
                operation: "get_open_position".into(),
                reason: "invalid api key".into(),
            }
            .is_retryable()
        );
        assert!(!ScoretraderError::InsufficientHistory { have: 3, need: 200 }.is_retryable());
    }

    #[test]
    fn display_includes_context() {
        let err = ScoretraderError::InsufficientHistory { have: 12, need: 201 };
        assert_eq!(
            err.to_string(),
            "insufficient history: have 12 bars, need 201"
        );
        let err = ScoretraderError::UnknownPositionSide {
            value: "Hold".into(),
        };
        assert_eq!(err.to_string(), "unrecognised position side \"Hold\"");
    }
}
