//! Per-bar decision records: what the engine did on a bar and why.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

use crate::domain::error::ScoretraderError;
use crate::domain::position::{PositionState, Side, TradeOutcome};
use crate::domain::score::Score;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "skip", rename_all = "snake_case")]
pub enum SkipReason {
    InsufficientHistory { have: usize, need: usize },
    /// The bar already closed a trade.
    ReentrySuppressed,
    BelowThreshold,
    InvalidStop,
    InvalidSizing { reason: String },
    /// Position state could not be confirmed with the exchange.
    StaleState { reason: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::InsufficientHistory { have, need } => {
                write!(f, "insufficient history ({} of {} bars)", have, need)
            }
            SkipReason::ReentrySuppressed => write!(f, "bar already closed a trade"),
            SkipReason::BelowThreshold => write!(f, "no direction cleared the threshold"),
            SkipReason::InvalidStop => write!(f, "no valid stop distance"),
            SkipReason::InvalidSizing { reason } => write!(f, "cannot size order: {}", reason),
            SkipReason::StaleState { reason } => write!(f, "position state stale: {}", reason),
        }
    }
}

/// In-position management performed during a cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    BreakevenMoved { stop_price: f64 },
    /// Partial exit taken in a replay, or its order placed live.
    PartialExit { price: f64, size: f64 },
    /// Exchange reported a live partial order filled.
    PartialFilled { price: f64, size: f64 },
    Adopted { side: Side, entry_price: f64 },
    Refreshed { stop_price: f64, target_price: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DecisionOutcome {
    Entered {
        side: Side,
        entry_price: f64,
        stop_price: f64,
        target_price: f64,
        size: f64,
    },
    Held {
        side: Side,
        stop_price: f64,
        target_price: f64,
    },
    Exited {
        trade: TradeOutcome,
    },
    Skipped {
        #[serde(flatten)]
        reason: SkipReason,
    },
    Error {
        kind: String,
        message: String,
    },
}

impl DecisionOutcome {
    pub fn error(err: &ScoretraderError) -> Self {
        DecisionOutcome::Error {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DecisionOutcome::Entered { .. } => "entered",
            DecisionOutcome::Held { .. } => "held",
            DecisionOutcome::Exited { .. } => "exited",
            DecisionOutcome::Skipped { .. } => "skipped",
            DecisionOutcome::Error { .. } => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionRecord {
    pub bar_open: Option<DateTime<Utc>>,
    /// Position state after the decision.
    pub state: PositionState,
    pub outcome: DecisionOutcome,
    pub actions: Vec<Action>,
    pub long_score: Option<Score>,
    pub short_score: Option<Score>,
}

impl DecisionRecord {
    pub fn new(bar_open: Option<DateTime<Utc>>, state: PositionState, outcome: DecisionOutcome) -> Self {
        Self {
            bar_open,
            state,
            outcome,
            actions: Vec::new(),
            long_score: None,
            short_score: None,
        }
    }

    pub fn with_scores(mut self, long: Score, short: Score) -> Self {
        self.long_score = Some(long);
        self.short_score = Some(short);
        self
    }

    pub fn with_actions(mut self, actions: Vec<Action>) -> Self {
        self.actions = actions;
        self
    }

    pub fn is_entry(&self) -> bool {
        matches!(self.outcome, DecisionOutcome::Entered { .. })
    }

    pub fn is_exit(&self) -> bool {
        matches!(self.outcome, DecisionOutcome::Exited { .. })
    }

    /// Emits the record as one structured event.
    pub fn log(&self) {
        let bar = self
            .bar_open
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".into());
        let long = self.long_score.as_ref().map(|s| s.total);
        let short = self.short_score.as_ref().map(|s| s.total);
        match &self.outcome {
            DecisionOutcome::Error { kind, message } => warn!(
                bar = %bar,
                state = ?self.state,
                kind = %kind,
                actions = self.actions.len(),
                "decision error: {}",
                message
            ),
            DecisionOutcome::Skipped { reason } => info!(
                bar = %bar,
                state = ?self.state,
                long_score = ?long,
                short_score = ?short,
                "skipped: {}",
                reason
            ),
            outcome => info!(
                bar = %bar,
                state = ?self.state,
                outcome = outcome.label(),
                long_score = ?long,
                short_score = ?short,
                actions = self.actions.len(),
                "decision"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_outcome_carries_kind() {
        let err = ScoretraderError::execution("place_market_order", "insufficient margin");
        match DecisionOutcome::error(&err) {
            DecisionOutcome::Error { kind, message } => {
                assert_eq!(kind, "execution");
                assert!(message.contains("insufficient margin"));
            }
            other => panic!("expected Error, got {:?}", other),
        }
    }

    #[test]
    fn skipped_record_serialises_reason() {
        let record = DecisionRecord::new(
            None,
            PositionState::Flat,
            DecisionOutcome::Skipped {
                reason: SkipReason::InvalidSizing {
                    reason: "below minimum".into(),
                },
            },
        );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["outcome"]["outcome"], "skipped");
        assert_eq!(json["outcome"]["skip"], "invalid_sizing");
        assert_eq!(json["outcome"]["reason"], "below minimum");
        assert_eq!(json["state"], "flat");
        assert!(!record.is_entry());
    }
}
