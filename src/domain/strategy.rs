//! Strategy configuration record and the shared entry evaluation used by
//! both the backtest replay and the live loop.

use crate::domain::candle::{Candle, Timeframe, last_closed_index};
use crate::domain::decision::SkipReason;
use crate::domain::error::ScoretraderError;
use crate::domain::feed::{IndicatorPeriods, IndicatorSet};
use crate::domain::ledger::FeePolicy;
use crate::domain::position::{EntryPlan, Management, Side, StopPolicy, plan_entry};
use crate::domain::score::{Score, ScoreInput, ScoringConfig, decide, score};
use crate::domain::sizing::{SizeDecision, Sizing, SizingRequest, size_position};

#[derive(Debug, Clone, PartialEq)]
pub struct Strategy {
    pub name: String,
    pub symbol: String,
    pub timeframe: Timeframe,
    /// Confirmation timeframe for the trend criterion.
    pub higher_timeframe: Option<Timeframe>,
    pub periods: IndicatorPeriods,
    pub scoring: ScoringConfig,
    pub stops: StopPolicy,
    pub management: Management,
    pub sizing: Sizing,
    pub leverage: f64,
    pub fees: FeePolicy,
}

/// Higher-timeframe candles with their indicators.
#[derive(Debug, Clone, Copy)]
pub struct HigherFrame<'a> {
    pub candles: &'a [Candle],
    pub set: &'a IndicatorSet,
    pub timeframe: Timeframe,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Enter {
        plan: EntryPlan,
        long: Score,
        short: Score,
    },
    Skip {
        reason: SkipReason,
        long: Score,
        short: Score,
    },
}

impl Strategy {
    /// Bars needed before the first entry can be evaluated: the warm-up
    /// bar plus the bar before it.
    pub fn min_history(&self) -> usize {
        self.periods.warmup() + 2
    }

    /// Scores bar `index` and plans an entry when one direction wins.
    /// Only `candles[..=index]` and higher candles closed by then are read.
    pub fn signal(
        &self,
        candles: &[Candle],
        set: &IndicatorSet,
        higher: Option<&HigherFrame<'_>>,
        index: usize,
    ) -> Result<Signal, ScoretraderError> {
        let prev_index = index.checked_sub(1).ok_or(ScoretraderError::InsufficientHistory {
            have: index + 1,
            need: self.min_history(),
        })?;
        let current = set.snapshot(candles, index)?;
        let previous = set
            .snapshot(candles, prev_index)
            .map_err(|_| ScoretraderError::InsufficientHistory {
                have: index + 1,
                need: self.min_history(),
            })?;
        let trend = higher.and_then(|h| {
            last_closed_index(h.candles, h.timeframe, current.open_time, self.timeframe)
                .and_then(|j| h.set.trend_at(h.candles, j))
        });

        let input = ScoreInput {
            current: &current,
            previous: &previous,
            higher: trend.as_ref(),
        };
        let long = score(&self.scoring, Side::Long, &input);
        let short = score(&self.scoring, Side::Short, &input);

        let Some(side) = decide(&long, &short, self.scoring.min_score) else {
            return Ok(Signal::Skip {
                reason: SkipReason::BelowThreshold,
                long,
                short,
            });
        };
        match plan_entry(side, candles, index, &current, &self.stops, &self.management) {
            Some(plan) => Ok(Signal::Enter { plan, long, short }),
            None => Ok(Signal::Skip {
                reason: SkipReason::InvalidStop,
                long,
                short,
            }),
        }
    }

    pub fn size(&self, plan: &EntryPlan, balance: f64, min_qty: f64) -> SizeDecision {
        size_position(
            self.sizing.policy(),
            &SizingRequest {
                balance,
                leverage: self.leverage,
                entry_price: plan.entry_price,
                stop_distance: plan.stop_distance,
                min_qty,
            },
        )
    }
}
