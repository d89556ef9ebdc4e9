//! Offline replay of a candle series through the strategy engine.
//!
//! Bars are visited in order; the decision at bar `i` reads only
//! `candles[..=i]` and the higher-timeframe candles closed by then.

use tracing::{debug, info};

use crate::domain::candle::{Candle, check_order};
use crate::domain::decision::{Action, DecisionOutcome, DecisionRecord, SkipReason};
use crate::domain::error::ScoretraderError;
use crate::domain::feed::IndicatorFeed;
use crate::domain::ledger::{Ledger, LedgerReport, period_of};
use crate::domain::position::{
    Position, PositionState, PositionTracker, TradeOutcome, partial_quantity,
};
use crate::domain::sizing::SizeDecision;
use crate::domain::strategy::{HigherFrame, Signal, Strategy};

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub initial_balance: f64,
    /// Order quantity step used for sizing and partial exits.
    pub min_qty: f64,
}

#[derive(Debug, Clone)]
pub struct BacktestResult {
    pub ledger: Ledger,
    pub trades: Vec<TradeOutcome>,
    pub decisions: Vec<DecisionRecord>,
    /// Position still open when the data ran out.
    pub open_position: Option<Position>,
}

impl BacktestResult {
    pub fn report(&self) -> LedgerReport {
        self.ledger.report()
    }
}

pub fn run_backtest(
    strategy: &Strategy,
    config: &BacktestConfig,
    candles: &[Candle],
    higher: Option<&[Candle]>,
) -> Result<BacktestResult, ScoretraderError> {
    if candles.is_empty() {
        return Err(ScoretraderError::NoData {
            symbol: strategy.symbol.clone(),
            timeframe: strategy.timeframe.to_string(),
        });
    }
    check_order(candles)?;
    if let Some(h) = higher {
        check_order(h)?;
    }
    let need = strategy.min_history();
    if candles.len() < need {
        return Err(ScoretraderError::InsufficientHistory {
            have: candles.len(),
            need,
        });
    }

    let feed = IndicatorFeed::new(strategy.periods.clone());
    let set = feed.compute(candles);
    let higher_set = higher.map(|h| feed.compute(h));
    let higher_frame = match (higher, higher_set.as_ref(), strategy.higher_timeframe) {
        (Some(candles), Some(set), Some(timeframe)) => Some(HigherFrame {
            candles,
            set,
            timeframe,
        }),
        _ => None,
    };

    let mut ledger = Ledger::new(config.initial_balance, strategy.fees);
    let mut tracker = PositionTracker::new();
    let mut trades = Vec::new();
    let mut decisions = Vec::new();

    for (i, bar) in candles.iter().enumerate() {
        let (year, month) = period_of(bar.open_time);
        ledger.touch(year, month);
        if i + 1 < need {
            continue;
        }

        if tracker.position().is_some() {
            decisions.push(manage_open(strategy, config, &mut tracker, &mut ledger, &mut trades, bar));
            continue;
        }
        if !tracker.can_enter(bar.open_time) {
            decisions.push(DecisionRecord::new(
                Some(bar.open_time),
                PositionState::Flat,
                DecisionOutcome::Skipped {
                    reason: SkipReason::ReentrySuppressed,
                },
            ));
            continue;
        }

        let record = match strategy.signal(candles, &set, higher_frame.as_ref(), i)? {
            Signal::Skip {
                reason,
                long,
                short,
            } => DecisionRecord::new(
                Some(bar.open_time),
                PositionState::Flat,
                DecisionOutcome::Skipped { reason },
            )
            .with_scores(long, short),
            Signal::Enter { plan, long, short } => {
                match strategy.size(&plan, ledger.balance(), config.min_qty) {
                    SizeDecision::CannotTrade { reason } => DecisionRecord::new(
                        Some(bar.open_time),
                        PositionState::Flat,
                        DecisionOutcome::Skipped {
                            reason: SkipReason::InvalidSizing { reason },
                        },
                    ),
                    SizeDecision::Sized { size, .. } => {
                        debug!(bar = %bar.open_time, side = %plan.side, entry = plan.entry_price, size, "entry");
                        tracker.open(Position::open(&plan, size, bar.open_time));
                        ledger.on_open(year, month);
                        DecisionRecord::new(
                            Some(bar.open_time),
                            plan.side.into(),
                            DecisionOutcome::Entered {
                                side: plan.side,
                                entry_price: plan.entry_price,
                                stop_price: plan.stop_price,
                                target_price: plan.target_price,
                                size,
                            },
                        )
                    }
                }
                .with_scores(long, short)
            }
        };
        decisions.push(record);
    }

    info!(
        symbol = %strategy.symbol,
        bars = candles.len(),
        trades = trades.len(),
        balance = ledger.balance(),
        max_drawdown_pct = ledger.max_drawdown_pct(),
        "backtest complete"
    );

    Ok(BacktestResult {
        ledger,
        trades,
        decisions,
        open_position: tracker.position().cloned(),
    })
}

/// Exit, partial and breakeven handling for a bar with a position open.
fn manage_open(
    strategy: &Strategy,
    config: &BacktestConfig,
    tracker: &mut PositionTracker,
    ledger: &mut Ledger,
    trades: &mut Vec<TradeOutcome>,
    bar: &Candle,
) -> DecisionRecord {
    let exit = tracker.position().and_then(|p| p.exit_on(bar));
    if let Some((reason, price)) = exit {
        if let Some(trade) = tracker.close(price, reason, bar.open_time, strategy.leverage) {
            let (year, month) = period_of(bar.open_time);
            ledger.on_close(year, month, trade.pnl_pct);
            debug!(bar = %bar.open_time, reason = %trade.reason, pnl_pct = trade.pnl_pct, "exit");
            trades.push(trade.clone());
            return DecisionRecord::new(
                Some(bar.open_time),
                PositionState::Flat,
                DecisionOutcome::Exited { trade },
            );
        }
    }

    let mut actions = Vec::new();
    let Some(position) = tracker.position_mut() else {
        return DecisionRecord::new(Some(bar.open_time), PositionState::Flat, DecisionOutcome::Skipped {
            reason: SkipReason::ReentrySuppressed,
        });
    };
    if let (Some(price), Some(partial)) = (position.partial_due(bar), strategy.management.partial) {
        match partial_quantity(position.size, partial.fraction, config.min_qty) {
            Some(size) => {
                position.record_partial(price, size);
                actions.push(Action::PartialExit { price, size });
            }
            None => position.partial_taken = true,
        }
    }
    if let Some(trigger) = strategy.management.breakeven_trigger_pct {
        if position.breakeven_due(bar.close, trigger) {
            position.move_stop_to_entry();
            actions.push(Action::BreakevenMoved {
                stop_price: position.stop_price,
            });
        }
    }

    DecisionRecord::new(
        Some(bar.open_time),
        position.state(),
        DecisionOutcome::Held {
            side: position.side,
            stop_price: position.stop_price,
            target_price: position.target_price,
        },
    )
    .with_actions(actions)
}
