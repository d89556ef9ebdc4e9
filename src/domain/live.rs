//! Polling trader: one decision cycle at a time against injected market
//! data and execution collaborators.
//!
//! The exchange is authoritative on whether a position is open, so every
//! cycle starts by re-querying it. A failed query leaves the local view
//! marked stale and the cycle is skipped.

use chrono::{DateTime, Utc};
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::domain::candle::{Candle, Timeframe, check_order};
use crate::domain::decision::{Action, DecisionOutcome, DecisionRecord, SkipReason};
use crate::domain::error::ScoretraderError;
use crate::domain::feed::IndicatorFeed;
use crate::domain::ledger::{FeePolicy, Ledger, period_of};
use crate::domain::position::{Position, PositionTracker, Reconciliation, partial_quantity};
use crate::domain::retry::{RetryPolicy, with_retry};
use crate::domain::score::Score;
use crate::domain::sizing::SizeDecision;
use crate::domain::strategy::{HigherFrame, Signal, Strategy};
use crate::ports::execution_port::{ExecutionPort, MarketOrder};
use crate::ports::market_data_port::MarketDataPort;

#[derive(Debug, Clone, PartialEq)]
pub struct LiveConfig {
    pub poll_interval: Duration,
    pub retry: RetryPolicy,
    /// Candles requested per fetch.
    pub candle_limit: usize,
    /// Asset the account balance is read in.
    pub quote_asset: String,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            candle_limit: 1000,
            quote_asset: "USDT".into(),
        }
    }
}

pub struct LiveTrader<M: MarketDataPort, E: ExecutionPort> {
    strategy: Strategy,
    config: LiveConfig,
    market: M,
    exchange: E,
    feed: IndicatorFeed,
    tracker: PositionTracker,
    ledger: Ledger,
    stale: bool,
}

impl<M: MarketDataPort, E: ExecutionPort> LiveTrader<M, E> {
    pub fn new(
        strategy: Strategy,
        config: LiveConfig,
        market: M,
        exchange: E,
        initial_balance: f64,
    ) -> Self {
        let feed = IndicatorFeed::new(strategy.periods.clone());
        let fees: FeePolicy = strategy.fees;
        Self {
            strategy,
            config,
            market,
            exchange,
            feed,
            tracker: PositionTracker::new(),
            ledger: Ledger::new(initial_balance, fees),
            stale: false,
        }
    }

    pub fn tracker(&self) -> &PositionTracker {
        &self.tracker
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// True after a position query failed; cleared by the next success.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Runs cycles until `max_cycles` is reached, sleeping the poll
    /// interval in between. `None` runs until the process exits.
    pub fn run(&mut self, max_cycles: Option<u64>) -> u64 {
        let mut cycles = 0;
        loop {
            self.run_cycle();
            cycles += 1;
            if max_cycles.is_some_and(|max| cycles >= max) {
                return cycles;
            }
            thread::sleep(self.config.poll_interval);
        }
    }

    pub fn run_cycle(&mut self) -> DecisionRecord {
        let record = self.cycle();
        record.log();
        record
    }

    fn cycle(&mut self) -> DecisionRecord {
        let candles = match self.fetch(self.strategy.timeframe) {
            Ok(candles) => candles,
            Err(err) => return self.error_record(None, &err),
        };
        let Some(bar) = candles.last().cloned() else {
            let err = ScoretraderError::NoData {
                symbol: self.strategy.symbol.clone(),
                timeframe: self.strategy.timeframe.to_string(),
            };
            return self.error_record(None, &err);
        };
        let (year, month) = period_of(bar.open_time);
        self.ledger.touch(year, month);

        let retry = self.config.retry;
        let symbol = self.strategy.symbol.clone();
        let remote = match with_retry(&retry, "get_open_position", || {
            self.exchange.get_open_position(&symbol)
        }) {
            Ok(remote) => remote,
            Err(err) => {
                self.stale = true;
                let err = ScoretraderError::StateReconciliation {
                    reason: err.to_string(),
                };
                error!(bar = %bar.open_time, error = %err, "position state stale");
                return DecisionRecord::new(
                    Some(bar.open_time),
                    self.tracker.state(),
                    DecisionOutcome::Skipped {
                        reason: SkipReason::StaleState {
                            reason: err.to_string(),
                        },
                    },
                );
            }
        };
        if self.stale {
            info!(bar = %bar.open_time, "position state confirmed");
            self.stale = false;
        }

        let before = self
            .tracker
            .position()
            .map(|p| (p.stop_price, p.target_price));
        let mut actions = Vec::new();
        match self
            .tracker
            .reconcile(remote.as_ref(), &bar, self.strategy.leverage)
        {
            Reconciliation::ClosedExternally { trade, adopted } => {
                self.ledger.on_close(year, month, trade.pnl_pct);
                if adopted {
                    actions.extend(self.adopted(year, month));
                }
                return DecisionRecord::new(
                    Some(bar.open_time),
                    self.tracker.state(),
                    DecisionOutcome::Exited { trade },
                )
                .with_actions(actions);
            }
            Reconciliation::Adopted => actions.extend(self.adopted(year, month)),
            Reconciliation::Refreshed { filled } => {
                if let Some(fill) = filled {
                    info!(price = fill.price, qty = fill.size, "partial exit filled");
                    actions.push(Action::PartialFilled {
                        price: fill.price,
                        size: fill.size,
                    });
                }
                if let Some(p) = self.tracker.position() {
                    if before != Some((p.stop_price, p.target_price)) {
                        actions.push(Action::Refreshed {
                            stop_price: p.stop_price,
                            target_price: p.target_price,
                        });
                    }
                }
            }
            Reconciliation::InSync => {}
        }

        if let Some(position) = self.tracker.position().cloned() {
            return self.manage(&bar, position, actions);
        }
        if !self.tracker.can_enter(bar.open_time) {
            return DecisionRecord::new(
                Some(bar.open_time),
                self.tracker.state(),
                DecisionOutcome::Skipped {
                    reason: SkipReason::ReentrySuppressed,
                },
            );
        }
        self.enter(&candles, &bar)
    }

    /// Books a position taken over from the exchange as opened this month.
    fn adopted(&mut self, year: i32, month: u32) -> Option<Action> {
        let (side, entry_price) = self.tracker.position().map(|p| (p.side, p.entry_price))?;
        warn!(side = %side, entry = entry_price, "adopted exchange position");
        self.ledger.on_open(year, month);
        Some(Action::Adopted { side, entry_price })
    }

    fn fetch(&self, timeframe: Timeframe) -> Result<Vec<Candle>, ScoretraderError> {
        let candles = with_retry(&self.config.retry, "fetch_candles", || {
            self.market.fetch_candles(
                &self.strategy.symbol,
                timeframe,
                None,
                None,
                self.config.candle_limit,
            )
        })?;
        check_order(&candles)?;
        Ok(candles)
    }

    /// Partial exit then breakeven shift. A rejected order leaves the local
    /// position untouched; actions already taken stay on the record.
    fn manage(&mut self, bar: &Candle, position: Position, mut actions: Vec<Action>) -> DecisionRecord {
        let symbol = self.strategy.symbol.clone();
        let management = self.strategy.management.clone();

        if let (Some(price), Some(partial)) = (position.partial_due(bar), management.partial) {
            let min_qty = match with_retry(&self.config.retry, "get_min_order_qty", || {
                self.exchange.get_min_order_qty(&symbol)
            }) {
                Ok(q) => q,
                Err(err) => return self.error_record(Some(bar.open_time), &err).with_actions(actions),
            };
            match partial_quantity(position.size, partial.fraction, min_qty) {
                Some(qty) => {
                    if let Err(err) =
                        self.exchange
                            .place_reduce_only_limit(&symbol, position.side.opposite(), qty, price)
                    {
                        return self.error_record(Some(bar.open_time), &err).with_actions(actions);
                    }
                    info!(price, qty, "partial exit placed");
                    if let Some(p) = self.tracker.position_mut() {
                        p.place_partial(price, qty);
                    }
                    actions.push(Action::PartialExit { price, size: qty });
                }
                None => {
                    if let Some(p) = self.tracker.position_mut() {
                        p.partial_taken = true;
                    }
                }
            }
        }

        if let (Some(trigger), false) = (management.breakeven_trigger_pct, position.breakeven_moved) {
            let price = match with_retry(&self.config.retry, "get_current_price", || {
                self.market.get_current_price(&symbol)
            }) {
                Ok(price) => price,
                Err(err) => return self.error_record(Some(bar.open_time), &err).with_actions(actions),
            };
            if position.breakeven_due(price, trigger) {
                if let Err(err) = self.exchange.set_stop(&symbol, position.entry_price) {
                    return self.error_record(Some(bar.open_time), &err).with_actions(actions);
                }
                info!(stop = position.entry_price, "stop moved to breakeven");
                if let Some(p) = self.tracker.position_mut() {
                    p.move_stop_to_entry();
                }
                actions.push(Action::BreakevenMoved {
                    stop_price: position.entry_price,
                });
            }
        }

        match self.tracker.position() {
            Some(p) => DecisionRecord::new(
                Some(bar.open_time),
                p.state(),
                DecisionOutcome::Held {
                    side: p.side,
                    stop_price: p.stop_price,
                    target_price: p.target_price,
                },
            )
            .with_actions(actions),
            None => self.error_record(
                Some(bar.open_time),
                &ScoretraderError::StateReconciliation {
                    reason: "position vanished during management".into(),
                },
            ),
        }
    }

    fn enter(&mut self, candles: &[Candle], bar: &Candle) -> DecisionRecord {
        let bar_open = Some(bar.open_time);
        let higher_candles = match self.strategy.higher_timeframe {
            Some(tf) => match self.fetch(tf) {
                Ok(c) => Some((tf, c)),
                Err(err) => return self.error_record(bar_open, &err),
            },
            None => None,
        };
        let set = self.feed.compute(candles);
        let higher_set = higher_candles.as_ref().map(|(_, c)| self.feed.compute(c));
        let higher = match (&higher_candles, &higher_set) {
            (Some((timeframe, candles)), Some(set)) => Some(HigherFrame {
                candles,
                set,
                timeframe: *timeframe,
            }),
            _ => None,
        };

        let index = candles.len().saturating_sub(1);
        let (plan, long, short) = match self.strategy.signal(candles, &set, higher.as_ref(), index) {
            Ok(Signal::Enter { plan, long, short }) => (plan, long, short),
            Ok(Signal::Skip {
                reason,
                long,
                short,
            }) => {
                return DecisionRecord::new(bar_open, self.tracker.state(), DecisionOutcome::Skipped { reason })
                    .with_scores(long, short);
            }
            Err(ScoretraderError::InsufficientHistory { have, need }) => {
                return DecisionRecord::new(
                    bar_open,
                    self.tracker.state(),
                    DecisionOutcome::Skipped {
                        reason: SkipReason::InsufficientHistory { have, need },
                    },
                );
            }
            Err(err) => return self.error_record(bar_open, &err),
        };

        let symbol = self.strategy.symbol.clone();
        let retry = self.config.retry;
        let balance = match with_retry(&retry, "get_account_balance", || {
            self.exchange.get_account_balance(&self.config.quote_asset)
        }) {
            Ok(b) => b,
            Err(err) => return self.scored_error(bar_open, &err, long, short),
        };
        let min_qty = match with_retry(&retry, "get_min_order_qty", || {
            self.exchange.get_min_order_qty(&symbol)
        }) {
            Ok(q) => q,
            Err(err) => return self.scored_error(bar_open, &err, long, short),
        };

        let size = match self.strategy.size(&plan, balance, min_qty) {
            SizeDecision::Sized { size, .. } => size,
            SizeDecision::CannotTrade { reason } => {
                warn!(balance, min_qty, reason = %reason, "entry not sized");
                return DecisionRecord::new(
                    bar_open,
                    self.tracker.state(),
                    DecisionOutcome::Skipped {
                        reason: SkipReason::InvalidSizing { reason },
                    },
                )
                .with_scores(long, short);
            }
        };

        let order = MarketOrder {
            symbol,
            side: plan.side,
            qty: size,
            stop_price: Some(plan.stop_price),
            target_price: Some(plan.target_price),
        };
        if let Err(err) = self.exchange.place_market_order(&order) {
            return self.scored_error(bar_open, &err, long, short);
        }

        self.tracker.open(Position::open(&plan, size, bar.open_time));
        let (year, month) = period_of(bar.open_time);
        self.ledger.on_open(year, month);
        DecisionRecord::new(
            bar_open,
            self.tracker.state(),
            DecisionOutcome::Entered {
                side: plan.side,
                entry_price: plan.entry_price,
                stop_price: plan.stop_price,
                target_price: plan.target_price,
                size,
            },
        )
        .with_scores(long, short)
    }

    fn error_record(&self, bar_open: Option<DateTime<Utc>>, err: &ScoretraderError) -> DecisionRecord {
        error!(error = %err, kind = err.kind(), "cycle aborted");
        DecisionRecord::new(bar_open, self.tracker.state(), DecisionOutcome::error(err))
    }

    fn scored_error(
        &self,
        bar_open: Option<DateTime<Utc>>,
        err: &ScoretraderError,
        long: Score,
        short: Score,
    ) -> DecisionRecord {
        self.error_record(bar_open, err).with_scores(long, short)
    }
}
