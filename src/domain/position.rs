//! Position state machine: entry planning, exits, breakeven and partial
//! management, and reconciliation with the exchange's view.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::domain::candle::Candle;
use crate::domain::error::ScoretraderError;
use crate::domain::feed::Snapshot;
use crate::domain::sizing::quantize_down;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1 for long, -1 for short.
    pub fn sign(&self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }

    pub fn opposite(&self) -> Side {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "long"),
            Side::Short => write!(f, "short"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionState {
    Flat,
    Long,
    Short,
}

impl PositionState {
    /// Maps the exchange's position side ("", "Buy", "Sell"). Anything else
    /// is an error rather than a guess.
    pub fn from_exchange_side(value: &str) -> Result<Self, ScoretraderError> {
        match value {
            "" | "None" => Ok(PositionState::Flat),
            "Buy" => Ok(PositionState::Long),
            "Sell" => Ok(PositionState::Short),
            other => Err(ScoretraderError::UnknownPositionSide {
                value: other.to_string(),
            }),
        }
    }

    pub fn side(&self) -> Option<Side> {
        match self {
            PositionState::Flat => None,
            PositionState::Long => Some(Side::Long),
            PositionState::Short => Some(Side::Short),
        }
    }
}

impl From<Side> for PositionState {
    fn from(side: Side) -> Self {
        match side {
            Side::Long => PositionState::Long,
            Side::Short => PositionState::Short,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    Target,
    Stop,
    Manual,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Target => write!(f, "target"),
            ExitReason::Stop => write!(f, "stop"),
            ExitReason::Manual => write!(f, "manual"),
        }
    }
}

/// Reference price for a new entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryReference {
    /// Previous bar's high for longs, low for shorts.
    PriorExtreme,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolatilityStop {
    pub atr_multiple: f64,
    /// |Williams %R| above this counts as volatile.
    pub threshold: f64,
    pub volatile_factor: f64,
    pub calm_factor: f64,
}

/// Stop distance candidates. The smallest positive candidate wins and is
/// floored at `min_stop_pct` of entry.
#[derive(Debug, Clone, PartialEq)]
pub struct StopPolicy {
    pub atr_multiple: Option<f64>,
    pub swing_bars: Option<usize>,
    pub volatility: Option<VolatilityStop>,
    pub min_stop_pct: Option<f64>,
}

impl Default for StopPolicy {
    fn default() -> Self {
        Self {
            atr_multiple: Some(2.5),
            swing_bars: Some(10),
            volatility: Some(VolatilityStop {
                atr_multiple: 2.5,
                threshold: 80.0,
                volatile_factor: 1.5,
                calm_factor: 1.2,
            }),
            min_stop_pct: Some(0.5),
        }
    }
}

impl StopPolicy {
    /// `window` holds the bars before the entry bar, oldest first.
    pub fn distance(
        &self,
        side: Side,
        entry: f64,
        atr: Option<f64>,
        williams_r: Option<f64>,
        window: &[Candle],
    ) -> Option<f64> {
        let mut candidates = Vec::with_capacity(3);

        if let (Some(k), Some(atr)) = (self.atr_multiple, atr) {
            candidates.push(atr * k);
        }
        if let Some(bars) = self.swing_bars {
            let start = window.len().saturating_sub(bars);
            let recent = &window[start..];
            if !recent.is_empty() {
                let swing = match side {
                    Side::Long => entry - recent.iter().map(|c| c.low).fold(f64::MAX, f64::min),
                    Side::Short => recent.iter().map(|c| c.high).fold(f64::MIN, f64::max) - entry,
                };
                candidates.push(swing);
            }
        }
        if let (Some(v), Some(atr)) = (self.volatility, atr) {
            let factor = match williams_r {
                Some(w) if w.abs() > v.threshold => v.volatile_factor,
                _ => v.calm_factor,
            };
            candidates.push(atr * v.atr_multiple * factor);
        }

        let best = candidates
            .into_iter()
            .filter(|d| d.is_finite() && *d > 0.0)
            .fold(None, |best: Option<f64>, d| Some(best.map_or(d, |b| b.min(d))));
        let floor = self.min_stop_pct.map(|pct| entry * pct / 100.0);

        match (best, floor) {
            (Some(d), Some(f)) => Some(d.max(f)),
            (Some(d), None) => Some(d),
            (None, Some(f)) if f > 0.0 => Some(f),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartialExit {
    /// Favourable move, in percent of entry, at which the partial fills.
    pub trigger_pct: f64,
    /// Share of the position closed by the partial.
    pub fraction: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Management {
    pub entry_reference: EntryReference,
    pub risk_reward: f64,
    /// Favourable move, in percent of entry, that moves the stop to entry.
    pub breakeven_trigger_pct: Option<f64>,
    pub partial: Option<PartialExit>,
}

impl Default for Management {
    fn default() -> Self {
        Self {
            entry_reference: EntryReference::PriorExtreme,
            risk_reward: 3.1,
            breakeven_trigger_pct: Some(0.5),
            partial: Some(PartialExit {
                trigger_pct: 1.0,
                fraction: 0.5,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryPlan {
    pub side: Side,
    pub entry_price: f64,
    pub stop_price: f64,
    pub target_price: f64,
    pub stop_distance: f64,
    pub partial_price: Option<f64>,
}

/// Plans an entry at bar `index`. `None` when no stop distance can be set.
pub fn plan_entry(
    side: Side,
    candles: &[Candle],
    index: usize,
    snapshot: &Snapshot,
    stops: &StopPolicy,
    management: &Management,
) -> Option<EntryPlan> {
    let entry_price = match (management.entry_reference, index.checked_sub(1)) {
        (EntryReference::PriorExtreme, Some(prev)) => match side {
            Side::Long => candles.get(prev)?.high,
            Side::Short => candles.get(prev)?.low,
        },
        _ => snapshot.close,
    };
    if entry_price <= 0.0 {
        return None;
    }

    let window = &candles[..index.min(candles.len())];
    let stop_distance = stops.distance(side, entry_price, snapshot.atr, snapshot.williams_r, window)?;
    let s = side.sign();

    Some(EntryPlan {
        side,
        entry_price,
        stop_price: entry_price - s * stop_distance,
        target_price: entry_price + s * stop_distance * management.risk_reward,
        stop_distance,
        partial_price: management
            .partial
            .map(|p| entry_price * (1.0 + s * p.trigger_pct / 100.0)),
    })
}

/// Quantity closed by a partial exit, rounded down to the order step.
/// `None` when nothing would be left open or nothing would be closed.
pub fn partial_quantity(size: f64, fraction: f64, min_qty: f64) -> Option<f64> {
    let (steps, qty) = quantize_down(size * fraction, min_qty);
    if steps == 0 || qty >= size {
        None
    } else {
        Some(qty)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PartialFill {
    pub price: f64,
    pub size: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    pub side: Side,
    pub entry_price: f64,
    pub stop_price: f64,
    pub target_price: f64,
    /// Open quantity, reduced by a partial exit.
    pub size: f64,
    pub opened_at: DateTime<Utc>,
    pub partial_taken: bool,
    pub breakeven_moved: bool,
    pub partial_price: Option<f64>,
    pub partial_fill: Option<PartialFill>,
    /// Reduce-only partial resting on the exchange, not yet filled.
    pub pending_partial: Option<PartialFill>,
}

impl Position {
    pub fn open(plan: &EntryPlan, size: f64, opened_at: DateTime<Utc>) -> Self {
        Self {
            side: plan.side,
            entry_price: plan.entry_price,
            stop_price: plan.stop_price,
            target_price: plan.target_price,
            size,
            opened_at,
            partial_taken: false,
            breakeven_moved: false,
            partial_price: plan.partial_price,
            partial_fill: None,
            pending_partial: None,
        }
    }

    pub fn state(&self) -> PositionState {
        self.side.into()
    }

    /// Signed move from entry in percent, positive when in profit.
    pub fn move_pct(&self, price: f64) -> f64 {
        self.side.sign() * (price - self.entry_price) / self.entry_price * 100.0
    }

    pub fn target_hit(&self, candle: &Candle) -> bool {
        match self.side {
            Side::Long => candle.high >= self.target_price,
            Side::Short => candle.low <= self.target_price,
        }
    }

    pub fn stop_hit(&self, candle: &Candle) -> bool {
        match self.side {
            Side::Long => candle.low <= self.stop_price,
            Side::Short => candle.high >= self.stop_price,
        }
    }

    /// Exit triggered by `candle`, if any. The target is checked first.
    pub fn exit_on(&self, candle: &Candle) -> Option<(ExitReason, f64)> {
        if self.target_hit(candle) {
            Some((ExitReason::Target, self.target_price))
        } else if self.stop_hit(candle) {
            Some((ExitReason::Stop, self.stop_price))
        } else {
            None
        }
    }

    /// True when `price` is far enough in profit and the entry would be a
    /// tighter stop than the current one.
    pub fn breakeven_due(&self, price: f64, trigger_pct: f64) -> bool {
        !self.breakeven_moved
            && self.move_pct(price) >= trigger_pct
            && is_more_favourable(self.side, self.entry_price, self.stop_price)
    }

    pub fn move_stop_to_entry(&mut self) {
        if is_more_favourable(self.side, self.entry_price, self.stop_price) {
            self.stop_price = self.entry_price;
        }
        self.breakeven_moved = true;
    }

    /// Partial target price when `candle` reaches it and no partial was taken.
    pub fn partial_due(&self, candle: &Candle) -> Option<f64> {
        if self.partial_taken {
            return None;
        }
        let price = self.partial_price?;
        let reached = match self.side {
            Side::Long => candle.high >= price,
            Side::Short => candle.low <= price,
        };
        reached.then_some(price)
    }

    /// Books a filled partial; repeated fills average into one leg.
    pub fn record_partial(&mut self, price: f64, size: f64) {
        self.partial_taken = true;
        self.partial_fill = Some(match self.partial_fill {
            Some(prev) => PartialFill {
                price: (prev.price * prev.size + price * size) / (prev.size + size),
                size: prev.size + size,
            },
            None => PartialFill { price, size },
        });
        self.size -= size;
    }

    /// Marks a partial order as placed. The size only drops once the
    /// exchange reports the fill.
    pub fn place_partial(&mut self, price: f64, size: f64) {
        self.partial_taken = true;
        self.pending_partial = Some(PartialFill { price, size });
    }

    /// Books the share of a resting partial implied by the exchange size
    /// falling to `remote_size`.
    fn fill_pending(&mut self, remote_size: f64) -> Option<PartialFill> {
        let pending = self.pending_partial?;
        let filled = (self.size - remote_size).min(pending.size);
        if filled <= 0.0 {
            return None;
        }
        let left = pending.size - filled;
        self.pending_partial = (left > f64::EPSILON).then_some(PartialFill {
            price: pending.price,
            size: left,
        });
        self.record_partial(pending.price, filled);
        Some(PartialFill {
            price: pending.price,
            size: filled,
        })
    }

    /// Closes the remaining size at `exit_price`; the partial leg, if any,
    /// is blended in by size.
    pub fn outcome(
        &self,
        exit_price: f64,
        reason: ExitReason,
        closed_at: DateTime<Utc>,
        leverage: f64,
    ) -> TradeOutcome {
        let final_leg = self.move_pct(exit_price);
        let move_pct = match self.partial_fill {
            Some(fill) if fill.size + self.size > 0.0 => {
                (fill.size * self.move_pct(fill.price) + self.size * final_leg)
                    / (fill.size + self.size)
            }
            _ => final_leg,
        };
        TradeOutcome {
            side: self.side,
            entry: self.entry_price,
            exit: exit_price,
            pnl_pct: move_pct * leverage,
            reason,
            opened_at: self.opened_at,
            closed_at,
            size: self.size + self.partial_fill.map_or(0.0, |f| f.size),
        }
    }
}

fn is_more_favourable(side: Side, candidate: f64, current: f64) -> bool {
    match side {
        Side::Long => candidate > current,
        Side::Short => candidate < current,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeOutcome {
    pub side: Side,
    pub entry: f64,
    pub exit: f64,
    /// Leveraged return on the position, in percent.
    pub pnl_pct: f64,
    pub reason: ExitReason,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    pub size: f64,
}

impl TradeOutcome {
    pub fn is_win(&self) -> bool {
        self.pnl_pct > 0.0
    }
}

/// Open position as the exchange reports it.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangePosition {
    pub side: Side,
    pub entry_price: f64,
    pub stop_price: f64,
    pub target_price: f64,
    pub size: f64,
}

impl ExchangePosition {
    /// Parses the exchange's string fields; empty prices read as 0 and a
    /// flat side yields `None`.
    pub fn from_wire(
        side: &str,
        avg_price: &str,
        stop_loss: &str,
        take_profit: &str,
        size: &str,
    ) -> Result<Option<Self>, ScoretraderError> {
        let Some(side) = PositionState::from_exchange_side(side)?.side() else {
            return Ok(None);
        };
        Ok(Some(Self {
            side,
            entry_price: wire_number("avgPrice", avg_price)?,
            stop_price: wire_number("stopLoss", stop_loss)?,
            target_price: wire_number("takeProfit", take_profit)?,
            size: wire_number("size", size)?,
        }))
    }
}

fn wire_number(field: &str, value: &str) -> Result<f64, ScoretraderError> {
    if value.trim().is_empty() {
        return Ok(0.0);
    }
    value.trim().parse().map_err(|_| ScoretraderError::Exchange {
        operation: "get_open_position".into(),
        reason: format!("{} is not a number: {:?}", field, value),
    })
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    InSync,
    /// Exchange reports a position the local view did not know about.
    Adopted,
    /// Both sides agree a position is open; stop/target/size were refreshed.
    /// `filled` is the part of a resting partial the exchange has taken.
    Refreshed { filled: Option<PartialFill> },
    /// The local position is gone on the exchange. `adopted` is set when the
    /// exchange holds the opposite side, which now is the local position.
    ClosedExternally { trade: TradeOutcome, adopted: bool },
}

/// Local position view plus re-entry bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct PositionTracker {
    position: Option<Position>,
    last_closed_bar: Option<DateTime<Utc>>,
}

impl PositionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn position_mut(&mut self) -> Option<&mut Position> {
        self.position.as_mut()
    }

    pub fn state(&self) -> PositionState {
        self.position
            .as_ref()
            .map_or(PositionState::Flat, Position::state)
    }

    pub fn last_closed_bar(&self) -> Option<DateTime<Utc>> {
        self.last_closed_bar
    }

    /// Flat, and the bar is not the one that closed the last trade.
    pub fn can_enter(&self, bar_open: DateTime<Utc>) -> bool {
        self.position.is_none() && self.last_closed_bar != Some(bar_open)
    }

    pub fn open(&mut self, position: Position) {
        self.position = Some(position);
    }

    pub fn close(
        &mut self,
        exit_price: f64,
        reason: ExitReason,
        bar_open: DateTime<Utc>,
        leverage: f64,
    ) -> Option<TradeOutcome> {
        let position = self.position.take()?;
        self.last_closed_bar = Some(bar_open);
        Some(position.outcome(exit_price, reason, bar_open, leverage))
    }

    /// Brings the local view in line with the exchange, which is
    /// authoritative on whether a position is open.
    pub fn reconcile(
        &mut self,
        exchange: Option<&ExchangePosition>,
        bar: &Candle,
        leverage: f64,
    ) -> Reconciliation {
        match (self.position.as_mut(), exchange) {
            (None, None) => Reconciliation::InSync,
            (None, Some(remote)) => {
                self.adopt(remote, bar);
                Reconciliation::Adopted
            }
            (Some(local), Some(remote)) if local.side == remote.side => {
                if remote.stop_price > 0.0 {
                    local.stop_price = remote.stop_price;
                }
                if remote.target_price > 0.0 {
                    local.target_price = remote.target_price;
                }
                let mut filled = None;
                if remote.size > 0.0 {
                    filled = local.fill_pending(remote.size);
                    local.size = remote.size;
                }
                Reconciliation::Refreshed { filled }
            }
            (Some(local), remote) => {
                let (reason, price) = local
                    .exit_on(bar)
                    .unwrap_or((ExitReason::Manual, bar.close));
                let Some(trade) = self.close(price, reason, bar.open_time, leverage) else {
                    return Reconciliation::InSync;
                };
                if let Some(remote) = remote {
                    self.adopt(remote, bar);
                }
                Reconciliation::ClosedExternally {
                    trade,
                    adopted: remote.is_some(),
                }
            }
        }
    }

    fn adopt(&mut self, remote: &ExchangePosition, bar: &Candle) {
        self.position = Some(Position {
            side: remote.side,
            entry_price: remote.entry_price,
            stop_price: remote.stop_price,
            target_price: remote.target_price,
            size: remote.size,
            opened_at: bar.open_time,
            partial_taken: false,
            breakeven_moved: false,
            partial_price: None,
            partial_fill: None,
            pending_partial: None,
        });
    }
}
