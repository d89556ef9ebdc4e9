//! Performance ledger: compounding balance, monthly buckets and running
//! maximum drawdown.

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::domain::error::ScoretraderError;

/// When exchange fees are taken from the balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeTiming {
    /// One fee, charged on open.
    OpenOnly,
    /// Both legs' fees, charged together on open.
    RoundTripOnOpen,
    /// One fee on open and one on close.
    OpenAndClose,
}

impl FromStr for FeeTiming {
    type Err = ScoretraderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "open_only" => Ok(FeeTiming::OpenOnly),
            "round_trip_on_open" => Ok(FeeTiming::RoundTripOnOpen),
            "open_and_close" => Ok(FeeTiming::OpenAndClose),
            other => Err(ScoretraderError::ConfigInvalid {
                section: "fees".into(),
                key: "timing".into(),
                reason: format!(
                    "unknown fee timing {:?} (expected open_only, round_trip_on_open or open_and_close)",
                    other
                ),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeePolicy {
    /// Exchange fee per leg, in percent of notional.
    pub fee_pct: f64,
    pub timing: FeeTiming,
    pub leverage: f64,
}

impl FeePolicy {
    pub fn none() -> Self {
        Self {
            fee_pct: 0.0,
            timing: FeeTiming::OpenOnly,
            leverage: 1.0,
        }
    }

    /// Fraction of balance charged per fee leg.
    pub fn per_leg(&self) -> f64 {
        self.fee_pct * self.leverage / 100.0
    }

    pub fn on_open(&self) -> f64 {
        match self.timing {
            FeeTiming::OpenOnly | FeeTiming::OpenAndClose => self.per_leg(),
            FeeTiming::RoundTripOnOpen => 2.0 * self.fee_pct * self.leverage / 100.0,
        }
    }

    pub fn on_close(&self) -> f64 {
        match self.timing {
            FeeTiming::OpenAndClose => self.per_leg(),
            FeeTiming::OpenOnly | FeeTiming::RoundTripOnOpen => 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthStats {
    pub opened: u32,
    pub wins: u32,
    pub losses: u32,
    pub gain_pct_sum: f64,
    /// Sum of loss magnitudes (positive).
    pub loss_pct_sum: f64,
    pub opening_balance: f64,
    pub closing_balance: f64,
    /// Running maximum drawdown as of the last event in this month.
    pub max_drawdown_pct: f64,
}

/// (year, month) of a timestamp.
pub fn period_of(time: DateTime<Utc>) -> (i32, u32) {
    (time.year(), time.month())
}

#[derive(Debug, Clone)]
pub struct Ledger {
    initial_balance: f64,
    balance: f64,
    peak_balance: f64,
    trough_since_peak: f64,
    max_drawdown_pct: f64,
    fees: FeePolicy,
    buckets: BTreeMap<(i32, u32), MonthStats>,
}

impl Ledger {
    pub fn new(initial_balance: f64, fees: FeePolicy) -> Self {
        Self {
            initial_balance,
            balance: initial_balance,
            peak_balance: initial_balance,
            trough_since_peak: initial_balance,
            max_drawdown_pct: 0.0,
            fees,
            buckets: BTreeMap::new(),
        }
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn peak_balance(&self) -> f64 {
        self.peak_balance
    }

    pub fn trough_since_peak(&self) -> f64 {
        self.trough_since_peak
    }

    pub fn max_drawdown_pct(&self) -> f64 {
        self.max_drawdown_pct
    }

    pub fn buckets(&self) -> &BTreeMap<(i32, u32), MonthStats> {
        &self.buckets
    }

    /// Bucket for (year, month), created on first touch.
    pub fn touch(&mut self, year: i32, month: u32) -> &mut MonthStats {
        let balance = self.balance;
        let max_drawdown_pct = self.max_drawdown_pct;
        self.buckets.entry((year, month)).or_insert_with(|| MonthStats {
            opened: 0,
            wins: 0,
            losses: 0,
            gain_pct_sum: 0.0,
            loss_pct_sum: 0.0,
            opening_balance: balance,
            closing_balance: balance,
            max_drawdown_pct,
        })
    }

    pub fn on_open(&mut self, year: i32, month: u32) {
        let fee = self.fees.on_open();
        if fee > 0.0 {
            self.balance *= 1.0 - fee;
        }
        let balance = self.balance;
        let bucket = self.touch(year, month);
        bucket.opened += 1;
        bucket.closing_balance = balance;
    }

    /// Records a closed trade; zero or negative pnl counts as a loss.
    pub fn on_close(&mut self, year: i32, month: u32, pnl_pct: f64) {
        if pnl_pct > 0.0 {
            self.on_gain(year, month, pnl_pct);
        } else {
            self.on_loss(year, month, -pnl_pct);
        }
    }

    pub fn on_gain(&mut self, year: i32, month: u32, gain_pct: f64) {
        self.balance *= 1.0 + gain_pct / 100.0;
        self.charge_close_fee();
        if self.balance > self.peak_balance {
            self.peak_balance = self.balance;
            self.trough_since_peak = self.balance;
        }
        let balance = self.balance;
        let bucket = self.touch(year, month);
        bucket.wins += 1;
        bucket.gain_pct_sum += gain_pct;
        bucket.closing_balance = balance;
    }

    /// `loss_pct` is the loss magnitude.
    pub fn on_loss(&mut self, year: i32, month: u32, loss_pct: f64) {
        self.balance *= 1.0 - loss_pct / 100.0;
        self.charge_close_fee();
        if self.balance < self.trough_since_peak {
            self.trough_since_peak = self.balance;
        }
        let drawdown = if self.peak_balance > 0.0 {
            (self.peak_balance - self.trough_since_peak) / self.peak_balance * 100.0
        } else {
            0.0
        };
        self.max_drawdown_pct = self.max_drawdown_pct.max(drawdown);

        let balance = self.balance;
        let max_drawdown_pct = self.max_drawdown_pct;
        let bucket = self.touch(year, month);
        bucket.losses += 1;
        bucket.loss_pct_sum += loss_pct;
        bucket.closing_balance = balance;
        bucket.max_drawdown_pct = bucket.max_drawdown_pct.max(max_drawdown_pct);
    }

    fn charge_close_fee(&mut self) {
        let fee = self.fees.on_close();
        if fee > 0.0 {
            self.balance *= 1.0 - fee;
        }
    }

    pub fn report(&self) -> LedgerReport {
        let months = self
            .buckets
            .iter()
            .map(|(&(year, month), stats)| MonthReport {
                year,
                month,
                stats: PeriodStats::from_months(std::iter::once(stats)),
            })
            .collect();

        let mut by_year: BTreeMap<i32, Vec<&MonthStats>> = BTreeMap::new();
        for (&(year, _), stats) in &self.buckets {
            by_year.entry(year).or_default().push(stats);
        }
        let years = by_year
            .into_iter()
            .map(|(year, stats)| YearReport {
                year,
                stats: PeriodStats::from_months(stats.into_iter()),
            })
            .collect();

        let mut overall = PeriodStats::from_months(self.buckets.values());
        overall.opening_balance = self.initial_balance;
        overall.closing_balance = self.balance;
        overall.max_drawdown_pct = self.max_drawdown_pct;
        overall.return_pct = return_pct(self.initial_balance, self.balance);

        LedgerReport {
            initial_balance: self.initial_balance,
            final_balance: self.balance,
            peak_balance: self.peak_balance,
            fee_timing: self.fees.timing,
            overall,
            years,
            months,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodStats {
    pub opened: u32,
    pub wins: u32,
    pub losses: u32,
    pub win_rate_pct: f64,
    pub avg_win_pct: f64,
    pub avg_loss_pct: f64,
    pub gain_pct_sum: f64,
    pub loss_pct_sum: f64,
    pub max_drawdown_pct: f64,
    pub opening_balance: f64,
    pub closing_balance: f64,
    pub return_pct: f64,
}

impl PeriodStats {
    /// Sums months in chronological order. Ratios over zero trades are 0.
    pub fn from_months<'a>(months: impl Iterator<Item = &'a MonthStats>) -> Self {
        let mut stats = PeriodStats {
            opened: 0,
            wins: 0,
            losses: 0,
            win_rate_pct: 0.0,
            avg_win_pct: 0.0,
            avg_loss_pct: 0.0,
            gain_pct_sum: 0.0,
            loss_pct_sum: 0.0,
            max_drawdown_pct: 0.0,
            opening_balance: 0.0,
            closing_balance: 0.0,
            return_pct: 0.0,
        };
        let mut first = true;
        for month in months {
            if first {
                stats.opening_balance = month.opening_balance;
                first = false;
            }
            stats.opened += month.opened;
            stats.wins += month.wins;
            stats.losses += month.losses;
            stats.gain_pct_sum += month.gain_pct_sum;
            stats.loss_pct_sum += month.loss_pct_sum;
            stats.max_drawdown_pct = stats.max_drawdown_pct.max(month.max_drawdown_pct);
            stats.closing_balance = month.closing_balance;
        }

        let closed = stats.wins + stats.losses;
        stats.win_rate_pct = ratio(stats.wins as f64 * 100.0, closed);
        stats.avg_win_pct = ratio(stats.gain_pct_sum, stats.wins);
        stats.avg_loss_pct = ratio(stats.loss_pct_sum, stats.losses);
        stats.return_pct = return_pct(stats.opening_balance, stats.closing_balance);
        stats
    }
}

fn ratio(numerator: f64, count: u32) -> f64 {
    if count == 0 {
        0.0
    } else {
        numerator / count as f64
    }
}

fn return_pct(opening: f64, closing: f64) -> f64 {
    if opening > 0.0 {
        (closing / opening - 1.0) * 100.0
    } else {
        0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthReport {
    pub year: i32,
    pub month: u32,
    #[serde(flatten)]
    pub stats: PeriodStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearReport {
    pub year: i32,
    #[serde(flatten)]
    pub stats: PeriodStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerReport {
    pub initial_balance: f64,
    pub final_balance: f64,
    pub peak_balance: f64,
    pub fee_timing: FeeTiming,
    pub overall: PeriodStats,
    pub years: Vec<YearReport>,
    pub months: Vec<MonthReport>,
}
