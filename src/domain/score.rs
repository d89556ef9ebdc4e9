//! Signal scorer: weighted criteria evaluated per direction.
//!
//! Scoring is a pure function of the snapshots it is given. A criterion
//! whose inputs are unavailable is reported as not satisfied.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::domain::error::ScoretraderError;
use crate::domain::feed::{Snapshot, TrendView};
use crate::domain::position::Side;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    HigherTimeframeTrend,
    EmaAlignment,
    RsiBand,
    AdxStrength,
    VolumeSurge,
    VwapSide,
    CciNotExtreme,
    WilliamsBand,
    MomentumSign,
    Breakout,
    Exhaustion,
}

impl Criterion {
    /// Criteria in evaluation order, with the points each scores by default.
    pub const DEFAULTS: [(Criterion, i32); 10] = [
        (Criterion::HigherTimeframeTrend, 2),
        (Criterion::EmaAlignment, 1),
        (Criterion::RsiBand, 1),
        (Criterion::AdxStrength, 1),
        (Criterion::VolumeSurge, 1),
        (Criterion::VwapSide, 1),
        (Criterion::CciNotExtreme, 1),
        (Criterion::WilliamsBand, 1),
        (Criterion::MomentumSign, 1),
        (Criterion::Breakout, 1),
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Criterion::HigherTimeframeTrend => "higher_timeframe_trend",
            Criterion::EmaAlignment => "ema_alignment",
            Criterion::RsiBand => "rsi_band",
            Criterion::AdxStrength => "adx_strength",
            Criterion::VolumeSurge => "volume_surge",
            Criterion::VwapSide => "vwap_side",
            Criterion::CciNotExtreme => "cci_not_extreme",
            Criterion::WilliamsBand => "williams_band",
            Criterion::MomentumSign => "momentum_sign",
            Criterion::Breakout => "breakout",
            Criterion::Exhaustion => "exhaustion",
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Criterion {
    type Err = ScoretraderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Criterion::DEFAULTS
            .iter()
            .map(|(c, _)| *c)
            .find(|c| c.key() == s.trim())
            .ok_or_else(|| ScoretraderError::ConfigInvalid {
                section: "criteria".into(),
                key: s.trim().to_string(),
                reason: "unknown criterion".into(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedCriterion {
    pub criterion: Criterion,
    pub points: i32,
}

/// Numeric bands the criteria compare against.
#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds {
    pub rsi_long_min: f64,
    pub rsi_long_max: f64,
    pub rsi_short_min: f64,
    pub rsi_short_max: f64,
    pub adx_min: f64,
    pub volume_factor: f64,
    pub cci_extreme: f64,
    pub williams_low: f64,
    pub williams_high: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            rsi_long_min: 35.0,
            rsi_long_max: 70.0,
            rsi_short_min: 30.0,
            rsi_short_max: 65.0,
            adx_min: 25.0,
            volume_factor: 1.5,
            cci_extreme: 100.0,
            williams_low: -80.0,
            williams_high: -20.0,
        }
    }
}

/// Run-length adjustment: reward a fresh reversal, punish chasing an
/// extended run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExhaustionRule {
    pub min_run: usize,
    pub max_run: usize,
    pub reversal_bonus: i32,
    pub overrun_penalty: i32,
    pub veto: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoringConfig {
    pub criteria: Vec<WeightedCriterion>,
    pub thresholds: Thresholds,
    pub exhaustion: Option<ExhaustionRule>,
    pub min_score: i32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            criteria: Criterion::DEFAULTS
                .iter()
                .map(|&(criterion, points)| WeightedCriterion { criterion, points })
                .collect(),
            thresholds: Thresholds::default(),
            exhaustion: None,
            min_score: 6,
        }
    }
}

impl ScoringConfig {
    /// Highest total a direction can reach.
    pub fn max_score(&self) -> i32 {
        let criteria: i32 = self.criteria.iter().map(|c| c.points.max(0)).sum();
        let bonus = self
            .exhaustion
            .as_ref()
            .map(|e| e.reversal_bonus.max(0))
            .unwrap_or(0);
        criteria + bonus
    }
}

/// Bars the scorer looks at for one decision.
#[derive(Debug, Clone, Copy)]
pub struct ScoreInput<'a> {
    pub current: &'a Snapshot,
    pub previous: &'a Snapshot,
    pub higher: Option<&'a TrendView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Component {
    pub criterion: Criterion,
    pub points: i32,
    pub satisfied: bool,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Score {
    pub direction: Side,
    pub total: i32,
    pub max_score: i32,
    pub components: Vec<Component>,
    pub vetoed: bool,
}

pub fn score(config: &ScoringConfig, direction: Side, input: &ScoreInput<'_>) -> Score {
    let mut components: Vec<Component> = config
        .criteria
        .iter()
        .map(|wc| {
            let (satisfied, detail) = evaluate(wc.criterion, direction, &config.thresholds, input);
            Component {
                criterion: wc.criterion,
                points: if satisfied { wc.points } else { 0 },
                satisfied,
                detail,
            }
        })
        .collect();

    let mut vetoed = false;
    if let Some(rule) = &config.exhaustion {
        let (component, veto) = exhaustion(rule, direction, input.current, input.previous);
        vetoed = veto;
        components.push(component);
    }

    let max_score = config.max_score();
    let raw: i32 = components.iter().map(|c| c.points).sum();
    Score {
        direction,
        total: raw.clamp(0, max_score),
        max_score,
        components,
        vetoed,
    }
}

/// Accepts a direction only when it clears the minimum, beats the other
/// side and has not been vetoed.
pub fn decide(long: &Score, short: &Score, min_score: i32) -> Option<Side> {
    let accepts = |mine: &Score, other: &Score| {
        !mine.vetoed && mine.total >= min_score && mine.total > other.total
    };
    if accepts(long, short) {
        Some(Side::Long)
    } else if accepts(short, long) {
        Some(Side::Short)
    } else {
        None
    }
}

fn evaluate(
    criterion: Criterion,
    direction: Side,
    t: &Thresholds,
    input: &ScoreInput<'_>,
) -> (bool, String) {
    let cur = input.current;
    let long = direction == Side::Long;
    match criterion {
        Criterion::HigherTimeframeTrend => match input.higher {
            None => (false, "no higher timeframe candle".into()),
            Some(h) => stacked(direction, h.ema_fast, h.ema_slow, h.ema_trend),
        },
        Criterion::EmaAlignment => stacked(direction, cur.ema_fast, cur.ema_slow, cur.ema_trend),
        Criterion::RsiBand => with_value(cur.rsi, "rsi", |rsi| {
            let (lo, hi) = if long {
                (t.rsi_long_min, t.rsi_long_max)
            } else {
                (t.rsi_short_min, t.rsi_short_max)
            };
            (lo..=hi).contains(&rsi)
        }),
        Criterion::AdxStrength => with_value(cur.adx, "adx", |adx| adx >= t.adx_min),
        Criterion::VolumeSurge => match cur.volume_ema {
            None => (false, "volume ema unavailable".into()),
            Some(ema) => (
                cur.volume >= ema * t.volume_factor,
                format!("volume {:.2} vs {:.2}x ema {:.2}", cur.volume, t.volume_factor, ema),
            ),
        },
        Criterion::VwapSide => with_value(cur.vwap, "vwap", |vwap| {
            if long { cur.close > vwap } else { cur.close < vwap }
        }),
        Criterion::CciNotExtreme => with_value(cur.cci, "cci", |cci| {
            if long { cci > -t.cci_extreme } else { cci < t.cci_extreme }
        }),
        Criterion::WilliamsBand => with_value(cur.williams_r, "williams %r", |w| {
            (t.williams_low..=t.williams_high).contains(&w)
        }),
        Criterion::MomentumSign => with_value(cur.momentum, "momentum", |m| {
            if long { m > 100.0 } else { m < 100.0 }
        }),
        Criterion::Breakout => {
            let prev = input.previous;
            if long {
                (
                    cur.high > prev.high,
                    format!("high {:.4} vs previous {:.4}", cur.high, prev.high),
                )
            } else {
                (
                    cur.low < prev.low,
                    format!("low {:.4} vs previous {:.4}", cur.low, prev.low),
                )
            }
        }
        // applied separately as an adjustment
        Criterion::Exhaustion => (false, "not a weighted criterion".into()),
    }
}

fn with_value(value: Option<f64>, name: &str, test: impl Fn(f64) -> bool) -> (bool, String) {
    match value {
        None => (false, format!("{} unavailable", name)),
        Some(v) => (test(v), format!("{} {:.2}", name, v)),
    }
}

fn stacked(
    direction: Side,
    fast: Option<f64>,
    slow: Option<f64>,
    trend: Option<f64>,
) -> (bool, String) {
    match (fast, slow, trend) {
        (Some(f), Some(s), Some(t)) => {
            let ok = match direction {
                Side::Long => f > s && s > t,
                Side::Short => f < s && s < t,
            };
            (ok, format!("ema {:.4} / {:.4} / {:.4}", f, s, t))
        }
        _ => (false, "ema stack unavailable".into()),
    }
}

fn exhaustion(
    rule: &ExhaustionRule,
    direction: Side,
    current: &Snapshot,
    previous: &Snapshot,
) -> (Component, bool) {
    let (reversed, prior_run, same_run) = match direction {
        Side::Long => (current.bull_run == 1, previous.bear_run, current.bull_run),
        Side::Short => (current.bear_run == 1, previous.bull_run, current.bear_run),
    };

    if reversed && prior_run >= rule.min_run {
        let component = Component {
            criterion: Criterion::Exhaustion,
            points: rule.reversal_bonus,
            satisfied: true,
            detail: format!("reversal after {} opposite candles", prior_run),
        };
        return (component, false);
    }

    if same_run > rule.max_run {
        let component = Component {
            criterion: Criterion::Exhaustion,
            points: if rule.veto { 0 } else { -rule.overrun_penalty },
            satisfied: false,
            detail: format!("run of {} candles exceeds {}", same_run, rule.max_run),
        };
        return (component, rule.veto);
    }

    let component = Component {
        criterion: Criterion::Exhaustion,
        points: 0,
        satisfied: false,
        detail: format!("run of {} candles", same_run),
    };
    (component, false)
}


#[cfg(test)]
mod tests {
    use super::test_support::uptrend_snapshot;
    use super::*;

    fn input<'a>(cur: &'a Snapshot, prev: &'a Snapshot) -> ScoreInput<'a> {
        ScoreInput {
            current: cur,
            previous: prev,
            higher: None,
        }
    }

    #[test]
    fn uptrend_favours_long() {
        let config = ScoringConfig::default();
        let (prev, cur) = (uptrend_snapshot(8), uptrend_snapshot(9));
        let long = score(&config, Side::Long, &input(&cur, &prev));
        let short = score(&config, Side::Short, &input(&cur, &prev));

        // everything but the higher timeframe and williams
        assert_eq!(long.total, 8);
        assert_eq!(long.max_score, 11);
        assert!(long.total >= config.min_score);
        assert!(short.total < config.min_score);
        assert_eq!(decide(&long, &short, config.min_score), Some(Side::Long));
    }

    #[test]
    fn components_keep_configured_order() {
        let config = ScoringConfig::default();
        let (prev, cur) = (uptrend_snapshot(0), uptrend_snapshot(1));
        let long = score(&config, Side::Long, &input(&cur, &prev));
        let order: Vec<Criterion> = long.components.iter().map(|c| c.criterion).collect();
        let expected: Vec<Criterion> = Criterion::DEFAULTS.iter().map(|(c, _)| *c).collect();
        assert_eq!(order, expected);
        assert!(long.components.iter().all(|c| !c.detail.is_empty()));
    }

    #[test]
    fn unavailable_values_do_not_score() {
        let config = ScoringConfig::default();
        let prev = uptrend_snapshot(0);
        let mut cur = uptrend_snapshot(1);
        cur.vwap = None;
        cur.momentum = None;
        let long = score(&config, Side::Long, &input(&cur, &prev));
        let vwap = long
            .components
            .iter()
            .find(|c| c.criterion == Criterion::VwapSide)
            .unwrap();
        assert!(!vwap.satisfied);
        assert_eq!(vwap.points, 0);
        assert_eq!(long.total, 6);
    }

    #[test]
    fn volume_at_exact_threshold_scores() {
        let config = ScoringConfig::default();
        let prev = uptrend_snapshot(0);
        let mut cur = uptrend_snapshot(1);
        cur.volume = 1000.0 * config.thresholds.volume_factor;
        let long = score(&config, Side::Long, &input(&cur, &prev));
        let volume = long
            .components
            .iter()
            .find(|c| c.criterion == Criterion::VolumeSurge)
            .unwrap();
        assert!(volume.satisfied);

        cur.volume -= 0.01;
        let long = score(&config, Side::Long, &input(&cur, &prev));
        let volume = long
            .components
            .iter()
            .find(|c| c.criterion == Criterion::VolumeSurge)
            .unwrap();
        assert!(!volume.satisfied);
    }

    #[test]
    fn higher_timeframe_adds_two() {
        let config = ScoringConfig::default();
        let (prev, cur) = (uptrend_snapshot(0), uptrend_snapshot(1));
        let htf = TrendView {
            open_time: cur.open_time,
            close: 120.0,
            ema_fast: Some(118.0),
            ema_slow: Some(115.0),
            ema_trend: Some(100.0),
        };
        let with = ScoreInput {
            higher: Some(&htf),
            ..input(&cur, &prev)
        };
        let long = score(&config, Side::Long, &with);
        assert_eq!(long.total, 10);
    }

    #[test]
    fn ties_are_not_entered() {
        let config = ScoringConfig::default();
        let (prev, cur) = (uptrend_snapshot(0), uptrend_snapshot(1));
        let long = score(&config, Side::Long, &input(&cur, &prev));
        let mut short = long.clone();
        short.direction = Side::Short;
        assert_eq!(decide(&long, &short, 1), None);
    }

    #[test]
    fn below_minimum_is_not_entered() {
        let config = ScoringConfig::default();
        let (prev, cur) = (uptrend_snapshot(0), uptrend_snapshot(1));
        let long = score(&config, Side::Long, &input(&cur, &prev));
        let short = score(&config, Side::Short, &input(&cur, &prev));
        assert_eq!(decide(&long, &short, long.total + 1), None);
    }

    #[test]
    fn overrun_veto_blocks_direction() {
        let config = ScoringConfig {
            exhaustion: Some(ExhaustionRule {
                min_run: 3,
                max_run: 2,
                reversal_bonus: 1,
                overrun_penalty: 2,
                veto: true,
            }),
            ..ScoringConfig::default()
        };
        let (prev, cur) = (uptrend_snapshot(0), uptrend_snapshot(1));
        let long = score(&config, Side::Long, &input(&cur, &prev));
        let short = score(&config, Side::Short, &input(&cur, &prev));
        assert!(long.vetoed);
        assert_eq!(decide(&long, &short, 1), None);
    }

    #[test]
    fn overrun_penalty_subtracts() {
        let config = ScoringConfig {
            exhaustion: Some(ExhaustionRule {
                min_run: 3,
                max_run: 2,
                reversal_bonus: 1,
                overrun_penalty: 2,
                veto: false,
            }),
            ..ScoringConfig::default()
        };
        let (prev, cur) = (uptrend_snapshot(0), uptrend_snapshot(1));
        let long = score(&config, Side::Long, &input(&cur, &prev));
        assert!(!long.vetoed);
        assert_eq!(long.total, 6);
        assert_eq!(long.max_score, 12);
    }

    #[test]
    fn reversal_after_run_earns_bonus() {
        let config = ScoringConfig {
            exhaustion: Some(ExhaustionRule {
                min_run: 3,
                max_run: 6,
                reversal_bonus: 2,
                overrun_penalty: 1,
                veto: false,
            }),
            ..ScoringConfig::default()
        };
        let mut prev = uptrend_snapshot(0);
        prev.bull_run = 0;
        prev.bear_run = 4;
        let mut cur = uptrend_snapshot(1);
        cur.bull_run = 1;
        let long = score(&config, Side::Long, &input(&cur, &prev));
        let adj = long.components.last().unwrap();
        assert_eq!(adj.criterion, Criterion::Exhaustion);
        assert_eq!(adj.points, 2);
        assert_eq!(long.total, 10);
    }

    #[test]
    fn total_is_clamped_at_zero() {
        let config = ScoringConfig {
            criteria: vec![WeightedCriterion {
                criterion: Criterion::Breakout,
                points: 1,
            }],
            exhaustion: Some(ExhaustionRule {
                min_run: 3,
                max_run: 0,
                reversal_bonus: 0,
                overrun_penalty: 5,
                veto: false,
            }),
            ..ScoringConfig::default()
        };
        let (prev, cur) = (uptrend_snapshot(0), uptrend_snapshot(1));
        let long = score(&config, Side::Long, &input(&cur, &prev));
        assert_eq!(long.total, 0);
    }

    #[test]
    fn criterion_names_round_trip_through_config_keys() {
        assert_eq!("rsi_band".parse::<Criterion>().unwrap(), Criterion::RsiBand);
        assert!("exhaustion".parse::<Criterion>().is_err());
        assert!("made_up".parse::<Criterion>().is_err());
    }
}
