//! Configuration validation.
//!
//! Validates every config field before a backtest or live run. Absent keys
//! fall back to the same defaults the strategy builder uses.

use std::str::FromStr;

use crate::domain::candle::Timeframe;
use crate::domain::error::ScoretraderError;
use crate::domain::feed::IndicatorPeriods;
use crate::domain::ledger::FeeTiming;
use crate::domain::position::StopPolicy;
use crate::domain::score::{Criterion, Thresholds};
use crate::ports::config_port::ConfigPort;

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), ScoretraderError> {
    validate_initial_balance(config)?;
    validate_min_qty(config)?;
    Ok(())
}

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), ScoretraderError> {
    validate_symbol(config)?;
    validate_timeframes(config)?;
    validate_min_score(config)?;
    validate_periods(config)?;
    validate_criteria(config)?;
    validate_thresholds(config)?;
    validate_exhaustion(config)?;
    validate_stops(config)?;
    validate_management(config)?;
    validate_risk(config)?;
    validate_fees(config)?;
    Ok(())
}

pub fn validate_live_config(config: &dyn ConfigPort) -> Result<(), ScoretraderError> {
    if config.get_double("live", "poll_interval_secs", 60.0) <= 0.0 {
        return Err(invalid("live", "poll_interval_secs", "poll_interval_secs must be positive"));
    }
    if config.get_int("live", "retry_attempts", 3) < 1 {
        return Err(invalid("live", "retry_attempts", "retry_attempts must be at least 1"));
    }
    if config.get_double("live", "retry_backoff_secs", 2.0) < 0.0 {
        return Err(invalid("live", "retry_backoff_secs", "retry_backoff_secs must be non-negative"));
    }
    if config.get_int("live", "candle_limit", 1000) < 1 {
        return Err(invalid("live", "candle_limit", "candle_limit must be at least 1"));
    }
    Ok(())
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> ScoretraderError {
    ScoretraderError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn validate_initial_balance(config: &dyn ConfigPort) -> Result<(), ScoretraderError> {
    let value = config.get_double("backtest", "initial_balance", 1000.0);
    if value <= 0.0 {
        return Err(invalid("backtest", "initial_balance", "initial_balance must be positive"));
    }
    Ok(())
}

fn validate_min_qty(config: &dyn ConfigPort) -> Result<(), ScoretraderError> {
    let value = config.get_double("backtest", "min_qty", 0.001);
    if value <= 0.0 {
        return Err(invalid("backtest", "min_qty", "min_qty must be positive"));
    }
    Ok(())
}

fn validate_symbol(config: &dyn ConfigPort) -> Result<(), ScoretraderError> {
    match config.get_string("strategy", "symbol") {
        Some(s) if !s.trim().is_empty() => Ok(()),
        _ => Err(ScoretraderError::ConfigMissing {
            section: "strategy".to_string(),
            key: "symbol".to_string(),
        }),
    }
}

fn validate_timeframes(config: &dyn ConfigPort) -> Result<(), ScoretraderError> {
    let base = match config.get_string("strategy", "timeframe") {
        Some(s) => parse_timeframe("timeframe", &s)?,
        None => {
            return Err(ScoretraderError::ConfigMissing {
                section: "strategy".to_string(),
                key: "timeframe".to_string(),
            });
        }
    };
    if let Some(s) = config
        .get_string("strategy", "higher_timeframe")
        .filter(|s| !s.trim().is_empty())
    {
        let higher = parse_timeframe("higher_timeframe", &s)?;
        if higher.duration() < base.duration() {
            return Err(invalid(
                "strategy",
                "higher_timeframe",
                "higher_timeframe must not be shorter than timeframe",
            ));
        }
    }
    Ok(())
}

fn parse_timeframe(key: &str, value: &str) -> Result<Timeframe, ScoretraderError> {
    Timeframe::from_str(value).map_err(|_| {
        invalid(
            "strategy",
            key,
            format!("unknown interval {:?} (expected 1..720 minutes, D or W)", value),
        )
    })
}

fn validate_min_score(config: &dyn ConfigPort) -> Result<(), ScoretraderError> {
    if config.get_int("strategy", "min_score", 6) < 0 {
        return Err(invalid("strategy", "min_score", "min_score must be non-negative"));
    }
    Ok(())
}

fn validate_periods(config: &dyn ConfigPort) -> Result<(), ScoretraderError> {
    let defaults = IndicatorPeriods::default();
    let periods = [
        ("ema_fast", defaults.ema_fast),
        ("ema_slow", defaults.ema_slow),
        ("ema_trend", defaults.ema_trend),
        ("rsi", defaults.rsi),
        ("atr", defaults.atr),
        ("adx", defaults.adx),
        ("cci", defaults.cci),
        ("vwap", defaults.vwap),
        ("williams_r", defaults.williams_r),
        ("momentum", defaults.momentum),
        ("volume_ema", defaults.volume_ema),
    ];
    for (key, default) in periods {
        if config.get_int("indicators", key, default as i64) < 1 {
            return Err(invalid("indicators", key, format!("{} period must be at least 1", key)));
        }
    }
    Ok(())
}

fn validate_criteria(config: &dyn ConfigPort) -> Result<(), ScoretraderError> {
    for name in config.get_list("criteria", "order") {
        Criterion::from_str(&name)?;
    }
    for (criterion, default) in Criterion::DEFAULTS {
        if config.get_int("criteria", criterion.key(), i64::from(default)) < 0 {
            return Err(invalid(
                "criteria",
                criterion.key(),
                "criterion points must be non-negative",
            ));
        }
    }
    Ok(())
}

fn validate_thresholds(config: &dyn ConfigPort) -> Result<(), ScoretraderError> {
    let d = Thresholds::default();
    for (lo_key, lo, hi_key, hi) in [
        ("rsi_long_min", d.rsi_long_min, "rsi_long_max", d.rsi_long_max),
        ("rsi_short_min", d.rsi_short_min, "rsi_short_max", d.rsi_short_max),
    ] {
        let lo = config.get_double("thresholds", lo_key, lo);
        let hi = config.get_double("thresholds", hi_key, hi);
        if !(0.0..=100.0).contains(&lo) || !(0.0..=100.0).contains(&hi) || lo > hi {
            return Err(invalid(
                "thresholds",
                lo_key,
                format!("{} and {} must satisfy 0 <= min <= max <= 100", lo_key, hi_key),
            ));
        }
    }
    let adx_min = config.get_double("thresholds", "adx_min", d.adx_min);
    if !(0.0..=100.0).contains(&adx_min) {
        return Err(invalid("thresholds", "adx_min", "adx_min must be between 0 and 100"));
    }
    if config.get_double("thresholds", "volume_factor", d.volume_factor) <= 0.0 {
        return Err(invalid("thresholds", "volume_factor", "volume_factor must be positive"));
    }
    if config.get_double("thresholds", "cci_extreme", d.cci_extreme) <= 0.0 {
        return Err(invalid("thresholds", "cci_extreme", "cci_extreme must be positive"));
    }
    let low = config.get_double("thresholds", "williams_low", d.williams_low);
    let high = config.get_double("thresholds", "williams_high", d.williams_high);
    if !(-100.0..=0.0).contains(&low) || !(-100.0..=0.0).contains(&high) || low > high {
        return Err(invalid(
            "thresholds",
            "williams_low",
            "williams band must satisfy -100 <= low <= high <= 0",
        ));
    }
    Ok(())
}

fn validate_exhaustion(config: &dyn ConfigPort) -> Result<(), ScoretraderError> {
    if !config.get_bool("exhaustion", "enabled", false) {
        return Ok(());
    }
    let min_run = config.get_int("exhaustion", "min_run", 3);
    let max_run = config.get_int("exhaustion", "max_run", 6);
    if min_run < 1 {
        return Err(invalid("exhaustion", "min_run", "min_run must be at least 1"));
    }
    if max_run < min_run {
        return Err(invalid("exhaustion", "max_run", "max_run must be at least min_run"));
    }
    for key in ["reversal_bonus", "overrun_penalty"] {
        if config.get_int("exhaustion", key, 1) < 0 {
            return Err(invalid("exhaustion", key, format!("{} must be non-negative", key)));
        }
    }
    Ok(())
}

fn validate_stops(config: &dyn ConfigPort) -> Result<(), ScoretraderError> {
    let d = StopPolicy::default();
    let atr_multiple = config.get_double("stops", "atr_multiple", d.atr_multiple.unwrap_or(0.0));
    if atr_multiple < 0.0 {
        return Err(invalid("stops", "atr_multiple", "atr_multiple must be non-negative"));
    }
    let swing_bars = config.get_int("stops", "swing_bars", d.swing_bars.unwrap_or(0) as i64);
    if swing_bars < 0 {
        return Err(invalid("stops", "swing_bars", "swing_bars must be non-negative"));
    }
    let volatility = config.get_bool("stops", "volatility", d.volatility.is_some());
    if volatility {
        for key in ["volatility_atr_multiple", "volatile_factor", "calm_factor"] {
            if config.get_double("stops", key, 1.0) <= 0.0 {
                return Err(invalid("stops", key, format!("{} must be positive", key)));
            }
        }
    }
    let min_stop_pct = config.get_double("stops", "min_stop_pct", d.min_stop_pct.unwrap_or(0.0));
    if min_stop_pct < 0.0 {
        return Err(invalid("stops", "min_stop_pct", "min_stop_pct must be non-negative"));
    }
    if atr_multiple == 0.0 && swing_bars == 0 && !volatility && min_stop_pct == 0.0 {
        return Err(invalid("stops", "atr_multiple", "at least one stop candidate must be enabled"));
    }
    Ok(())
}

fn validate_management(config: &dyn ConfigPort) -> Result<(), ScoretraderError> {
    if let Some(reference) = config.get_string("management", "entry_reference") {
        if !matches!(reference.trim(), "prior_extreme" | "close") {
            return Err(invalid(
                "management",
                "entry_reference",
                "entry_reference must be prior_extreme or close",
            ));
        }
    }
    if config.get_double("management", "risk_reward", 3.1) <= 0.0 {
        return Err(invalid("management", "risk_reward", "risk_reward must be positive"));
    }
    if config.get_double("management", "breakeven_trigger_pct", 0.5) < 0.0 {
        return Err(invalid(
            "management",
            "breakeven_trigger_pct",
            "breakeven_trigger_pct must be non-negative",
        ));
    }
    if config.get_double("management", "partial_trigger_pct", 1.0) < 0.0 {
        return Err(invalid(
            "management",
            "partial_trigger_pct",
            "partial_trigger_pct must be non-negative",
        ));
    }
    let fraction = config.get_double("management", "partial_fraction", 0.5);
    if fraction <= 0.0 || fraction >= 1.0 {
        return Err(invalid(
            "management",
            "partial_fraction",
            "partial_fraction must be between 0 and 1 exclusive",
        ));
    }
    Ok(())
}

fn validate_risk(config: &dyn ConfigPort) -> Result<(), ScoretraderError> {
    if config.get_double("risk", "leverage", 1.0) <= 0.0 {
        return Err(invalid("risk", "leverage", "leverage must be positive"));
    }
    let policy = config
        .get_string("risk", "sizing")
        .unwrap_or_else(|| "risk_normalized".to_string());
    let key = match policy.trim() {
        "risk_normalized" => "risk_fraction",
        "fixed_fraction" => "fixed_fraction",
        other => {
            return Err(invalid(
                "risk",
                "sizing",
                format!("unknown sizing policy {:?} (expected risk_normalized or fixed_fraction)", other),
            ));
        }
    };
    let value = config.get_double("risk", key, 0.01);
    if value <= 0.0 || value > 1.0 {
        return Err(invalid("risk", key, format!("{} must be in (0, 1]", key)));
    }
    Ok(())
}

fn validate_fees(config: &dyn ConfigPort) -> Result<(), ScoretraderError> {
    if config.get_double("fees", "fee_pct", 0.055) < 0.0 {
        return Err(invalid("fees", "fee_pct", "fee_pct must be non-negative"));
    }
    if let Some(timing) = config.get_string("fees", "timing") {
        FeeTiming::from_str(&timing)?;
    }
    Ok(())
}
