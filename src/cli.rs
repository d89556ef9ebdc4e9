//! CLI definition and dispatch.

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveTime, Utc};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use crate::adapters::candle_cache::CachedMarketData;
use crate::adapters::csv_adapter::{CsvAdapter, read_candles};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_report_adapter::JsonReportAdapter;
use crate::adapters::paper_exchange::PaperExchange;
use crate::domain::backtest::{self as backtest_engine, BacktestConfig, BacktestResult};
use crate::domain::candle::{Candle, Timeframe, check_order};
use crate::domain::config_validation::{
    validate_backtest_config, validate_live_config, validate_strategy_config,
};
use crate::domain::decision::DecisionRecord;
use crate::domain::error::ScoretraderError;
use crate::domain::feed::IndicatorPeriods;
use crate::domain::ledger::{FeePolicy, FeeTiming, LedgerReport};
use crate::domain::live::{LiveConfig, LiveTrader};
use crate::domain::position::{EntryReference, Management, PartialExit, StopPolicy, VolatilityStop};
use crate::domain::retry::RetryPolicy;
use crate::domain::score::{Criterion, ExhaustionRule, ScoringConfig, Thresholds, WeightedCriterion};
use crate::domain::sizing::{FixedFraction, RiskNormalized, Sizing};
use crate::domain::strategy::Strategy;
use crate::ports::config_port::ConfigPort;
use crate::ports::market_data_port::MarketDataPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "scoretrader", about = "Score-based futures signal engine and backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay candles through the strategy and print the ledger report
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Kline CSV for the strategy timeframe; defaults to `[backtest] data_dir`
        #[arg(long)]
        candles: Option<PathBuf>,
        /// Kline CSV for the higher timeframe
        #[arg(long)]
        higher: Option<PathBuf>,
        /// Write the ledger report as JSON
        #[arg(short, long)]
        report: Option<PathBuf>,
        /// Write one JSON decision record per line
        #[arg(long)]
        decisions: Option<PathBuf>,
    },
    /// Drive the live trader against a paper exchange replaying candles
    Paper {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        candles: PathBuf,
        #[arg(long)]
        higher: Option<PathBuf>,
    },
    /// Validate a configuration and print the resolved strategy
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show candle count and time range of a kline CSV
    Info {
        #[arg(long)]
        candles: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            candles,
            higher,
            report,
            decisions,
        } => run_backtest(
            &config,
            candles.as_deref(),
            higher.as_deref(),
            report.as_deref(),
            decisions.as_deref(),
        ),
        Command::Paper {
            config,
            candles,
            higher,
        } => run_paper(&config, &candles, higher.as_deref()),
        Command::Validate { config } => run_validate(&config),
        Command::Info { candles } => run_info(&candles),
    }
}

fn finish(result: Result<(), ScoretraderError>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ScoretraderError> {
    FileConfigAdapter::from_file(path)
}

/// Loads and validates every section a run needs.
fn load_validated(path: &Path) -> Result<FileConfigAdapter, ScoretraderError> {
    eprintln!("Loading config from {}", path.display());
    let adapter = load_config(path)?;
    validate_backtest_config(&adapter)?;
    validate_strategy_config(&adapter)?;
    validate_live_config(&adapter)?;
    Ok(adapter)
}

pub fn run_backtest(
    config_path: &Path,
    candles_path: Option<&Path>,
    higher_path: Option<&Path>,
    report_path: Option<&Path>,
    decisions_path: Option<&Path>,
) -> ExitCode {
    finish(backtest_command(
        config_path,
        candles_path,
        higher_path,
        report_path,
        decisions_path,
    ))
}

fn backtest_command(
    config_path: &Path,
    candles_path: Option<&Path>,
    higher_path: Option<&Path>,
    report_path: Option<&Path>,
    decisions_path: Option<&Path>,
) -> Result<(), ScoretraderError> {
    let adapter = load_validated(config_path)?;
    let strategy = build_strategy(&adapter)?;
    let bt_config = build_backtest_config(&adapter)?;
    eprintln!("Loading strategy: {} ({} {})", strategy.name, strategy.symbol, strategy.timeframe);

    let (candles, higher) = match candles_path {
        Some(path) => {
            let candles = read_candles(path)?;
            let higher = match higher_path {
                Some(path) => Some(read_candles(path)?),
                None => None,
            };
            (candles, higher)
        }
        None => fetch_configured(&adapter, &strategy)?,
    };
    if strategy.higher_timeframe.is_some() && higher.is_none() {
        eprintln!("warning: higher_timeframe is set but no higher candles were given");
    }

    eprintln!("Running backtest over {} candles", candles.len());
    let result = backtest_engine::run_backtest(&strategy, &bt_config, &candles, higher.as_deref())?;

    let report = result.report();
    print_report(&report);
    print_trades(&result);

    if let Some(path) = report_path {
        JsonReportAdapter::new().write(&report, &path.to_string_lossy())?;
        eprintln!("\nReport written to: {}", path.display());
    }
    if let Some(path) = decisions_path {
        write_decisions(path, &result.decisions)?;
        eprintln!("Decisions written to: {}", path.display());
    }
    Ok(())
}

/// Candles from `[backtest] data_dir`, through the download cache when
/// `[cache] dir` is set.
fn fetch_configured(
    adapter: &dyn ConfigPort,
    strategy: &Strategy,
) -> Result<(Vec<Candle>, Option<Vec<Candle>>), ScoretraderError> {
    let data_dir = adapter
        .get_string("backtest", "data_dir")
        .unwrap_or_else(|| "data".to_string());
    let start = date_bound(adapter, "start", false)?;
    let end = date_bound(adapter, "end", true)?;
    let csv = CsvAdapter::new(PathBuf::from(&data_dir));
    eprintln!("Reading candles from {}", data_dir);

    let source: Box<dyn MarketDataPort> = match adapter.get_string("cache", "dir") {
        Some(dir) => Box::new(CachedMarketData::new(csv, PathBuf::from(dir))),
        None => Box::new(csv),
    };
    let fetch = |tf: Timeframe| source.fetch_candles(&strategy.symbol, tf, start, end, usize::MAX);

    let candles = fetch(strategy.timeframe)?;
    let higher = match strategy.higher_timeframe {
        Some(tf) => Some(fetch(tf)?),
        None => None,
    };
    Ok((candles, higher))
}

/// `[backtest] start` / `end` as YYYY-MM-DD; `end` covers the whole day.
fn date_bound(
    adapter: &dyn ConfigPort,
    key: &str,
    end_of_day: bool,
) -> Result<Option<DateTime<Utc>>, ScoretraderError> {
    let Some(value) = adapter.get_string("backtest", key) else {
        return Ok(None);
    };
    let date = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        ScoretraderError::ConfigInvalid {
            section: "backtest".into(),
            key: key.into(),
            reason: "invalid date format (expected YYYY-MM-DD)".into(),
        }
    })?;
    let start = date.and_time(NaiveTime::MIN).and_utc();
    Ok(Some(if end_of_day {
        start + ChronoDuration::days(1) - ChronoDuration::milliseconds(1)
    } else {
        start
    }))
}

fn write_decisions(path: &Path, decisions: &[DecisionRecord]) -> Result<(), ScoretraderError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::File::create(path)?;
    for record in decisions {
        serde_json::to_writer(&mut file, record)?;
        writeln!(file)?;
    }
    Ok(())
}

fn print_report(report: &LedgerReport) {
    let o = &report.overall;
    eprintln!("\n=== Ledger ===");
    eprintln!("Initial Balance:  {:.2}", report.initial_balance);
    eprintln!("Final Balance:    {:.2}", report.final_balance);
    eprintln!("Peak Balance:     {:.2}", report.peak_balance);
    eprintln!("Return:           {:.2}%", o.return_pct);
    eprintln!("Max Drawdown:     -{:.2}%", o.max_drawdown_pct);
    eprintln!("Trades Opened:    {}", o.opened);
    eprintln!("Wins / Losses:    {} / {}", o.wins, o.losses);
    eprintln!("Win Rate:         {:.1}%", o.win_rate_pct);
    eprintln!("Avg Win / Loss:   {:.2}% / {:.2}%", o.avg_win_pct, o.avg_loss_pct);

    if !report.months.is_empty() {
        eprintln!("\n=== Monthly ===");
        for m in &report.months {
            eprintln!(
                "  {}-{:02}:  {} trades, {:.1}% win rate, {:+.2}%, dd {:.2}%",
                m.year,
                m.month,
                m.stats.opened,
                m.stats.win_rate_pct,
                m.stats.return_pct,
                m.stats.max_drawdown_pct,
            );
        }
    }
}

fn print_trades(result: &BacktestResult) {
    if result.trades.is_empty() {
        eprintln!("\nNo closed trades");
    } else {
        eprintln!("\n=== Trades ===");
        for t in &result.trades {
            eprintln!(
                "  {} {} {:.4} -> {:.4} ({}) {:+.2}%",
                t.opened_at.format("%Y-%m-%d %H:%M"),
                t.side,
                t.entry,
                t.exit,
                t.reason,
                t.pnl_pct,
            );
        }
    }
    if let Some(p) = &result.open_position {
        eprintln!("\nStill open: {} from {:.4} (stop {:.4}, target {:.4})", p.side, p.entry_price, p.stop_price, p.target_price);
    }
}

pub fn run_paper(config_path: &Path, candles_path: &Path, higher_path: Option<&Path>) -> ExitCode {
    finish(paper_command(config_path, candles_path, higher_path))
}

fn paper_command(
    config_path: &Path,
    candles_path: &Path,
    higher_path: Option<&Path>,
) -> Result<(), ScoretraderError> {
    let adapter = load_validated(config_path)?;
    let strategy = build_strategy(&adapter)?;
    let bt_config = build_backtest_config(&adapter)?;
    let live = LiveConfig {
        poll_interval: Duration::ZERO,
        retry: RetryPolicy::none(),
        ..build_live_config(&adapter)?
    };

    let candles = read_candles(candles_path)?;
    check_order(&candles)?;
    let mut exchange = PaperExchange::new(
        &strategy.symbol,
        strategy.timeframe,
        candles,
        bt_config.initial_balance,
        bt_config.min_qty,
    );
    if let (Some(tf), Some(path)) = (strategy.higher_timeframe, higher_path) {
        exchange = exchange.with_higher(tf, read_candles(path)?);
    }

    eprintln!(
        "Paper trading {} on {} over {} bars",
        strategy.name,
        strategy.symbol,
        exchange.remaining()
    );
    let mut trader = LiveTrader::new(strategy, live, &exchange, &exchange, bt_config.initial_balance);
    let mut outcomes: BTreeMap<&'static str, usize> = BTreeMap::new();
    while exchange.advance() {
        let record = trader.run_cycle();
        *outcomes.entry(record.outcome.label()).or_default() += 1;
    }

    eprintln!("\n=== Cycles ===");
    for (label, count) in &outcomes {
        eprintln!("  {:<8} {}", label, count);
    }
    print_report(&trader.ledger().report());
    eprintln!("\nPaper balance:    {:.2}", exchange.balance());
    eprintln!("Paper fills:      {}", exchange.fills().len());
    Ok(())
}

pub fn run_validate(config_path: &Path) -> ExitCode {
    finish(validate_command(config_path))
}

fn validate_command(config_path: &Path) -> Result<(), ScoretraderError> {
    let adapter = load_validated(config_path)?;
    let strategy = build_strategy(&adapter)?;
    let bt_config = build_backtest_config(&adapter)?;
    let live = build_live_config(&adapter)?;

    eprintln!("\nStrategy: {}", strategy.name);
    eprintln!("  symbol:     {}", strategy.symbol);
    eprintln!("  timeframe:  {}", strategy.timeframe);
    match strategy.higher_timeframe {
        Some(tf) => eprintln!("  higher:     {}", tf),
        None => eprintln!("  higher:     none"),
    }
    eprintln!("  warm-up:    {} bars", strategy.min_history());

    eprintln!("\nCriteria (min score {}, max {}):", strategy.scoring.min_score, strategy.scoring.max_score());
    for c in &strategy.scoring.criteria {
        eprintln!("  {:<24} {}", c.criterion.key(), c.points);
    }
    if let Some(e) = &strategy.scoring.exhaustion {
        eprintln!(
            "  exhaustion: run {}..{}, bonus {}, penalty {}{}",
            e.min_run,
            e.max_run,
            e.reversal_bonus,
            e.overrun_penalty,
            if e.veto { ", veto" } else { "" }
        );
    }

    let s = &strategy.stops;
    eprintln!("\nStops:");
    eprintln!("  atr multiple: {}", describe(s.atr_multiple));
    eprintln!("  swing bars:   {}", describe(s.swing_bars));
    match s.volatility {
        Some(v) => eprintln!(
            "  volatility:   atr x{} x({} if |%R| > {} else {})",
            v.atr_multiple, v.volatile_factor, v.threshold, v.calm_factor
        ),
        None => eprintln!("  volatility:   off"),
    }
    eprintln!("  floor:        {}%", describe(s.min_stop_pct));

    let m = &strategy.management;
    eprintln!("\nManagement:");
    eprintln!("  entry:        {:?}", m.entry_reference);
    eprintln!("  risk/reward:  {}", m.risk_reward);
    eprintln!("  breakeven:    {}%", describe(m.breakeven_trigger_pct));
    match m.partial {
        Some(p) => eprintln!("  partial:      {}% of size at +{}%", p.fraction * 100.0, p.trigger_pct),
        None => eprintln!("  partial:      off"),
    }

    eprintln!("\nRisk:");
    match strategy.sizing {
        Sizing::RiskNormalized(p) => eprintln!("  sizing:       risk {}% of balance per stop", p.risk_fraction * 100.0),
        Sizing::FixedFraction(p) => eprintln!("  sizing:       {}% of balance notional", p.fraction * 100.0),
    }
    eprintln!("  leverage:     {}", strategy.leverage);
    eprintln!("  fees:         {}% {:?}", strategy.fees.fee_pct, strategy.fees.timing);

    eprintln!("\nBacktest: balance {}, min qty {}", bt_config.initial_balance, bt_config.min_qty);
    eprintln!(
        "Live: poll {}s, {} attempts, {} candles, {}",
        live.poll_interval.as_secs_f64(),
        live.retry.attempts,
        live.candle_limit,
        live.quote_asset
    );

    eprintln!("\nConfiguration is valid.");
    Ok(())
}

fn describe<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "off".to_string(), |v| v.to_string())
}

pub fn run_info(candles_path: &Path) -> ExitCode {
    finish(info_command(candles_path))
}

fn info_command(candles_path: &Path) -> Result<(), ScoretraderError> {
    let candles = read_candles(candles_path)?;
    match (candles.first(), candles.last()) {
        (Some(first), Some(last)) => println!(
            "{}: {} candles, {} to {}",
            candles_path.display(),
            candles.len(),
            first.open_time.to_rfc3339(),
            last.open_time.to_rfc3339()
        ),
        _ => println!("{}: no candles", candles_path.display()),
    }
    if let Err(e) = check_order(&candles) {
        eprintln!("warning: {e}");
    }
    Ok(())
}

pub fn build_backtest_config(adapter: &dyn ConfigPort) -> Result<BacktestConfig, ScoretraderError> {
    Ok(BacktestConfig {
        initial_balance: adapter.get_double("backtest", "initial_balance", 1000.0),
        min_qty: adapter.get_double("backtest", "min_qty", 0.001),
    })
}

pub fn build_live_config(adapter: &dyn ConfigPort) -> Result<LiveConfig, ScoretraderError> {
    let defaults = LiveConfig::default();
    let attempts = adapter.get_int("live", "retry_attempts", i64::from(defaults.retry.attempts));
    let candle_limit = adapter.get_int("live", "candle_limit", defaults.candle_limit as i64);
    Ok(LiveConfig {
        poll_interval: seconds(adapter, "poll_interval_secs", defaults.poll_interval)?,
        retry: RetryPolicy {
            attempts: u32::try_from(attempts)
                .map_err(|_| invalid("live", "retry_attempts", "retry_attempts out of range"))?,
            backoff: seconds(adapter, "retry_backoff_secs", defaults.retry.backoff)?,
        },
        candle_limit: usize::try_from(candle_limit)
            .map_err(|_| invalid("live", "candle_limit", "candle_limit out of range"))?,
        quote_asset: adapter
            .get_string("live", "quote_asset")
            .unwrap_or(defaults.quote_asset),
    })
}

fn seconds(adapter: &dyn ConfigPort, key: &str, default: Duration) -> Result<Duration, ScoretraderError> {
    let secs = adapter.get_double("live", key, default.as_secs_f64());
    Duration::try_from_secs_f64(secs).map_err(|e| invalid("live", key, e.to_string()))
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> ScoretraderError {
    ScoretraderError::ConfigInvalid {
        section: section.into(),
        key: key.into(),
        reason: reason.into(),
    }
}

/// Zero or negative disables an optional setting.
fn enabled(value: f64) -> Option<f64> {
    (value > 0.0).then_some(value)
}

fn period(adapter: &dyn ConfigPort, key: &str, default: usize) -> Result<usize, ScoretraderError> {
    let value = adapter.get_int("indicators", key, default as i64);
    usize::try_from(value)
        .ok()
        .filter(|p| *p >= 1)
        .ok_or_else(|| invalid("indicators", key, format!("{} period must be at least 1", key)))
}

pub fn build_strategy(adapter: &dyn ConfigPort) -> Result<Strategy, ScoretraderError> {
    let name = adapter
        .get_string("strategy", "name")
        .unwrap_or_else(|| "Unnamed".to_string());
    let symbol = adapter
        .get_string("strategy", "symbol")
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ScoretraderError::ConfigMissing {
            section: "strategy".into(),
            key: "symbol".into(),
        })?
        .trim()
        .to_uppercase();
    let timeframe: Timeframe = adapter
        .get_string("strategy", "timeframe")
        .ok_or_else(|| ScoretraderError::ConfigMissing {
            section: "strategy".into(),
            key: "timeframe".into(),
        })?
        .parse()?;
    let higher_timeframe = match adapter
        .get_string("strategy", "higher_timeframe")
        .filter(|s| !s.trim().is_empty())
    {
        Some(s) => Some(s.parse::<Timeframe>()?),
        None => None,
    };

    let leverage = adapter.get_double("risk", "leverage", 1.0);
    let fees = FeePolicy {
        fee_pct: adapter.get_double("fees", "fee_pct", 0.055),
        timing: match adapter.get_string("fees", "timing") {
            Some(s) => s.parse()?,
            None => FeeTiming::RoundTripOnOpen,
        },
        leverage,
    };

    Ok(Strategy {
        name,
        symbol,
        timeframe,
        higher_timeframe,
        periods: build_periods(adapter)?,
        scoring: build_scoring(adapter)?,
        stops: build_stops(adapter),
        management: build_management(adapter),
        sizing: build_sizing(adapter)?,
        leverage,
        fees,
    })
}

fn build_periods(adapter: &dyn ConfigPort) -> Result<IndicatorPeriods, ScoretraderError> {
    let d = IndicatorPeriods::default();
    Ok(IndicatorPeriods {
        ema_fast: period(adapter, "ema_fast", d.ema_fast)?,
        ema_slow: period(adapter, "ema_slow", d.ema_slow)?,
        ema_trend: period(adapter, "ema_trend", d.ema_trend)?,
        rsi: period(adapter, "rsi", d.rsi)?,
        atr: period(adapter, "atr", d.atr)?,
        adx: period(adapter, "adx", d.adx)?,
        cci: period(adapter, "cci", d.cci)?,
        vwap: period(adapter, "vwap", d.vwap)?,
        williams_r: period(adapter, "williams_r", d.williams_r)?,
        momentum: period(adapter, "momentum", d.momentum)?,
        volume_ema: period(adapter, "volume_ema", d.volume_ema)?,
    })
}

/// Criteria in `[criteria] order` (all known criteria by default); a
/// criterion scoring 0 points is dropped.
fn build_scoring(adapter: &dyn ConfigPort) -> Result<ScoringConfig, ScoretraderError> {
    let order = adapter.get_list("criteria", "order");
    let names: Vec<Criterion> = if order.is_empty() {
        Criterion::DEFAULTS.iter().map(|(c, _)| *c).collect()
    } else {
        order
            .iter()
            .map(|name| name.parse())
            .collect::<Result<_, _>>()?
    };

    let mut criteria = Vec::with_capacity(names.len());
    for criterion in names {
        let default = Criterion::DEFAULTS
            .iter()
            .find(|(c, _)| *c == criterion)
            .map_or(1, |(_, points)| *points);
        let points = i32::try_from(adapter.get_int("criteria", criterion.key(), i64::from(default)))
            .map_err(|_| invalid("criteria", criterion.key(), "points out of range"))?;
        if points > 0 {
            criteria.push(WeightedCriterion { criterion, points });
        }
    }

    let d = Thresholds::default();
    let thresholds = Thresholds {
        rsi_long_min: adapter.get_double("thresholds", "rsi_long_min", d.rsi_long_min),
        rsi_long_max: adapter.get_double("thresholds", "rsi_long_max", d.rsi_long_max),
        rsi_short_min: adapter.get_double("thresholds", "rsi_short_min", d.rsi_short_min),
        rsi_short_max: adapter.get_double("thresholds", "rsi_short_max", d.rsi_short_max),
        adx_min: adapter.get_double("thresholds", "adx_min", d.adx_min),
        volume_factor: adapter.get_double("thresholds", "volume_factor", d.volume_factor),
        cci_extreme: adapter.get_double("thresholds", "cci_extreme", d.cci_extreme),
        williams_low: adapter.get_double("thresholds", "williams_low", d.williams_low),
        williams_high: adapter.get_double("thresholds", "williams_high", d.williams_high),
    };

    let exhaustion = if adapter.get_bool("exhaustion", "enabled", false) {
        Some(ExhaustionRule {
            min_run: adapter.get_int("exhaustion", "min_run", 3).max(1) as usize,
            max_run: adapter.get_int("exhaustion", "max_run", 6).max(1) as usize,
            reversal_bonus: adapter.get_int("exhaustion", "reversal_bonus", 1) as i32,
            overrun_penalty: adapter.get_int("exhaustion", "overrun_penalty", 1) as i32,
            veto: adapter.get_bool("exhaustion", "veto", false),
        })
    } else {
        None
    };

    Ok(ScoringConfig {
        criteria,
        thresholds,
        exhaustion,
        min_score: adapter.get_int("strategy", "min_score", 6) as i32,
    })
}

fn build_stops(adapter: &dyn ConfigPort) -> StopPolicy {
    let d = StopPolicy::default();
    let dv = d.volatility.unwrap_or(VolatilityStop {
        atr_multiple: 2.5,
        threshold: 80.0,
        volatile_factor: 1.5,
        calm_factor: 1.2,
    });
    let swing_bars = adapter.get_int("stops", "swing_bars", d.swing_bars.unwrap_or(0) as i64);
    StopPolicy {
        atr_multiple: enabled(adapter.get_double("stops", "atr_multiple", d.atr_multiple.unwrap_or(0.0))),
        swing_bars: usize::try_from(swing_bars).ok().filter(|n| *n > 0),
        volatility: adapter
            .get_bool("stops", "volatility", d.volatility.is_some())
            .then(|| VolatilityStop {
                atr_multiple: adapter.get_double("stops", "volatility_atr_multiple", dv.atr_multiple),
                threshold: adapter.get_double("stops", "williams_threshold", dv.threshold),
                volatile_factor: adapter.get_double("stops", "volatile_factor", dv.volatile_factor),
                calm_factor: adapter.get_double("stops", "calm_factor", dv.calm_factor),
            }),
        min_stop_pct: enabled(adapter.get_double("stops", "min_stop_pct", d.min_stop_pct.unwrap_or(0.0))),
    }
}

fn build_management(adapter: &dyn ConfigPort) -> Management {
    let d = Management::default();
    let entry_reference = match adapter.get_string("management", "entry_reference").as_deref().map(str::trim) {
        Some("close") => EntryReference::Close,
        _ => EntryReference::PriorExtreme,
    };
    let partial_default = d.partial.map_or(0.0, |p| p.trigger_pct);
    let fraction_default = d.partial.map_or(0.5, |p| p.fraction);
    Management {
        entry_reference,
        risk_reward: adapter.get_double("management", "risk_reward", d.risk_reward),
        breakeven_trigger_pct: enabled(adapter.get_double(
            "management",
            "breakeven_trigger_pct",
            d.breakeven_trigger_pct.unwrap_or(0.0),
        )),
        partial: enabled(adapter.get_double("management", "partial_trigger_pct", partial_default)).map(
            |trigger_pct| PartialExit {
                trigger_pct,
                fraction: adapter.get_double("management", "partial_fraction", fraction_default),
            },
        ),
    }
}

fn build_sizing(adapter: &dyn ConfigPort) -> Result<Sizing, ScoretraderError> {
    let policy = adapter
        .get_string("risk", "sizing")
        .unwrap_or_else(|| "risk_normalized".to_string());
    match policy.trim() {
        "risk_normalized" => Ok(Sizing::RiskNormalized(RiskNormalized {
            risk_fraction: adapter.get_double("risk", "risk_fraction", 0.01),
        })),
        "fixed_fraction" => Ok(Sizing::FixedFraction(FixedFraction {
            fraction: adapter.get_double("risk", "fixed_fraction", 0.01),
        })),
        other => Err(invalid(
            "risk",
            "sizing",
            format!("unknown sizing policy {:?} (expected risk_normalized or fixed_fraction)", other),
        )),
    }
}
