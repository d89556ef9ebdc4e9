//! End-to-end pipelines: CSV candles through the backtest replay, and the
//! live trader driven over the paper exchange.

mod common;

use common::*;
use proptest::prelude::*;
use scoretrader::adapters::csv_adapter::CsvAdapter;
use scoretrader::adapters::paper_exchange::{FillKind, PaperExchange};
use scoretrader::domain::backtest::{BacktestConfig, run_backtest};
use scoretrader::domain::candle::{Candle, Timeframe};
use scoretrader::domain::decision::DecisionOutcome;
use scoretrader::domain::error::ScoretraderError;
use scoretrader::domain::live::LiveTrader;
use scoretrader::domain::position::ExitReason;
use scoretrader::ports::market_data_port::MarketDataPort;
use std::fs;
use tempfile::TempDir;

fn config() -> BacktestConfig {
    BacktestConfig {
        initial_balance: 1000.0,
        min_qty: 0.001,
    }
}

/// Rally into a collapse that runs through any stop.
fn rally_then_crash(rally_bars: usize) -> Vec<Candle> {
    let mut candles: Vec<Candle> = (0..rally_bars)
        .map(|i| rally_candle(i, if i % 3 == 0 { 4000.0 } else { 1000.0 }))
        .collect();
    let top = 100.0 + rally_bars as f64;
    for k in 0..5 {
        let close = top - 10.0 * (k + 1) as f64;
        candles.push(make_candle(rally_bars + k, close + 9.0, close + 9.5, close - 0.5, close, 1000.0));
    }
    candles
}

mod backtest_pipeline {
    use super::*;

    #[test]
    fn csv_candles_replay_into_report() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("BTCUSDT_15.csv"), to_csv(&wavy_candles(300))).unwrap();
        let adapter = CsvAdapter::new(dir.path().to_path_buf());
        let candles = adapter
            .fetch_candles(SYMBOL, Timeframe::Minutes(15), None, None, usize::MAX)
            .unwrap();
        assert_eq!(candles.len(), 300);

        let mut strategy = quick_strategy();
        strategy.scoring.min_score = 3;
        let result = run_backtest(&strategy, &config(), &candles, None).unwrap();

        assert_eq!(result.decisions.len(), 300 - 8);
        let report = result.report();
        let entries = result.decisions.iter().filter(|d| d.is_entry()).count();
        assert_eq!(report.overall.opened as usize, entries);
        assert_eq!((report.overall.wins + report.overall.losses) as usize, result.trades.len());
        assert_eq!(report.final_balance, result.ledger.balance());
        assert!(report.overall.max_drawdown_pct >= 0.0);
        assert!(!report.months.is_empty());
    }

    #[test]
    fn higher_frame_candles_are_accepted() {
        let mut strategy = quick_strategy();
        strategy.higher_timeframe = Some(Timeframe::Minutes(60));
        let base = wavy_candles(200);
        let hourly: Vec<Candle> = base
            .chunks(4)
            .enumerate()
            .map(|(i, chunk)| {
                let high = chunk.iter().map(|c| c.high).fold(f64::MIN, f64::max);
                let low = chunk.iter().map(|c| c.low).fold(f64::MAX, f64::min);
                let volume = chunk.iter().map(|c| c.volume).sum();
                make_candle(i * 4, chunk[0].open, high, low, chunk[chunk.len() - 1].close, volume)
            })
            .collect();

        let result = run_backtest(&strategy, &config(), &base, Some(&hourly)).unwrap();
        assert_eq!(result.decisions.len(), 200 - 8);
    }

    #[test]
    fn unordered_higher_frame_is_rejected() {
        let mut strategy = quick_strategy();
        strategy.higher_timeframe = Some(Timeframe::Minutes(60));
        let mut hourly = wavy_candles(10);
        hourly.reverse();
        let result = run_backtest(&strategy, &config(), &wavy_candles(50), Some(&hourly));
        assert!(matches!(result, Err(ScoretraderError::CandleOrder { .. })));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        // decisions at bar i never depend on bars after i
        #[test]
        fn replay_prefix_is_stable(cut in 20usize..150, min_score in 2i32..6) {
            let mut strategy = quick_strategy();
            strategy.scoring.min_score = min_score;
            let candles = wavy_candles(150);
            let full = run_backtest(&strategy, &config(), &candles, None).unwrap();
            let partial = run_backtest(&strategy, &config(), &candles[..cut], None).unwrap();
            prop_assert_eq!(&partial.decisions[..], &full.decisions[..partial.decisions.len()]);
        }
    }
}

mod paper_pipeline {
    use super::*;

    #[test]
    fn every_revealed_bar_yields_one_decision() {
        let mut strategy = quick_strategy();
        strategy.scoring.min_score = 3;
        let exchange = PaperExchange::new(SYMBOL, Timeframe::Minutes(15), wavy_candles(200), 1000.0, 0.001);
        let mut trader = LiveTrader::new(strategy, quick_live_config(), &exchange, &exchange, 1000.0);

        let mut records = Vec::new();
        while exchange.advance() {
            records.push(trader.run_cycle());
        }

        assert_eq!(records.len(), 200);
        assert!(records.iter().all(|r| !matches!(r.outcome, DecisionOutcome::Error { .. })));

        let entries = records.iter().filter(|r| r.is_entry()).count();
        let exits = records.iter().filter(|r| r.is_exit()).count();
        let market_fills = exchange
            .fills()
            .iter()
            .filter(|f| f.kind == FillKind::Market)
            .count();
        assert_eq!(entries, market_fills);
        assert_eq!(entries, exits + usize::from(trader.tracker().position().is_some()));

        let report = trader.ledger().report();
        assert_eq!(report.overall.opened as usize, entries);
        assert_eq!((report.overall.wins + report.overall.losses) as usize, exits);
    }

    #[test]
    fn crash_closes_paper_position_at_stop() {
        let mut strategy = quick_strategy();
        strategy.management.risk_reward = 50.0;
        strategy.management.breakeven_trigger_pct = None;
        strategy.management.partial = None;
        let exchange = PaperExchange::new(SYMBOL, Timeframe::Minutes(15), rally_then_crash(30), 1000.0, 0.001);
        let mut trader = LiveTrader::new(strategy, quick_live_config(), &exchange, &exchange, 1000.0);

        let mut exits = Vec::new();
        while exchange.advance() {
            if let DecisionOutcome::Exited { trade } = trader.run_cycle().outcome {
                exits.push(trade);
            }
        }

        assert!(!exits.is_empty());
        assert_eq!(exits[0].reason, ExitReason::Stop);
        assert!(exchange.fills().iter().any(|f| f.kind == FillKind::Stop));
        assert!(exchange.balance() < 1000.0);
    }
}
