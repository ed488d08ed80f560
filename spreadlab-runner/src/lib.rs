//! SpreadLab Runner: backtest orchestration, configuration, metrics, export.
//!
//! This crate builds on `spreadlab-core` to provide:
//! - TOML configuration with validated defaults
//! - Symbol discovery and the per-symbol fetch → simulate loop
//! - Trade statistics, profit factor sentinels, and a verdict
//! - Trades CSV, Markdown report, and the log summary block
//! - Tracing subscriber setup for the binary

pub mod config;
pub mod export;
pub mod logging;
pub mod metrics;
pub mod runner;

pub use config::{BacktestConfig, ConfigError};
pub use export::{
    generate_report, log_summary, read_trades_csv, render_summary, write_report,
    write_trades_csv, ReportWriteError,
};
pub use logging::init_logging;
pub use metrics::{ProfitFactor, ReportSummary, SymbolBreakdown, Verdict};
pub use runner::{
    resolve_symbols, run_backtest, run_backtest_with, BacktestRun, RunError, SymbolOutcome,
};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<BacktestConfig>();
        assert_sync::<BacktestConfig>();
    }

    #[test]
    fn run_types_are_send_sync() {
        assert_send::<BacktestRun>();
        assert_sync::<BacktestRun>();
        assert_send::<ReportSummary>();
        assert_sync::<ReportSummary>();
    }
}
