//! Reporting and export: trades CSV, Markdown report, and the log summary.
//!
//! - **CSV**: one row per closed trade, read back exactly by [`read_trades_csv`]
//! - **Markdown**: parameters, symbol coverage, summary, per-symbol table, verdict
//! - **Summary block**: the same headline numbers as plain lines for the log

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use spreadlab_core::domain::TradeRecord;
use thiserror::Error;
use tracing::info;

use crate::runner::{BacktestRun, SymbolOutcome};

/// Column order of the trades CSV. Matches the field order of [`TradeRecord`].
pub const TRADE_COLUMNS: [&str; 14] = [
    "symbol",
    "side",
    "entry_time",
    "exit_time",
    "entry_price",
    "exit_price",
    "leverage",
    "size",
    "entry_spread",
    "exit_spread",
    "gross_pnl",
    "fees",
    "pnl",
    "exit_reason",
];

/// Writing an output file failed. Fatal for the run.
#[derive(Debug, Error)]
pub enum ReportWriteError {
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write CSV {}: {source}", path.display())]
    Csv { path: PathBuf, source: csv::Error },
}

fn ensure_parent(path: &Path) -> Result<(), ReportWriteError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|source| ReportWriteError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
        _ => Ok(()),
    }
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Write the trades CSV, creating parent directories as needed. The header is
/// always present, even with no trades.
pub fn write_trades_csv(trades: &[TradeRecord], path: &Path) -> Result<(), ReportWriteError> {
    ensure_parent(path)?;
    let csv_err = |source| ReportWriteError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(csv_err)?;
    wtr.write_record(TRADE_COLUMNS).map_err(csv_err)?;
    for trade in trades {
        wtr.serialize(trade).map_err(csv_err)?;
    }
    wtr.flush().map_err(|source| ReportWriteError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), rows = trades.len(), "wrote trades CSV");
    Ok(())
}

/// Read a trades CSV written by [`write_trades_csv`].
pub fn read_trades_csv(path: &Path) -> Result<Vec<TradeRecord>> {
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    rdr.deserialize()
        .collect::<Result<Vec<TradeRecord>, _>>()
        .with_context(|| format!("failed to parse trades from {}", path.display()))
}

// ─── Summary block ──────────────────────────────────────────────────

/// Headline statistics as plain lines, for the log and the terminal.
pub fn render_summary(run: &BacktestRun) -> Vec<String> {
    let s = &run.summary;
    let mut lines = vec![
        "=".repeat(60),
        "BACKTEST SUMMARY".to_string(),
        "=".repeat(60),
        format!(
            "Symbols:        {} processed, {} skipped",
            run.processed_count(),
            run.skipped_count()
        ),
        format!("Total trades:   {}", s.total_trades),
    ];
    if s.total_trades > 0 {
        lines.extend([
            format!("Winning trades: {}", s.winning_trades),
            format!("Losing trades:  {}", s.losing_trades),
            format!("Win rate:       {:.2}%", s.win_rate * 100.0),
            format!("Total P&L:      {:.4}", s.total_pnl),
            format!("Average P&L:    {:.4}", s.avg_pnl),
            format!("Average win:    {:.4}", s.avg_win),
            format!("Average loss:   {:.4} (magnitude)", s.avg_loss),
            format!("Best trade:     {:.4}", s.best_trade),
            format!("Worst trade:    {:.4}", s.worst_trade),
            format!("Profit factor:  {}", s.profit_factor),
            format!("Total fees:     {:.4}", s.total_fees),
            format!("Avg hold time:  {:.1} min", s.avg_hold_minutes),
        ]);
    } else {
        lines.push(format!("Profit factor:  {}", s.profit_factor));
    }
    lines.push(format!("Verdict:        {}", s.verdict));
    lines.push("=".repeat(60));
    lines
}

/// Emit [`render_summary`] to the log, one event per line.
pub fn log_summary(run: &BacktestRun) {
    for line in render_summary(run) {
        info!("{line}");
    }
}

// ─── Markdown report ────────────────────────────────────────────────

/// Generate a Markdown report for a run.
pub fn generate_report(run: &BacktestRun) -> String {
    let mut md = String::with_capacity(4096);
    let c = &run.config;
    let s = &run.summary;

    md.push_str("# Spread Backtest Report\n\n");

    md.push_str("## Parameters\n\n");
    md.push_str("| Parameter | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!(
        "| Window | {} to {} ({} days) |\n",
        run.window.start.format("%Y-%m-%d %H:%M"),
        run.window.end.format("%Y-%m-%d %H:%M"),
        c.data.days
    ));
    md.push_str(&format!("| Interval | {} |\n", c.data.interval));
    md.push_str(&format!(
        "| Min entry spread | {}% |\n",
        c.strategy.min_entry_spread_pct
    ));
    md.push_str(&format!("| Exit spread | {}% |\n", c.strategy.exit_spread_pct));
    md.push_str(&format!("| Position size | {} |\n", c.strategy.position_size));
    md.push_str(&format!("| Leverage | {}x |\n", c.strategy.leverage));
    md.push_str(&format!(
        "| Spread noise | ±{}% |\n",
        c.strategy.noise * 100.0
    ));
    md.push_str(&format!(
        "| Fees | {}% per side ({:?} basis) |\n",
        c.fees.rate_per_side * 100.0,
        c.fees.basis
    ));
    if let Some(seed) = run.seed {
        md.push_str(&format!("| Seed | {seed} |\n"));
    }
    md.push('\n');

    md.push_str("## Coverage\n\n");
    md.push_str(&format!(
        "{} symbols processed, {} skipped.\n\n",
        run.processed_count(),
        run.skipped_count()
    ));
    md.push_str("| Symbol | Status | Candles | Max spread | Trades | P&L |\n");
    md.push_str("| --- | --- | --- | --- | --- | --- |\n");
    for outcome in &run.outcomes {
        match outcome {
            SymbolOutcome::Processed {
                symbol,
                source,
                candles,
                max_spread,
                trades,
                pnl,
            } => md.push_str(&format!(
                "| {symbol} | ok ({source:?}) | {candles} | {max_spread:.3}% | {trades} | {pnl:.4} |\n"
            )),
            SymbolOutcome::Skipped { symbol, reason } => md.push_str(&format!(
                "| {symbol} | skipped: {} | | | | |\n",
                reason.replace('|', "/")
            )),
        }
    }
    md.push('\n');

    md.push_str("## Summary\n\n");
    md.push_str("| Metric | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Trades | {} |\n", s.total_trades));
    md.push_str(&format!(
        "| Winning / Losing | {} / {} |\n",
        s.winning_trades, s.losing_trades
    ));
    md.push_str(&format!("| Win Rate | {:.2}% |\n", s.win_rate * 100.0));
    md.push_str(&format!("| Total P&L | {:.4} |\n", s.total_pnl));
    md.push_str(&format!("| Average P&L | {:.4} |\n", s.avg_pnl));
    md.push_str(&format!("| Average Win | {:.4} |\n", s.avg_win));
    md.push_str(&format!("| Average Loss (magnitude) | {:.4} |\n", s.avg_loss));
    md.push_str(&format!("| Best Trade | {:.4} |\n", s.best_trade));
    md.push_str(&format!("| Worst Trade | {:.4} |\n", s.worst_trade));
    md.push_str(&format!("| Profit Factor | {} |\n", s.profit_factor));
    md.push_str(&format!("| Total Fees | {:.4} |\n", s.total_fees));
    md.push_str(&format!(
        "| Avg Hold Time | {:.1} min |\n",
        s.avg_hold_minutes
    ));
    md.push_str(&format!(
        "| End-of-data Exits | {} |\n",
        s.end_of_data_exits
    ));
    md.push('\n');

    if !s.per_symbol.is_empty() {
        md.push_str("## Per-Symbol Performance\n\n");
        md.push_str("| Symbol | Trades | Win Rate | Total P&L |\n");
        md.push_str("| --- | --- | --- | --- |\n");
        for row in &s.per_symbol {
            md.push_str(&format!(
                "| {} | {} | {:.1}% | {:.4} |\n",
                row.symbol,
                row.trades,
                row.win_rate * 100.0,
                row.total_pnl
            ));
        }
        md.push('\n');
    }

    md.push_str("## Verdict\n\n");
    md.push_str(s.verdict.describe());
    md.push('\n');

    md
}

/// Write the Markdown report, creating parent directories as needed.
pub fn write_report(run: &BacktestRun, path: &Path) -> Result<(), ReportWriteError> {
    ensure_parent(path)?;
    fs::write(path, generate_report(run)).map_err(|source| ReportWriteError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), "wrote report");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BacktestConfig;
    use crate::metrics::{ReportSummary, Verdict};
    use chrono::{Duration, TimeZone, Utc};
    use spreadlab_core::data::{DataSource, FetchWindow};
    use spreadlab_core::domain::{ExitReason, PositionSide};

    fn make_trade(symbol: &str, pnl: f64, reason: ExitReason) -> TradeRecord {
        let entry = Utc.with_ymd_and_hms(2024, 4, 1, 8, 15, 0).unwrap();
        TradeRecord {
            symbol: symbol.into(),
            side: PositionSide::Short,
            entry_time: entry,
            exit_time: entry + Duration::minutes(45),
            entry_price: 0.123456789,
            exit_price: 0.1199,
            leverage: 20.0,
            size: 10.0,
            entry_spread: 7.000000000000001,
            exit_spread: 0.0,
            gross_pnl: pnl + 0.1,
            fees: 0.1,
            pnl,
            exit_reason: reason,
        }
    }

    fn make_run(trades: Vec<TradeRecord>) -> BacktestRun {
        let now = Utc.with_ymd_and_hms(2024, 4, 2, 0, 0, 0).unwrap();
        BacktestRun {
            config: BacktestConfig::default(),
            window: FetchWindow::lookback(1, now),
            seed: Some(42),
            outcomes: vec![
                SymbolOutcome::Processed {
                    symbol: "BTC_USDT".into(),
                    source: DataSource::Cache,
                    candles: 96,
                    max_spread: 0.49,
                    trades: trades.len(),
                    pnl: trades.iter().map(|t| t.pnl).sum(),
                },
                SymbolOutcome::Skipped {
                    symbol: "DEAD_USDT".into(),
                    reason: "contract not found: DEAD_USDT".into(),
                },
            ],
            summary: ReportSummary::compute(&trades),
            trades,
        }
    }

    #[test]
    fn csv_header_matches_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trades.csv");
        let trades = [
            make_trade("BTC_USDT", 1.0, ExitReason::SpreadExit),
            make_trade("ETH_USDT", -1.0, ExitReason::EndOfData),
        ];
        write_trades_csv(&trades, &path).unwrap();

        let csv = fs::read_to_string(&path).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next().unwrap(), TRADE_COLUMNS.join(","));
        let row = lines.next().unwrap();
        assert!(row.starts_with("BTC_USDT,SHORT,2024-04-01T08:15:00Z,"));
        assert!(row.ends_with(",spread_exit"));
        let forced = lines.next().unwrap();
        assert!(forced.ends_with(",end-of-data exit"), "{forced}");
    }

    #[test]
    fn empty_trades_write_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("trades.csv");
        write_trades_csv(&[], &path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.trim_end(), TRADE_COLUMNS.join(","));
        assert!(read_trades_csv(&path).unwrap().is_empty());
    }

    #[test]
    fn csv_roundtrip_is_exact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trades.csv");
        let trades = vec![
            make_trade("BTC_USDT", 1.0 / 3.0, ExitReason::SpreadExit),
            make_trade("ETH_USDT", -0.1 - 0.2, ExitReason::EndOfData),
        ];

        write_trades_csv(&trades, &path).unwrap();
        assert_eq!(read_trades_csv(&path).unwrap(), trades);
    }

    #[test]
    fn unwritable_path_is_a_report_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();
        let err = write_trades_csv(&[], &blocker.join("trades.csv")).unwrap_err();
        assert!(err.to_string().contains("trades.csv"));
    }

    #[test]
    fn report_has_all_sections() {
        let run = make_run(vec![
            make_trade("BTC_USDT", 2.0, ExitReason::SpreadExit),
            make_trade("BTC_USDT", -1.0, ExitReason::EndOfData),
        ]);
        let md = generate_report(&run);

        assert!(md.starts_with("# Spread Backtest Report"));
        for section in ["## Parameters", "## Coverage", "## Summary", "## Per-Symbol", "## Verdict"]
        {
            assert!(md.contains(section), "missing {section}");
        }
        assert!(md.contains("| Seed | 42 |"));
        assert!(md.contains("1 symbols processed, 1 skipped"));
        assert!(md.contains("skipped: contract not found"));
        assert!(md.contains("| Profit Factor | 2.00 |"));
        assert!(md.contains("| End-of-data Exits | 1 |"));
        assert!(md.contains("| Average Loss (magnitude) | 1.0000 |"));
    }

    #[test]
    fn summary_block_for_no_trades() {
        let run = make_run(Vec::new());
        assert_eq!(run.summary.verdict, Verdict::NoTrades);
        let lines = render_summary(&run);
        assert!(lines.iter().any(|l| l.contains("Total trades:   0")));
        assert!(lines.iter().any(|l| l.contains("Profit factor:  N/A")));
        assert!(!lines.iter().any(|l| l.contains("Win rate")));
        assert!(lines.iter().any(|l| l.contains("No trades were executed")));
    }

    #[test]
    fn summary_block_shows_infinite_profit_factor() {
        let run = make_run(vec![make_trade("BTC_USDT", 2.0, ExitReason::SpreadExit)]);
        let lines = render_summary(&run);
        assert!(lines.iter().any(|l| l == "Profit factor:  ∞"));
        assert!(lines.iter().any(|l| l == "Win rate:       100.00%"));
    }
}
