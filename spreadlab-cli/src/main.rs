//! SpreadLab CLI: backtest, download, and cache inspection commands.
//!
//! Commands:
//! - `run`: discover contracts, fetch candles, simulate, write CSV + report
//! - `download`: populate the candle cache without simulating
//! - `cache status`: list cached symbols, ranges, candle counts, sizes

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

use spreadlab_core::data::{
    download_symbols, CandleCache, CandleProvider, DataFetcher, FetchWindow, GateIoProvider,
    LogProgress,
};
use spreadlab_core::domain::CandleInterval;
use spreadlab_core::FeeBasis;
use spreadlab_runner::{
    init_logging, log_summary, resolve_symbols, run_backtest, write_report, write_trades_csv,
    BacktestConfig, BacktestRun,
};

#[derive(Parser)]
#[command(
    name = "spreadlab",
    about = "SpreadLab CLI: spread-trading backtests on perpetual futures",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a backtest over discovered (or listed) contracts.
    Run {
        #[command(flatten)]
        data: DataArgs,

        #[command(flatten)]
        strategy: StrategyArgs,

        /// Trades CSV output path.
        #[arg(long)]
        trades_csv: Option<PathBuf>,

        /// Markdown report output path.
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Download candles into the cache without running a backtest.
    Download {
        #[command(flatten)]
        data: DataArgs,
    },
    /// Cache inspection commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// List cached symbols with their ranges, candle counts and sizes.
    Status {
        /// TOML config file; its `data.cache_dir` is used unless `--cache-dir` is given.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Cache directory. Defaults to `data.cache_dir` (`data/cache`).
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },
}

/// Flags shared by `run` and `download`. Each one overrides the config file.
#[derive(Args, Debug, Default)]
struct DataArgs {
    /// TOML config file. Flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Lookback window in days.
    #[arg(long)]
    days: Option<u32>,

    /// Maximum number of contracts to discover.
    #[arg(long)]
    max_symbols: Option<usize>,

    /// Candle interval (1m, 5m, 15m, 1h, 4h, 1d).
    #[arg(long)]
    interval: Option<CandleInterval>,

    /// Explicit contracts, comma separated (e.g. BTC_USDT,ETH_USDT).
    #[arg(long, value_delimiter = ',')]
    symbols: Vec<String>,

    /// Candle cache directory.
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// No network access: use cached candles only.
    #[arg(long, default_value_t = false)]
    offline: bool,

    /// Re-download even when the cache covers the window.
    #[arg(long, default_value_t = false)]
    force: bool,

    /// Append-only log file.
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
struct StrategyArgs {
    /// Minimum spread (%) to open a position.
    #[arg(long)]
    min_spread: Option<f64>,

    /// Spread (%) at or below which an open position closes.
    #[arg(long)]
    exit_spread: Option<f64>,

    /// Margin per position.
    #[arg(long)]
    size: Option<f64>,

    /// Leverage multiplier.
    #[arg(long)]
    leverage: Option<f64>,

    /// Master seed for the synthetic spread.
    #[arg(long)]
    seed: Option<u64>,

    /// Half-width of the synthetic last-price noise, as a fraction.
    #[arg(long)]
    noise: Option<f64>,

    /// Fee rate charged on each side.
    #[arg(long)]
    fee_rate: Option<f64>,

    /// What the fee rate applies to: notional or margin.
    #[arg(long, value_parser = parse_fee_basis)]
    fee_basis: Option<FeeBasis>,
}

fn parse_fee_basis(s: &str) -> Result<FeeBasis, String> {
    match s.to_ascii_lowercase().as_str() {
        "notional" => Ok(FeeBasis::Notional),
        "margin" => Ok(FeeBasis::Margin),
        other => Err(format!("unknown fee basis '{other}' (notional, margin)")),
    }
}

impl DataArgs {
    /// Config file (or defaults) with these flags applied. Not yet validated:
    /// later overrides may still change it.
    fn load_config(&self) -> Result<BacktestConfig> {
        let mut config = match &self.config {
            Some(path) => BacktestConfig::parse_file(path)?,
            None => BacktestConfig::default(),
        };
        self.apply(&mut config);
        Ok(config)
    }

    fn apply(&self, config: &mut BacktestConfig) {
        let data = &mut config.data;
        if let Some(days) = self.days {
            data.days = days;
        }
        if let Some(max) = self.max_symbols {
            data.max_symbols = max;
        }
        if let Some(interval) = self.interval {
            data.interval = interval;
        }
        if !self.symbols.is_empty() {
            data.symbols = self.symbols.clone();
        }
        if let Some(dir) = &self.cache_dir {
            data.cache_dir = dir.clone();
        }
        data.offline |= self.offline;
        data.force |= self.force;
        if let Some(path) = &self.log_file {
            config.output.log_file = path.clone();
        }
    }
}

impl StrategyArgs {
    fn apply(&self, config: &mut BacktestConfig) {
        let strategy = &mut config.strategy;
        if let Some(v) = self.min_spread {
            strategy.min_entry_spread_pct = v;
        }
        if let Some(v) = self.exit_spread {
            strategy.exit_spread_pct = v;
        }
        if let Some(v) = self.size {
            strategy.position_size = v;
        }
        if let Some(v) = self.leverage {
            strategy.leverage = v;
        }
        if self.seed.is_some() {
            strategy.seed = self.seed;
        }
        if let Some(v) = self.noise {
            strategy.noise = v;
        }
        if let Some(v) = self.fee_rate {
            config.fees.rate_per_side = v;
        }
        if let Some(v) = self.fee_basis {
            config.fees.basis = v;
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            data,
            strategy,
            trades_csv,
            report,
        } => {
            let mut config = data.load_config()?;
            strategy.apply(&mut config);
            if let Some(path) = trades_csv {
                config.output.trades_csv = path;
            }
            if let Some(path) = report {
                config.output.report = path;
            }
            run_backtest_cmd(config)
        }
        Commands::Download { data } => run_download(data.load_config()?),
        Commands::Cache { action } => match action {
            CacheAction::Status { config, cache_dir } => {
                run_cache_status(&status_cache_dir(config.as_deref(), cache_dir)?)
            }
        },
    }
}

/// Exchange client, or `None` when running offline.
fn build_provider(config: &BacktestConfig) -> Result<Option<GateIoProvider>> {
    if config.data.offline {
        return Ok(None);
    }
    let provider = match &config.data.base_url {
        Some(url) => GateIoProvider::with_base_url(url.as_str())?,
        None => GateIoProvider::new()?,
    };
    Ok(Some(provider))
}

fn run_backtest_cmd(config: BacktestConfig) -> Result<()> {
    config.validate()?;
    init_logging(Some(&config.output.log_file))?;

    let provider = build_provider(&config)?;
    let provider_ref = provider.as_ref().map(|p| p as &dyn CandleProvider);

    let run = run_backtest(&config, provider_ref, Utc::now())?;
    log_summary(&run);

    write_trades_csv(&run.trades, &config.output.trades_csv).with_context(|| {
        format!(
            "failed to write trades to {}",
            config.output.trades_csv.display()
        )
    })?;
    write_report(&run, &config.output.report)?;

    print_summary(&run);
    Ok(())
}

fn run_download(config: BacktestConfig) -> Result<()> {
    config.validate()?;
    init_logging(Some(&config.output.log_file))?;

    let provider = build_provider(&config)?;
    let provider_ref = provider.as_ref().map(|p| p as &dyn CandleProvider);

    let cache = CandleCache::new(&config.data.cache_dir);
    let symbols = resolve_symbols(&config, provider_ref, &cache)?;
    let window = FetchWindow::lookback(config.data.days, Utc::now());
    let fetcher = DataFetcher::new(provider_ref, &cache, config.fetch_options());
    info!(
        symbols = symbols.len(),
        cache = %cache.cache_dir().display(),
        "downloading"
    );

    let summary = download_symbols(
        &fetcher,
        &symbols,
        window,
        config.symbol_pause(),
        &LogProgress,
    );

    if !summary.all_succeeded() {
        for (sym, err) in &summary.errors {
            eprintln!("Error for {sym}: {err}");
        }
        bail!("{} of {} symbols failed", summary.failed, summary.total);
    }
    Ok(())
}

/// `--cache-dir`, else the config file's cache directory, else the default.
fn status_cache_dir(config: Option<&Path>, cache_dir: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = cache_dir {
        return Ok(dir);
    }
    let config = match config {
        Some(path) => BacktestConfig::parse_file(path)?,
        None => BacktestConfig::default(),
    };
    Ok(config.data.cache_dir)
}

fn run_cache_status(cache_dir: &Path) -> Result<()> {
    if !cache_dir.exists() {
        println!("Cache directory does not exist: {}", cache_dir.display());
        return Ok(());
    }

    let entries = CandleCache::new(cache_dir).list();
    if entries.is_empty() {
        println!("Cache is empty: {}", cache_dir.display());
        return Ok(());
    }

    let total_size: u64 = entries.iter().map(|e| e.file_size).sum();
    let mut symbols: Vec<&str> = entries.iter().map(|e| e.meta.symbol.as_str()).collect();
    symbols.dedup();

    println!("Cache: {}", cache_dir.display());
    println!("Symbols: {}", symbols.len());
    println!("Total size: {}", format_size(total_size));
    println!();
    println!(
        "{:<16} {:<6} {:<35} {:>9} {:>10}",
        "Symbol", "Int", "Range (UTC)", "Candles", "Size"
    );
    println!("{}", "-".repeat(80));
    for entry in &entries {
        let meta = &entry.meta;
        let range = format!(
            "{} to {}",
            meta.start.format("%Y-%m-%d %H:%M"),
            meta.end.format("%Y-%m-%d %H:%M")
        );
        println!(
            "{:<16} {:<6} {:<35} {:>9} {:>10}",
            meta.symbol,
            meta.interval.as_str(),
            range,
            meta.candle_count,
            format_size(entry.file_size)
        );
    }

    Ok(())
}

fn format_size(bytes: u64) -> String {
    if bytes >= 1_048_576 {
        format!("{:.1} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}

fn print_summary(run: &BacktestRun) {
    let s = &run.summary;
    let output = &run.config.output;

    println!();
    println!(
        "Symbols: {} processed, {} skipped",
        run.processed_count(),
        run.skipped_count()
    );
    println!("Trades:  {}", s.total_trades);
    if s.total_trades > 0 {
        println!("Win rate:      {:.1}%", s.win_rate * 100.0);
        println!("Total P&L:     {:.2}", s.total_pnl);
        println!("Profit factor: {}", s.profit_factor);
        println!("Total fees:    {:.2}", s.total_fees);
    }
    println!("Verdict: {}", s.verdict);
    if let Some(seed) = run.seed {
        println!("Seed:    {seed}");
    }
    println!();
    println!("Trades CSV: {}", output.trades_csv.display());
    println!("Report:     {}", output.report.display());
    println!("Log:        {}", output.log_file.display());
}
