//! Backtest runner: wires together symbol discovery, data loading, spread
//! synthesis, the simulator, and metrics.
//!
//! Two entry points:
//! - `run_backtest()`: random spreads seeded from the config. Used by the CLI.
//! - `run_backtest_with()`: caller-supplied spread source per symbol.
//!
//! Symbols run one at a time in discovery order. A symbol that cannot be
//! loaded is recorded as skipped and the run carries on.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::thread;
use thiserror::Error;
use tracing::{info, warn};

use spreadlab_core::data::{
    CandleCache, CandleProvider, DataFetcher, DataSource, FetchError, FetchWindow,
};
use spreadlab_core::domain::TradeRecord;
use spreadlab_core::rng::SeedHierarchy;
use spreadlab_core::simulate_symbol;
use spreadlab_core::spread::{RandomSpread, SpreadSource};

use crate::config::{BacktestConfig, ConfigError};
use crate::metrics::ReportSummary;

/// Fatal errors from the runner. Per-symbol problems are never fatal.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("symbol discovery failed and the cache is empty: {0}")]
    Discovery(FetchError),

    #[error("no symbols to backtest")]
    NoSymbols,
}

/// What happened to one symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SymbolOutcome {
    Processed {
        symbol: String,
        source: DataSource,
        candles: usize,
        max_spread: f64,
        trades: usize,
        pnl: f64,
    },
    Skipped {
        symbol: String,
        reason: String,
    },
}

impl SymbolOutcome {
    pub fn symbol(&self) -> &str {
        match self {
            Self::Processed { symbol, .. } | Self::Skipped { symbol, .. } => symbol,
        }
    }

    pub fn is_processed(&self) -> bool {
        matches!(self, Self::Processed { .. })
    }
}

/// Complete result of a backtest run.
#[derive(Debug, Clone, Serialize)]
pub struct BacktestRun {
    pub config: BacktestConfig,
    pub window: FetchWindow,
    /// Master seed of the random spread source, so an unseeded run can be
    /// replayed. `None` when the caller supplied the spread sources.
    pub seed: Option<u64>,
    pub outcomes: Vec<SymbolOutcome>,
    /// Trades across all symbols, in symbol order then entry order.
    pub trades: Vec<TradeRecord>,
    pub summary: ReportSummary,
}

impl BacktestRun {
    pub fn processed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_processed()).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.outcomes.len() - self.processed_count()
    }
}

/// Run with the random spread source, one reproducible stream per symbol.
pub fn run_backtest(
    config: &BacktestConfig,
    provider: Option<&dyn CandleProvider>,
    now: DateTime<Utc>,
) -> Result<BacktestRun, RunError> {
    let seed = config.strategy.seed.unwrap_or_else(rand::random);
    let seeds = SeedHierarchy::new(seed);
    let noise = config.strategy.noise;
    let mut spreads = |symbol: &str| -> Box<dyn SpreadSource> {
        Box::new(RandomSpread::for_symbol(&seeds, symbol, noise))
    };
    let mut run = run_backtest_with(config, provider, now, &mut spreads)?;
    run.seed = Some(seed);
    Ok(run)
}

/// Run with a spread source built per symbol by `spreads`.
pub fn run_backtest_with(
    config: &BacktestConfig,
    provider: Option<&dyn CandleProvider>,
    now: DateTime<Utc>,
    spreads: &mut dyn FnMut(&str) -> Box<dyn SpreadSource>,
) -> Result<BacktestRun, RunError> {
    config.validate()?;

    let cache = CandleCache::new(&config.data.cache_dir);
    let window = FetchWindow::lookback(config.data.days, now);
    let symbols = resolve_symbols(config, provider, &cache)?;
    let fetcher = DataFetcher::new(provider, &cache, config.fetch_options());
    let sim_config = config.simulator_config();

    info!(
        symbols = symbols.len(),
        days = config.data.days,
        interval = %config.data.interval,
        min_entry = sim_config.min_entry_spread_pct,
        exit = sim_config.exit_spread_pct,
        size = sim_config.position_size,
        leverage = sim_config.leverage,
        "starting backtest"
    );

    let total = symbols.len();
    let mut outcomes = Vec::with_capacity(total);
    let mut trades = Vec::new();

    for (i, symbol) in symbols.iter().enumerate() {
        let symbol = symbol.as_str();
        info!("[{}/{}] {symbol}", i + 1, total);

        let loaded = match fetcher.fetch_candles(symbol, window) {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!(symbol, "skipping: {e}");
                outcomes.push(SymbolOutcome::Skipped {
                    symbol: symbol.to_string(),
                    reason: e.to_string(),
                });
                continue;
            }
        };

        let mut source = spreads(symbol);
        let sim = simulate_symbol(symbol, &loaded.candles, &sim_config, source.as_mut());
        info!(
            symbol,
            candles = sim.candles_processed,
            max_spread_pct = sim.max_spread,
            trades = sim.trades.len(),
            pnl = sim.total_pnl(),
            "simulated"
        );

        outcomes.push(SymbolOutcome::Processed {
            symbol: symbol.to_string(),
            source: loaded.source,
            candles: sim.candles_processed,
            max_spread: sim.max_spread,
            trades: sim.trades.len(),
            pnl: sim.total_pnl(),
        });
        trades.extend(sim.trades);

        let pause = config.symbol_pause();
        if loaded.source != DataSource::Cache && i + 1 < total && !pause.is_zero() {
            thread::sleep(pause);
        }
    }

    let summary = ReportSummary::compute(&trades);
    let run = BacktestRun {
        config: config.clone(),
        window,
        seed: None,
        outcomes,
        trades,
        summary,
    };
    info!(
        processed = run.processed_count(),
        skipped = run.skipped_count(),
        trades = run.trades.len(),
        "backtest finished"
    );
    Ok(run)
}

/// Symbols to backtest, in order:
/// explicit list, else exchange discovery (falling back to the cache when
/// discovery fails), else the cache when offline.
pub fn resolve_symbols(
    config: &BacktestConfig,
    provider: Option<&dyn CandleProvider>,
    cache: &CandleCache,
) -> Result<Vec<String>, RunError> {
    if !config.data.symbols.is_empty() {
        let mut seen = std::collections::HashSet::new();
        let symbols: Vec<String> = config
            .data
            .symbols
            .iter()
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty() && seen.insert(s.clone()))
            .collect();
        return non_empty(symbols);
    }

    let max = config.data.max_symbols;
    let cached = || {
        let mut symbols = cache.symbols(config.data.interval);
        symbols.truncate(max);
        symbols
    };

    let online = provider.filter(|_| !config.data.offline);
    let Some(provider) = online else {
        info!("offline: using cached symbols");
        return non_empty(cached());
    };

    match provider.list_contracts() {
        Ok(mut symbols) => {
            info!(
                available = symbols.len(),
                using = symbols.len().min(max),
                provider = provider.name(),
                "discovered contracts"
            );
            symbols.truncate(max);
            non_empty(symbols)
        }
        Err(e) => {
            let fallback = cached();
            if fallback.is_empty() {
                return Err(RunError::Discovery(e));
            }
            warn!("symbol discovery failed ({e}); using {} cached symbols", fallback.len());
            Ok(fallback)
        }
    }
}

fn non_empty(symbols: Vec<String>) -> Result<Vec<String>, RunError> {
    if symbols.is_empty() {
        Err(RunError::NoSymbols)
    } else {
        Ok(symbols)
    }
}
