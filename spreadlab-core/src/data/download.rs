//! Download orchestrator: multi-symbol fetches with progress reporting.

use super::fetcher::{DataFetcher, LoadError};
use super::provider::{DataSource, FetchWindow};
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

/// Pause between symbols that hit the network.
pub const DEFAULT_SYMBOL_PAUSE: Duration = Duration::from_secs(2);

/// Progress callback for multi-symbol downloads.
pub trait DownloadProgress {
    /// Called when starting to fetch a symbol.
    fn on_start(&self, symbol: &str, index: usize, total: usize);

    /// Called when a symbol completes; `Ok` carries the candle count.
    fn on_complete(
        &self,
        symbol: &str,
        index: usize,
        total: usize,
        result: &Result<usize, LoadError>,
    );

    /// Called when the entire batch is done.
    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize);
}

/// Progress reporter that writes to the tracing log.
pub struct LogProgress;

impl DownloadProgress for LogProgress {
    fn on_start(&self, symbol: &str, index: usize, total: usize) {
        info!("[{}/{}] fetching {symbol}", index + 1, total);
    }

    fn on_complete(
        &self,
        symbol: &str,
        _index: usize,
        _total: usize,
        result: &Result<usize, LoadError>,
    ) {
        match result {
            Ok(count) => info!("  {symbol}: {count} candles"),
            Err(e) => warn!("  {symbol}: {e}"),
        }
    }

    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize) {
        info!("download complete: {succeeded}/{total} succeeded, {failed} failed");
    }
}

/// Summary of a batch download operation.
#[derive(Debug)]
pub struct DownloadSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<(String, LoadError)>,
}

impl DownloadSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// Resolve every symbol through `fetcher`, populating the cache.
///
/// Symbols are processed in order. After a symbol that went to the network,
/// the loop sleeps `symbol_pause` before the next one.
pub fn download_symbols(
    fetcher: &DataFetcher<'_>,
    symbols: &[String],
    window: FetchWindow,
    symbol_pause: Duration,
    progress: &dyn DownloadProgress,
) -> DownloadSummary {
    let total = symbols.len();
    let mut succeeded = 0;
    let mut errors = Vec::new();

    for (i, symbol) in symbols.iter().enumerate() {
        progress.on_start(symbol, i, total);

        let loaded = fetcher.fetch_candles(symbol, window);
        let hit_network = matches!(&loaded, Ok(l) if l.source != DataSource::Cache);
        let result = loaded.map(|l| l.candles.len());
        progress.on_complete(symbol, i, total, &result);

        match result {
            Ok(_) => succeeded += 1,
            Err(e) => errors.push((symbol.clone(), e)),
        }

        if hit_network && i + 1 < total && !symbol_pause.is_zero() {
            thread::sleep(symbol_pause);
        }
    }

    let failed = errors.len();
    progress.on_batch_complete(succeeded, failed, total);

    DownloadSummary {
        total,
        succeeded,
        failed,
        errors,
    }
}
