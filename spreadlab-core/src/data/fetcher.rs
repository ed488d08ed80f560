//! Candle resolution for a single symbol.
//!
//! Fallback policy:
//! 1. Cache covers the window and `force` is off → load from cache
//! 2. Online with a provider → download, clean, merge into the cache
//! 3. Offline (or no provider) → whatever the cache holds for the window
//! 4. Otherwise → `FetchError::NoCachedData`
//!
//! The returned series is always cleaned by [`ingest`](super::ingest::ingest)
//! and trimmed to the requested window.

use super::cache::{CandleCache, CoverageResult};
use super::ingest::{ingest, DataQualityError};
use super::provider::{CandleProvider, DataSource, FetchError, FetchWindow};
use crate::domain::{Candle, CandleInterval};
use chrono::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Why a symbol could not be loaded. Both variants skip the symbol.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Quality(#[from] DataQualityError),
}

/// Options controlling how candles are resolved.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub interval: CandleInterval,
    /// Never make network requests.
    pub offline: bool,
    /// Re-download even if the cache covers the window.
    pub force: bool,
    /// Minimum usable candles per symbol.
    pub min_candles: usize,
    /// How old the end of a cached window may be and still count as covering.
    pub max_staleness: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            interval: CandleInterval::default(),
            offline: false,
            force: false,
            min_candles: 2,
            max_staleness: Duration::hours(12),
        }
    }
}

/// Clean candles for one symbol with their provenance.
#[derive(Debug, Clone)]
pub struct LoadedCandles {
    pub symbol: String,
    pub candles: Vec<Candle>,
    pub source: DataSource,
    pub duplicates_dropped: usize,
    pub invalid_dropped: usize,
}

pub struct DataFetcher<'a> {
    provider: Option<&'a dyn CandleProvider>,
    cache: &'a CandleCache,
    options: FetchOptions,
}

impl<'a> DataFetcher<'a> {
    pub fn new(
        provider: Option<&'a dyn CandleProvider>,
        cache: &'a CandleCache,
        options: FetchOptions,
    ) -> Self {
        Self {
            provider,
            cache,
            options,
        }
    }

    fn online_provider(&self) -> Option<&'a dyn CandleProvider> {
        if self.options.offline {
            None
        } else {
            self.provider
        }
    }

    fn tolerance(&self) -> Duration {
        self.options.interval.duration() + self.options.max_staleness
    }

    /// Ordered, de-duplicated candles for `symbol` covering `window`.
    pub fn fetch_candles(
        &self,
        symbol: &str,
        window: FetchWindow,
    ) -> Result<LoadedCandles, LoadError> {
        let interval = self.options.interval;

        if !self.options.force {
            let coverage = self
                .cache
                .covers_range(symbol, interval, window, self.tolerance());
            if coverage == CoverageResult::FullyCovered {
                match self.cache.load(symbol, interval) {
                    Ok(candles) => {
                        debug!(symbol, "cache hit");
                        return self.finish(symbol, candles, window, DataSource::Cache);
                    }
                    Err(e) => warn!(symbol, "cache unusable, refetching: {e}"),
                }
            }
        }

        if let Some(provider) = self.online_provider() {
            let fetched = provider.fetch(symbol, interval, window)?;
            // Clean before caching so the cache never holds duplicates.
            let cleaned = ingest(symbol, fetched.candles, 1)?;
            let (merged, cached_window) = self.merge_with_cache(symbol, cleaned.candles, window);
            if let Err(e) = self
                .cache
                .write(symbol, interval, cached_window, &merged, fetched.source)
            {
                warn!(symbol, "failed to cache candles: {e}");
            }
            return self.finish(symbol, merged, window, fetched.source);
        }

        let candles = self.cache.load(symbol, interval)?;
        if !candles.iter().any(|c| window.contains(c.timestamp)) {
            return Err(FetchError::NoCachedData {
                symbol: symbol.to_string(),
            }
            .into());
        }
        if self.options.force {
            warn!(symbol, "offline: using cached candles despite --force");
        }
        self.finish(symbol, candles, window, DataSource::Cache)
    }

    /// Combine freshly fetched candles with what the cache already holds.
    ///
    /// Fresh candles win on duplicate timestamps. The cached window grows to
    /// the union only when the two windows touch, so a gap is never reported
    /// as covered.
    fn merge_with_cache(
        &self,
        symbol: &str,
        fresh: Vec<Candle>,
        window: FetchWindow,
    ) -> (Vec<Candle>, FetchWindow) {
        let interval = self.options.interval;
        let Some(meta) = self.cache.get_meta(symbol, interval) else {
            return (fresh, window);
        };
        let Ok(cached) = self.cache.load(symbol, interval) else {
            return (fresh, window);
        };

        let before = cached.len();
        let mut combined = fresh.clone();
        combined.extend(cached);
        let Ok(merged) = ingest(symbol, combined, 1).map(|r| r.candles) else {
            return (fresh, window);
        };
        let merged_window = window
            .union(&meta.window, interval.duration())
            .unwrap_or(window);
        debug!(
            symbol,
            cached = before,
            merged = merged.len(),
            "merged fetch into cache"
        );
        (merged, merged_window)
    }

    fn finish(
        &self,
        symbol: &str,
        candles: Vec<Candle>,
        window: FetchWindow,
        source: DataSource,
    ) -> Result<LoadedCandles, LoadError> {
        let in_window: Vec<Candle> = candles
            .into_iter()
            .filter(|c| window.contains(c.timestamp))
            .collect();
        let cleaned = ingest(symbol, in_window, self.options.min_candles)?;
        if cleaned.duplicates_dropped + cleaned.invalid_dropped > 0 {
            warn!(
                symbol,
                duplicates = cleaned.duplicates_dropped,
                invalid = cleaned.invalid_dropped,
                "dropped candles"
            );
        }
        Ok(LoadedCandles {
            symbol: symbol.to_string(),
            candles: cleaned.candles,
            source,
            duplicates_dropped: cleaned.duplicates_dropped,
            invalid_dropped: cleaned.invalid_dropped,
        })
    }
}
