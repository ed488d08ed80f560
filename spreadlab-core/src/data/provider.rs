//! Candle provider trait and structured fetch errors.
//!
//! The CandleProvider trait abstracts over the remote source so the cache and
//! fetcher can be exercised against a fake in tests.

use crate::domain::{Candle, CandleInterval};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors fetching candles for a symbol. Recoverable per symbol: the run skips
/// the symbol and carries on.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by exchange (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("contract not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("HTTP {status} for {symbol}")]
    Http { status: u16, symbol: String },

    #[error("cache error: {0}")]
    Cache(String),

    #[error("no cached data for '{symbol}' and offline mode is on")]
    NoCachedData { symbol: String },

    #[error("no candles returned for '{symbol}' in the requested window")]
    Empty { symbol: String },
}

/// Inclusive time range of candles to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl FetchWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The `days` leading up to `now`.
    pub fn lookback(days: u32, now: DateTime<Utc>) -> Self {
        Self {
            start: now - Duration::days(i64::from(days)),
            end: now,
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }

    /// Smallest window spanning both, if they overlap or are at most `gap` apart.
    pub fn union(&self, other: &FetchWindow, gap: Duration) -> Option<FetchWindow> {
        if self.start > other.end + gap || other.start > self.end + gap {
            return None;
        }
        Some(Self {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        })
    }
}

/// Result of a successful fetch for a single symbol.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub symbol: String,
    pub candles: Vec<Candle>,
    pub source: DataSource,
}

/// Where the candles came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataSource {
    GateIo,
    Cache,
}

/// Remote source of futures candles.
pub trait CandleProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Tradable contracts, in the exchange's listing order.
    fn list_contracts(&self) -> Result<Vec<String>, FetchError>;

    /// Fetch candles for a symbol over a window, ascending by timestamp.
    fn fetch(
        &self,
        symbol: &str,
        interval: CandleInterval,
        window: FetchWindow,
    ) -> Result<FetchResult, FetchError>;
}
