//! Candle acquisition: exchange provider, Parquet cache, cleaning, resolution.

pub mod cache;
pub mod download;
pub mod fetcher;
pub mod gateio;
pub mod ingest;
pub mod provider;

pub use cache::{CacheEntry, CacheMeta, CandleCache, CoverageResult};
pub use download::{download_symbols, DownloadProgress, DownloadSummary, LogProgress};
pub use fetcher::{DataFetcher, FetchOptions, LoadError, LoadedCandles};
pub use gateio::GateIoProvider;
pub use ingest::{ingest, DataQualityError, IngestResult};
pub use provider::{CandleProvider, DataSource, FetchError, FetchResult, FetchWindow};
