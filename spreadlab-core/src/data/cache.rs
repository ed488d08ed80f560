//! Parquet candle cache with Hive-style partitioning.
//!
//! Layout: `{cache_dir}/symbol={SYMBOL}/{interval}.parquet` plus a
//! `{interval}.meta.json` sidecar.
//!
//! - Atomic writes (write to .tmp, rename into place)
//! - Integrity validation on load (schema check, row count > 0)
//! - Quarantine for corrupt files (`{interval}.parquet.quarantined`)
//! - Metadata sidecar with a BLAKE3 hash of the cached candles

use super::provider::{DataSource, FetchError, FetchWindow};
use crate::domain::{Candle, CandleInterval};
use chrono::{DateTime, Duration, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const COLUMNS: [&str; 6] = ["timestamp", "open", "high", "low", "close", "volume"];

/// Metadata sidecar for one cached symbol/interval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMeta {
    pub symbol: String,
    pub interval: CandleInterval,
    /// First and last candle actually stored.
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Window that was requested when the data was downloaded.
    pub window: FetchWindow,
    pub candle_count: usize,
    pub data_hash: String,
    pub source: DataSource,
    pub cached_at: DateTime<Utc>,
}

/// One row of `cache status`.
#[derive(Debug, Clone, Serialize)]
pub struct CacheEntry {
    pub meta: CacheMeta,
    pub file_size: u64,
}

/// How well the cache covers a requested window.
#[derive(Debug, Clone, PartialEq)]
pub enum CoverageResult {
    NotCached,
    FullyCovered,
    PartiallyCovered {
        cached_start: DateTime<Utc>,
        cached_end: DateTime<Utc>,
    },
}

pub struct CandleCache {
    cache_dir: PathBuf,
}

impl CandleCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn symbol_dir(&self, symbol: &str) -> PathBuf {
        self.cache_dir.join(format!("symbol={symbol}"))
    }

    fn data_path(&self, symbol: &str, interval: CandleInterval) -> PathBuf {
        self.symbol_dir(symbol).join(format!("{interval}.parquet"))
    }

    fn meta_path(&self, symbol: &str, interval: CandleInterval) -> PathBuf {
        self.symbol_dir(symbol).join(format!("{interval}.meta.json"))
    }

    /// Replace the cached candles for `symbol`/`interval`.
    ///
    /// `candles` must be sorted ascending; `window` is the range that was
    /// requested from the provider.
    pub fn write(
        &self,
        symbol: &str,
        interval: CandleInterval,
        window: FetchWindow,
        candles: &[Candle],
        source: DataSource,
    ) -> Result<CacheMeta, FetchError> {
        let (Some(first), Some(last)) = (candles.first(), candles.last()) else {
            return Err(FetchError::Cache("no candles to cache".into()));
        };

        let sym_dir = self.symbol_dir(symbol);
        fs::create_dir_all(&sym_dir)
            .map_err(|e| FetchError::Cache(format!("failed to create dir: {e}")))?;

        let mut df = candles_to_dataframe(candles)?;
        let path = self.data_path(symbol, interval);
        let tmp_path = path.with_extension("parquet.tmp");
        write_parquet(&mut df, &tmp_path)?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            FetchError::Cache(format!("atomic rename failed: {e}"))
        })?;

        let meta = CacheMeta {
            symbol: symbol.to_string(),
            interval,
            start: first.timestamp,
            end: last.timestamp,
            window,
            candle_count: candles.len(),
            data_hash: hash_candles(candles)?,
            source,
            cached_at: Utc::now(),
        };
        let meta_json = serde_json::to_string_pretty(&meta)
            .map_err(|e| FetchError::Cache(format!("meta serialization: {e}")))?;
        let meta_path = self.meta_path(symbol, interval);
        let meta_tmp = meta_path.with_extension("json.tmp");
        fs::write(&meta_tmp, meta_json)
            .and_then(|_| fs::rename(&meta_tmp, &meta_path))
            .map_err(|e| FetchError::Cache(format!("meta write: {e}")))?;

        debug!(symbol, %interval, count = candles.len(), "cached candles");
        Ok(meta)
    }

    /// Load all cached candles for a symbol/interval, ascending.
    ///
    /// A file that fails validation is renamed to `.quarantined` and treated
    /// as absent.
    pub fn load(&self, symbol: &str, interval: CandleInterval) -> Result<Vec<Candle>, FetchError> {
        let path = self.data_path(symbol, interval);
        if !path.exists() {
            return Err(FetchError::NoCachedData {
                symbol: symbol.to_string(),
            });
        }

        match load_and_validate_parquet(&path, symbol) {
            Ok(mut candles) => {
                candles.sort_by_key(|c| c.timestamp);
                Ok(candles)
            }
            Err(e) => {
                let quarantine = path.with_extension("parquet.quarantined");
                warn!("quarantining corrupt cache file {}: {e}", path.display());
                let _ = fs::rename(&path, &quarantine);
                let _ = fs::remove_file(self.meta_path(symbol, interval));
                Err(FetchError::NoCachedData {
                    symbol: symbol.to_string(),
                })
            }
        }
    }

    pub fn get_meta(&self, symbol: &str, interval: CandleInterval) -> Option<CacheMeta> {
        let content = fs::read_to_string(self.meta_path(symbol, interval)).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Whether the window originally downloaded covers `window`, allowing
    /// `tolerance` of slack at either end.
    pub fn covers_range(
        &self,
        symbol: &str,
        interval: CandleInterval,
        window: FetchWindow,
        tolerance: Duration,
    ) -> CoverageResult {
        let Some(meta) = self.get_meta(symbol, interval) else {
            return CoverageResult::NotCached;
        };
        if !self.data_path(symbol, interval).exists() {
            return CoverageResult::NotCached;
        }
        if meta.window.start <= window.start + tolerance && meta.window.end >= window.end - tolerance
        {
            CoverageResult::FullyCovered
        } else {
            CoverageResult::PartiallyCovered {
                cached_start: meta.start,
                cached_end: meta.end,
            }
        }
    }

    /// Every cached symbol/interval with readable metadata, sorted by symbol.
    pub fn list(&self) -> Vec<CacheEntry> {
        let Ok(dirs) = fs::read_dir(&self.cache_dir) else {
            return Vec::new();
        };

        let mut entries = Vec::new();
        for dir in dirs.flatten() {
            let name = dir.file_name();
            let Some(symbol) = name.to_str().and_then(|n| n.strip_prefix("symbol=")) else {
                continue;
            };
            let Ok(files) = fs::read_dir(dir.path()) else {
                continue;
            };
            for file in files.flatten() {
                let file_name = file.file_name();
                let Some(interval) = file_name
                    .to_str()
                    .and_then(|n| n.strip_suffix(".meta.json"))
                    .and_then(|n| n.parse::<CandleInterval>().ok())
                else {
                    continue;
                };
                if let Some(meta) = self.get_meta(symbol, interval) {
                    let file_size = fs::metadata(self.data_path(symbol, interval))
                        .map(|m| m.len())
                        .unwrap_or(0);
                    entries.push(CacheEntry { meta, file_size });
                }
            }
        }
        entries.sort_by(|a, b| {
            a.meta
                .symbol
                .cmp(&b.meta.symbol)
                .then(a.meta.interval.seconds().cmp(&b.meta.interval.seconds()))
        });
        entries
    }

    /// Cached symbols for one interval, sorted.
    pub fn symbols(&self, interval: CandleInterval) -> Vec<String> {
        self.list()
            .into_iter()
            .filter(|e| e.meta.interval == interval)
            .map(|e| e.meta.symbol)
            .collect()
    }
}

fn hash_candles(candles: &[Candle]) -> Result<String, FetchError> {
    let bytes = serde_json::to_vec(candles)
        .map_err(|e| FetchError::Cache(format!("hash serialization: {e}")))?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

fn candles_to_dataframe(candles: &[Candle]) -> Result<DataFrame, FetchError> {
    let timestamps: Vec<i64> = candles.iter().map(|c| c.timestamp.timestamp()).collect();
    let opens: Vec<f64> = candles.iter().map(|c| c.open).collect();
    let highs: Vec<f64> = candles.iter().map(|c| c.high).collect();
    let lows: Vec<f64> = candles.iter().map(|c| c.low).collect();
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();

    DataFrame::new(vec![
        Column::new("timestamp".into(), timestamps),
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("volume".into(), volumes),
    ])
    .map_err(|e| FetchError::Cache(format!("dataframe creation: {e}")))
}

fn write_parquet(df: &mut DataFrame, path: &Path) -> Result<(), FetchError> {
    let file =
        fs::File::create(path).map_err(|e| FetchError::Cache(format!("create file: {e}")))?;
    ParquetWriter::new(file)
        .finish(df)
        .map_err(|e| FetchError::Cache(format!("write parquet: {e}")))?;
    Ok(())
}

fn load_and_validate_parquet(path: &Path, symbol: &str) -> Result<Vec<Candle>, FetchError> {
    let file = fs::File::open(path).map_err(|e| FetchError::Cache(format!("open: {e}")))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| FetchError::Cache(format!("read: {e}")))?;

    if df.height() == 0 {
        return Err(FetchError::Cache("empty parquet file".into()));
    }
    for col_name in COLUMNS {
        if df.column(col_name).is_err() {
            return Err(FetchError::Cache(format!("missing column '{col_name}'")));
        }
    }

    dataframe_to_candles(&df, symbol)
}

fn dataframe_to_candles(df: &DataFrame, symbol: &str) -> Result<Vec<Candle>, FetchError> {
    let column_err = |name: &str, e: PolarsError| FetchError::Cache(format!("{name} column: {e}"));
    let f64_column = |name: &str| {
        df.column(name)
            .and_then(|c| c.f64().cloned())
            .map_err(|e| column_err(name, e))
    };

    let ts_ca = df
        .column("timestamp")
        .and_then(|c| c.i64().cloned())
        .map_err(|e| column_err("timestamp", e))?;
    let open_ca = f64_column("open")?;
    let high_ca = f64_column("high")?;
    let low_ca = f64_column("low")?;
    let close_ca = f64_column("close")?;
    let vol_ca = f64_column("volume")?;

    let mut candles = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let secs = ts_ca
            .get(i)
            .ok_or_else(|| FetchError::Cache(format!("null timestamp at row {i}")))?;
        let timestamp = DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| FetchError::Cache(format!("timestamp out of range at row {i}")))?;

        candles.push(Candle {
            symbol: symbol.to_string(),
            timestamp,
            open: open_ca.get(i).unwrap_or(f64::NAN),
            high: high_ca.get(i).unwrap_or(f64::NAN),
            low: low_ca.get(i).unwrap_or(f64::NAN),
            close: close_ca.get(i).unwrap_or(f64::NAN),
            volume: vol_ca.get(i).unwrap_or(0.0),
        });
    }

    Ok(candles)
}
