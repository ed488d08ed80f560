//! Candle ingest: sort, de-duplicate, drop invalid rows, check there is enough left.

use crate::domain::Candle;
use thiserror::Error;

/// The series cannot be simulated. The symbol is skipped.
#[derive(Debug, Error, PartialEq)]
pub enum DataQualityError {
    #[error("{symbol}: only {found} usable candles, need at least {required}")]
    InsufficientCandles {
        symbol: String,
        found: usize,
        required: usize,
    },
}

/// Clean candle series plus what was removed.
#[derive(Debug, Clone)]
pub struct IngestResult {
    pub candles: Vec<Candle>,
    pub duplicates_dropped: usize,
    pub invalid_dropped: usize,
}

/// Sort ascending by timestamp, keep the first candle per timestamp, drop
/// rows failing the OHLC sanity check, and require `min_candles` survivors.
pub fn ingest(
    symbol: &str,
    mut candles: Vec<Candle>,
    min_candles: usize,
) -> Result<IngestResult, DataQualityError> {
    candles.sort_by_key(|c| c.timestamp);

    let before = candles.len();
    candles.dedup_by_key(|c| c.timestamp);
    let duplicates_dropped = before - candles.len();

    let before = candles.len();
    candles.retain(Candle::is_sane);
    let invalid_dropped = before - candles.len();

    if candles.len() < min_candles {
        return Err(DataQualityError::InsufficientCandles {
            symbol: symbol.to_string(),
            found: candles.len(),
            required: min_candles,
        });
    }

    Ok(IngestResult {
        candles,
        duplicates_dropped,
        invalid_dropped,
    })
}
