//! Gate.io USDT-settled futures candle provider.
//!
//! Pages through `/futures/{settle}/candlesticks` in windows of at most
//! `batch_limit` candles, retrying transient failures with exponential
//! backoff. The endpoint rejects `limit` combined with `from`/`to`, so paging
//! is done purely by time range.

use super::provider::{CandleProvider, DataSource, FetchError, FetchResult, FetchWindow};
use crate::domain::{Candle, CandleInterval};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.gateio.ws/api/v4";

/// Candlestick entry as returned by the API. Prices arrive as decimal strings.
#[derive(Debug, Deserialize)]
struct ApiCandle {
    t: i64,
    #[serde(default)]
    v: Option<f64>,
    c: String,
    h: String,
    l: String,
    o: String,
}

#[derive(Debug, Deserialize)]
struct ApiContract {
    name: String,
    #[serde(default)]
    in_delisting: bool,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    label: String,
    #[serde(default)]
    message: String,
}

/// Pause after every `every` requests.
#[derive(Debug, Clone, Copy)]
struct Throttle {
    every: u64,
    pause: Duration,
}

impl Default for Throttle {
    fn default() -> Self {
        Self {
            every: 5,
            pause: Duration::from_millis(500),
        }
    }
}

pub struct GateIoProvider {
    client: reqwest::blocking::Client,
    base_url: String,
    settle: String,
    max_retries: u32,
    base_delay: Duration,
    batch_limit: i64,
    throttle: Throttle,
    request_count: AtomicU64,
}

impl GateIoProvider {
    pub fn new() -> Result<Self, FetchError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("spreadlab/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                FetchError::NetworkUnreachable(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            settle: "usdt".into(),
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            batch_limit: 1000,
            throttle: Throttle::default(),
            request_count: AtomicU64::new(0),
        })
    }

    fn contracts_url(&self) -> String {
        format!("{}/futures/{}/contracts", self.base_url, self.settle)
    }

    fn candles_url(&self) -> String {
        format!("{}/futures/{}/candlesticks", self.base_url, self.settle)
    }

    /// Split a window into request-sized `(from, to)` second ranges.
    fn batches(&self, interval: CandleInterval, window: FetchWindow) -> Vec<(i64, i64)> {
        let span = self.batch_limit * interval.seconds();
        let end = window.end.timestamp();
        let mut from = window.start.timestamp();
        let mut out = Vec::new();
        while from < end {
            let to = (from + span).min(end);
            out.push((from, to));
            from = to;
        }
        out
    }

    fn throttle(&self) {
        let n = self.request_count.fetch_add(1, Ordering::Relaxed) + 1;
        if self.throttle.every > 0 && n % self.throttle.every == 0 {
            std::thread::sleep(self.throttle.pause);
        }
    }

    /// GET with retry. Returns the response body on success.
    fn get_with_retry(
        &self,
        url: &str,
        query: &[(&str, String)],
        symbol: &str,
    ) -> Result<String, FetchError> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self
                    .base_delay
                    .saturating_mul(2u32.saturating_pow(attempt - 1));
                std::thread::sleep(delay);
            }
            self.throttle();

            match self.client.get(url).query(query).send() {
                Ok(resp) => {
                    let status = resp.status();

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        let retry_after = resp
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse::<u64>().ok())
                            .unwrap_or(1);
                        warn!(symbol, retry_after, "rate limited");
                        std::thread::sleep(Duration::from_secs(retry_after));
                        last_error = Some(FetchError::RateLimited {
                            retry_after_secs: retry_after,
                        });
                        continue;
                    }

                    if status.is_server_error() {
                        last_error = Some(FetchError::Http {
                            status: status.as_u16(),
                            symbol: symbol.to_string(),
                        });
                        continue;
                    }

                    let body = resp
                        .text()
                        .map_err(|e| FetchError::NetworkUnreachable(e.to_string()))?;

                    if status.is_client_error() {
                        return Err(classify_client_error(status.as_u16(), symbol, &body));
                    }

                    return Ok(body);
                }
                Err(e) => {
                    if e.is_connect() || e.is_timeout() {
                        last_error = Some(FetchError::NetworkUnreachable(e.to_string()));
                        continue;
                    }
                    return Err(FetchError::NetworkUnreachable(e.to_string()));
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| FetchError::NetworkUnreachable("max retries exceeded".into())))
    }
}

impl CandleProvider for GateIoProvider {
    fn name(&self) -> &str {
        "gateio_futures"
    }

    fn list_contracts(&self) -> Result<Vec<String>, FetchError> {
        let body = self.get_with_retry(&self.contracts_url(), &[], "contracts")?;
        let symbols = parse_contracts(&body)?;
        debug!(count = symbols.len(), "active contracts");
        Ok(symbols)
    }

    fn fetch(
        &self,
        symbol: &str,
        interval: CandleInterval,
        window: FetchWindow,
    ) -> Result<FetchResult, FetchError> {
        let batches = self.batches(interval, window);
        let total = batches.len();
        let mut candles = Vec::new();

        for (i, (from, to)) in batches.into_iter().enumerate() {
            let query = [
                ("contract", symbol.to_string()),
                ("interval", interval.as_str().to_string()),
                ("from", from.to_string()),
                ("to", to.to_string()),
            ];
            let body = self.get_with_retry(&self.candles_url(), &query, symbol)?;
            let batch = parse_candles(symbol, &body)?;
            debug!(
                symbol,
                batch = i + 1,
                of = total,
                candles = batch.len(),
                "downloaded batch"
            );
            candles.extend(batch);
        }

        if candles.is_empty() {
            return Err(FetchError::Empty {
                symbol: symbol.to_string(),
            });
        }
        candles.sort_by_key(|c| c.timestamp);

        Ok(FetchResult {
            symbol: symbol.to_string(),
            candles,
            source: DataSource::GateIo,
        })
    }
}

fn classify_client_error(status: u16, symbol: &str, body: &str) -> FetchError {
    if let Ok(err) = serde_json::from_str::<ApiError>(body) {
        if err.label.contains("CONTRACT_NOT_FOUND") || err.label == "INVALID_CONTRACT" {
            return FetchError::SymbolNotFound {
                symbol: symbol.to_string(),
            };
        }
        debug!(symbol, label = %err.label, message = %err.message, "client error");
    }
    if status == 404 {
        return FetchError::SymbolNotFound {
            symbol: symbol.to_string(),
        };
    }
    FetchError::Http {
        status,
        symbol: symbol.to_string(),
    }
}

/// Parse the contracts listing, keeping contracts that are not being delisted.
fn parse_contracts(body: &str) -> Result<Vec<String>, FetchError> {
    let contracts: Vec<ApiContract> = serde_json::from_str(body)
        .map_err(|e| FetchError::MalformedResponse(format!("contracts: {e}")))?;
    Ok(contracts
        .into_iter()
        .filter(|c| !c.in_delisting)
        .map(|c| c.name)
        .collect())
}

/// Parse a candlestick response body into candles.
fn parse_candles(symbol: &str, body: &str) -> Result<Vec<Candle>, FetchError> {
    let raw: Vec<ApiCandle> = serde_json::from_str(body)
        .map_err(|e| FetchError::MalformedResponse(format!("candles for {symbol}: {e}")))?;

    let price = |field: &str, value: &str, ts: i64| -> Result<f64, FetchError> {
        value.parse::<f64>().map_err(|_| {
            FetchError::MalformedResponse(format!("{symbol}: bad {field} '{value}' at t={ts}"))
        })
    };

    raw.into_iter()
        .map(|c| {
            let timestamp: DateTime<Utc> = DateTime::from_timestamp(c.t, 0).ok_or_else(|| {
                FetchError::MalformedResponse(format!("{symbol}: invalid timestamp {}", c.t))
            })?;
            Ok(Candle {
                symbol: symbol.to_string(),
                timestamp,
                open: price("open", &c.o, c.t)?,
                high: price("high", &c.h, c.t)?,
                low: price("low", &c.l, c.t)?,
                close: price("close", &c.c, c.t)?,
                volume: c.v.unwrap_or(0.0),
            })
        })
        .collect()
}
