//! Data layer integration: provider → cache → offline reload → simulation.

use chrono::{Duration, TimeZone, Utc};
use spreadlab_core::data::{
    download_symbols, CandleCache, CandleProvider, DataFetcher, DataSource, FetchError,
    FetchOptions, FetchResult, FetchWindow, LoadError, LogProgress,
};
use spreadlab_core::domain::{Candle, CandleInterval};
use spreadlab_core::spread::ScriptedSpread;
use spreadlab_core::{simulate_symbol, SimulatorConfig};

/// Serves a deterministic price path; unknown symbols are not found.
struct FixtureProvider;

impl CandleProvider for FixtureProvider {
    fn name(&self) -> &str {
        "fixture"
    }

    fn list_contracts(&self) -> Result<Vec<String>, FetchError> {
        Ok(vec!["BTC_USDT".into(), "ETH_USDT".into()])
    }

    fn fetch(
        &self,
        symbol: &str,
        interval: CandleInterval,
        window: FetchWindow,
    ) -> Result<FetchResult, FetchError> {
        if !symbol.ends_with("_USDT") {
            return Err(FetchError::SymbolNotFound {
                symbol: symbol.into(),
            });
        }
        let mut candles = Vec::new();
        let mut ts = window.start;
        let mut i = 0.0;
        while ts <= window.end {
            let close = 50.0 + i;
            candles.push(Candle {
                symbol: symbol.into(),
                timestamp: ts,
                open: close,
                high: close + 0.5,
                low: close - 0.5,
                close,
                volume: 10.0,
            });
            ts += interval.duration();
            i += 0.25;
        }
        candles.reverse();
        Ok(FetchResult {
            symbol: symbol.into(),
            candles,
            source: DataSource::GateIo,
        })
    }
}

fn window() -> FetchWindow {
    FetchWindow::lookback(2, Utc.with_ymd_and_hms(2024, 8, 3, 0, 0, 0).unwrap())
}

#[test]
fn downloaded_candles_reload_offline_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let cache = CandleCache::new(dir.path());
    let provider = FixtureProvider;
    let online = DataFetcher::new(Some(&provider), &cache, FetchOptions::default());

    let symbols = vec!["BTC_USDT".to_string(), "BOGUS".into()];
    let summary = download_symbols(
        &online,
        &symbols,
        window(),
        std::time::Duration::ZERO,
        &LogProgress,
    );
    assert_eq!(summary.succeeded, 1);
    assert!(matches!(
        summary.errors[0].1,
        LoadError::Fetch(FetchError::SymbolNotFound { .. })
    ));

    let offline = DataFetcher::new(
        None,
        &cache,
        FetchOptions {
            offline: true,
            ..FetchOptions::default()
        },
    );
    let loaded = offline.fetch_candles("BTC_USDT", window()).unwrap();
    assert_eq!(loaded.source, DataSource::Cache);
    assert_eq!(loaded.candles.len(), 2 * 96 + 1);
    assert!(loaded
        .candles
        .windows(2)
        .all(|w| w[1].timestamp - w[0].timestamp == Duration::minutes(15)));

    let mut spreads = ScriptedSpread::new([7.0, 1.0, 0.2]);
    let sim = simulate_symbol(
        "BTC_USDT",
        &loaded.candles,
        &SimulatorConfig::default(),
        &mut spreads,
    );
    assert_eq!(sim.trades.len(), 1);
    assert_eq!(sim.trades[0].entry_price, 50.0);
    assert_eq!(sim.trades[0].exit_price, 50.5);
}

#[test]
fn cache_listing_reports_downloaded_symbols() {
    let dir = tempfile::tempdir().unwrap();
    let cache = CandleCache::new(dir.path());
    let provider = FixtureProvider;
    let fetcher = DataFetcher::new(Some(&provider), &cache, FetchOptions::default());

    for symbol in provider.list_contracts().unwrap() {
        fetcher.fetch_candles(&symbol, window()).unwrap();
    }

    let entries = cache.list();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].meta.symbol, "ETH_USDT");
    assert_eq!(entries[1].meta.candle_count, 193);
    assert_eq!(entries[1].meta.source, DataSource::GateIo);
}
