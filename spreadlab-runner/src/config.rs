//! Backtest configuration: TOML file with `[data]`, `[strategy]`, `[fees]`
//! and `[output]` sections. Every field has a default, so an empty file (or
//! no file) is a valid configuration.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use spreadlab_core::data::FetchOptions;
use spreadlab_core::domain::CandleInterval;
use spreadlab_core::spread::DEFAULT_NOISE;
use spreadlab_core::{FeeBasis, FeeModel, SimulatorConfig};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {field} {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Complete, immutable configuration for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub data: DataConfig,
    pub strategy: StrategyConfig,
    pub fees: FeesConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Lookback window in days, ending now.
    pub days: u32,
    /// Upper bound on discovered symbols. Ignored when `symbols` is set.
    pub max_symbols: usize,
    pub interval: CandleInterval,
    /// Explicit symbols; empty means discover from the exchange.
    pub symbols: Vec<String>,
    pub cache_dir: PathBuf,
    pub offline: bool,
    pub force: bool,
    pub min_candles: usize,
    /// Cached windows ending this long before now still count as fresh.
    pub max_staleness_hours: u32,
    /// Pause between symbols that were downloaded.
    pub symbol_pause_ms: u64,
    /// Override for the exchange REST root.
    pub base_url: Option<String>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            days: 180,
            max_symbols: 20,
            interval: CandleInterval::M15,
            symbols: Vec::new(),
            cache_dir: PathBuf::from("data/cache"),
            offline: false,
            force: false,
            min_candles: 2,
            max_staleness_hours: 12,
            symbol_pause_ms: 2_000,
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub min_entry_spread_pct: f64,
    pub exit_spread_pct: f64,
    pub position_size: f64,
    pub leverage: f64,
    /// Half-width of the synthetic last-price noise, as a fraction.
    pub noise: f64,
    /// Master seed; `None` draws from entropy.
    pub seed: Option<u64>,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        let sim = SimulatorConfig::default();
        Self {
            min_entry_spread_pct: sim.min_entry_spread_pct,
            exit_spread_pct: sim.exit_spread_pct,
            position_size: sim.position_size,
            leverage: sim.leverage,
            noise: DEFAULT_NOISE,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeesConfig {
    pub rate_per_side: f64,
    pub basis: FeeBasis,
}

impl Default for FeesConfig {
    fn default() -> Self {
        let model = FeeModel::default();
        Self {
            rate_per_side: model.rate_per_side,
            basis: model.basis,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub trades_csv: PathBuf,
    pub report: PathBuf,
    pub log_file: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            trades_csv: PathBuf::from("backtest_trades.csv"),
            report: PathBuf::from("backtest_report.md"),
            log_file: PathBuf::from("backtest.log"),
        }
    }
}

impl BacktestConfig {
    /// Load and validate a configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::parse_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a config file without validating it. Callers that apply
    /// overrides on top must call [`validate`](Self::validate) afterwards.
    pub fn parse_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Parse and validate a configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, reason: &str| {
            Err(ConfigError::Invalid {
                field,
                reason: reason.to_string(),
            })
        };
        let s = &self.strategy;

        if self.data.days == 0 {
            return invalid("data.days", "must be at least 1");
        }
        if self.data.max_symbols == 0 && self.data.symbols.is_empty() {
            return invalid("data.max_symbols", "must be at least 1");
        }
        if self.data.min_candles < 2 {
            return invalid("data.min_candles", "must be at least 2");
        }
        if !(s.min_entry_spread_pct.is_finite() && s.min_entry_spread_pct > 0.0) {
            return invalid("strategy.min_entry_spread_pct", "must be positive");
        }
        if !(s.exit_spread_pct.is_finite() && s.exit_spread_pct >= 0.0) {
            return invalid("strategy.exit_spread_pct", "must be non-negative");
        }
        if s.exit_spread_pct >= s.min_entry_spread_pct {
            return invalid(
                "strategy.exit_spread_pct",
                "must be below strategy.min_entry_spread_pct",
            );
        }
        if !(s.position_size.is_finite() && s.position_size > 0.0) {
            return invalid("strategy.position_size", "must be positive");
        }
        if !(s.leverage.is_finite() && s.leverage > 0.0) {
            return invalid("strategy.leverage", "must be positive");
        }
        if !(s.noise.is_finite() && (0.0..1.0).contains(&s.noise)) {
            return invalid("strategy.noise", "must be in [0, 1)");
        }
        if !(self.fees.rate_per_side.is_finite() && (0.0..1.0).contains(&self.fees.rate_per_side))
        {
            return invalid("fees.rate_per_side", "must be in [0, 1)");
        }
        Ok(())
    }

    pub fn fee_model(&self) -> FeeModel {
        FeeModel::new(self.fees.rate_per_side, self.fees.basis)
    }

    pub fn simulator_config(&self) -> SimulatorConfig {
        SimulatorConfig {
            min_entry_spread_pct: self.strategy.min_entry_spread_pct,
            exit_spread_pct: self.strategy.exit_spread_pct,
            position_size: self.strategy.position_size,
            leverage: self.strategy.leverage,
            fees: self.fee_model(),
        }
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            interval: self.data.interval,
            offline: self.data.offline,
            force: self.data.force,
            min_candles: self.data.min_candles,
            max_staleness: Duration::hours(i64::from(self.data.max_staleness_hours)),
        }
    }

    pub fn symbol_pause(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.data.symbol_pause_ms)
    }
}
