//! SpreadLab Core: domain types, candle data layer, spread synthesis, fees, and
//! the per-symbol position simulator.
//!
//! - Domain types (candles, positions, trade records)
//! - Gate.io candle provider, Parquet cache, ingest cleaning
//! - Pluggable spread sources with reproducible per-symbol seeding
//! - Flat → Open → Flat simulator with end-of-data force close

pub mod data;
pub mod domain;
pub mod fees;
pub mod rng;
pub mod simulator;
pub mod spread;

pub use fees::{FeeBasis, FeeModel};
pub use simulator::{simulate_symbol, SimulatorConfig, SymbolSimulation};
pub use spread::{RandomSpread, ScriptedSpread, SpreadSource, SyntheticSpread};
