//! Fee model — exchange fees charged on each leg of a simulated trade.
//!
//! Fees are a fixed rate per side applied to a configurable basis. The default
//! charges the taker rate on leveraged notional at entry, and on the notional
//! revalued at the exit price on exit.

use serde::{Deserialize, Serialize};

/// Default per-side taker fee (0.05%).
pub const DEFAULT_TAKER_RATE: f64 = 0.0005;

/// What the per-side fee rate is applied to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeBasis {
    /// `size × leverage` (full position value).
    #[default]
    Notional,
    /// `size` (posted margin only).
    Margin,
}

/// Per-side fee model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeeModel {
    /// Fee rate per side as a fraction (0.0005 = 0.05%).
    pub rate_per_side: f64,
    pub basis: FeeBasis,
}

impl Default for FeeModel {
    fn default() -> Self {
        Self {
            rate_per_side: DEFAULT_TAKER_RATE,
            basis: FeeBasis::Notional,
        }
    }
}

impl FeeModel {
    pub fn new(rate_per_side: f64, basis: FeeBasis) -> Self {
        Self {
            rate_per_side,
            basis,
        }
    }

    pub fn free() -> Self {
        Self::new(0.0, FeeBasis::Notional)
    }

    /// Amount the rate is charged on at entry.
    fn entry_basis(&self, size: f64, leverage: f64) -> f64 {
        match self.basis {
            FeeBasis::Notional => size * leverage,
            FeeBasis::Margin => size,
        }
    }

    /// Fee paid when opening a position.
    pub fn entry_fee(&self, size: f64, leverage: f64) -> f64 {
        self.entry_basis(size, leverage) * self.rate_per_side
    }

    /// Fee paid when closing: the entry basis revalued at the exit price.
    pub fn exit_fee(&self, size: f64, leverage: f64, entry_price: f64, exit_price: f64) -> f64 {
        if entry_price <= 0.0 {
            return 0.0;
        }
        (self.entry_basis(size, leverage) * exit_price / entry_price).abs() * self.rate_per_side
    }

    /// Entry plus exit fee.
    pub fn round_trip(&self, size: f64, leverage: f64, entry_price: f64, exit_price: f64) -> f64 {
        self.entry_fee(size, leverage) + self.exit_fee(size, leverage, entry_price, exit_price)
    }
}
