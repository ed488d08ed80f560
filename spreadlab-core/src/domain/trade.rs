//! TradeRecord — a closed position, flattened for the output table.

use super::position::PositionSide;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// Spread decayed to or below the exit threshold.
    SpreadExit,
    /// Force-closed at the final candle of the data window.
    #[serde(rename = "end-of-data exit")]
    EndOfData,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SpreadExit => f.write_str("spread_exit"),
            Self::EndOfData => f.write_str("end-of-data exit"),
        }
    }
}

/// A complete round-trip trade: entry → exit.
///
/// Field order is the column order of the trades CSV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub symbol: String,
    pub side: PositionSide,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub entry_price: f64,
    pub exit_price: f64,
    pub leverage: f64,
    pub size: f64,
    /// Spread (%) that triggered the entry.
    pub entry_spread: f64,
    /// Spread (%) in the position's direction at exit.
    pub exit_spread: f64,
    pub gross_pnl: f64,
    pub fees: f64,
    /// Net P&L after fees.
    pub pnl: f64,
    pub exit_reason: ExitReason,
}

impl TradeRecord {
    pub fn is_winner(&self) -> bool {
        self.pnl > 0.0
    }

    /// Holding time in minutes.
    pub fn hold_minutes(&self) -> f64 {
        (self.exit_time - self.entry_time).num_seconds() as f64 / 60.0
    }
}
