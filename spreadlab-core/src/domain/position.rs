//! Position — a simulated leveraged position between entry and exit.

use super::candle::Candle;
use super::trade::{ExitReason, TradeRecord};
use crate::fees::FeeModel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// +1 for long, −1 for short.
    pub fn sign(&self) -> f64 {
        match self {
            Self::Long => 1.0,
            Self::Short => -1.0,
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long => f.write_str("LONG"),
            Self::Short => f.write_str("SHORT"),
        }
    }
}

/// A position that has been opened and not yet closed.
///
/// Closing consumes the value, so a position can only ever be closed once.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenPosition {
    pub symbol: String,
    pub side: PositionSide,
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub entry_spread: f64,
    pub leverage: f64,
    /// Margin committed, in quote currency.
    pub size: f64,
}

impl OpenPosition {
    /// Leveraged return on margin at `price`, before fees.
    pub fn gross_pnl_at(&self, price: f64) -> f64 {
        if self.entry_price <= 0.0 {
            return 0.0;
        }
        self.side.sign() * (price - self.entry_price) / self.entry_price * self.leverage * self.size
    }

    /// Close the position on `candle` at its close price.
    pub fn close(
        self,
        candle: &Candle,
        exit_spread: f64,
        reason: ExitReason,
        fees: &FeeModel,
    ) -> TradeRecord {
        let exit_price = candle.close;
        let gross_pnl = self.gross_pnl_at(exit_price);
        let fee_total = fees.round_trip(self.size, self.leverage, self.entry_price, exit_price);

        TradeRecord {
            symbol: self.symbol,
            side: self.side,
            entry_time: self.entry_time,
            exit_time: candle.timestamp,
            entry_price: self.entry_price,
            exit_price,
            leverage: self.leverage,
            size: self.size,
            entry_spread: self.entry_spread,
            exit_spread,
            gross_pnl,
            fees: fee_total,
            pnl: gross_pnl - fee_total,
            exit_reason: reason,
        }
    }
}
