//! Domain types: candles, positions, trades.

pub mod candle;
pub mod position;
pub mod trade;

pub use candle::{Candle, CandleInterval};
pub use position::{OpenPosition, PositionSide};
pub use trade::{ExitReason, TradeRecord};
