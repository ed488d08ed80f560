//! Position simulator — the per-symbol Flat → Open → Flat state machine.
//!
//! One spread observation is drawn per candle, in candle order:
//!
//! - **Flat**: open when the spread is at least `min_entry_spread_pct`, has a
//!   direction, and at least one later candle exists. Entry price is the
//!   candle close; side follows the spread direction.
//! - **Open**: close when the spread measured in the position's direction is
//!   at most `exit_spread_pct`. Exit price is the candle close. No entry check
//!   happens on a bar that starts with a position open.
//! - After the last candle, a still-open position is force-closed at the final
//!   close with [`ExitReason::EndOfData`].
//!
//! The simulator is pure apart from the injected [`SpreadSource`]; it never
//! touches the network, the cache, or other symbols.

use crate::domain::{Candle, ExitReason, OpenPosition, TradeRecord};
use crate::fees::FeeModel;
use crate::spread::{SpreadSource, SyntheticSpread};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Immutable strategy parameters for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Spread (%) at or above which a position is opened.
    pub min_entry_spread_pct: f64,
    /// Spread (%) at or below which an open position is closed.
    pub exit_spread_pct: f64,
    /// Margin per position, in quote currency.
    pub position_size: f64,
    pub leverage: f64,
    pub fees: FeeModel,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            min_entry_spread_pct: 7.0,
            exit_spread_pct: 0.2,
            position_size: 10.0,
            leverage: 20.0,
            fees: FeeModel::default(),
        }
    }
}

/// State of a single symbol's simulation.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PositionState {
    #[default]
    Flat,
    Open(OpenPosition),
}

/// Result of simulating one symbol.
#[derive(Debug, Clone)]
pub struct SymbolSimulation {
    pub symbol: String,
    pub candles_processed: usize,
    /// Highest spread observed over the window (%).
    pub max_spread: f64,
    pub trades: Vec<TradeRecord>,
}

impl SymbolSimulation {
    pub fn total_pnl(&self) -> f64 {
        self.trades.iter().map(|t| t.pnl).sum()
    }

    pub fn winners(&self) -> usize {
        self.trades.iter().filter(|t| t.is_winner()).count()
    }
}

/// Walk `candles` (ascending by timestamp) and collect closed trades.
pub fn simulate_symbol(
    symbol: &str,
    candles: &[Candle],
    config: &SimulatorConfig,
    spreads: &mut dyn SpreadSource,
) -> SymbolSimulation {
    let mut state = PositionState::Flat;
    let mut trades = Vec::new();
    let mut max_spread = 0.0_f64;
    let mut last_spread: Option<SyntheticSpread> = None;

    for (i, candle) in candles.iter().enumerate() {
        let spread = spreads.sample(candle);
        max_spread = max_spread.max(spread.spread_percent);
        last_spread = Some(spread);

        state = match state {
            PositionState::Flat => try_open(symbol, i, candles.len(), candle, &spread, config),
            PositionState::Open(position) => {
                let current = spread.in_direction(position.side);
                if current <= config.exit_spread_pct {
                    let trade =
                        position.close(candle, current, ExitReason::SpreadExit, &config.fees);
                    debug!(
                        symbol,
                        exit_price = trade.exit_price,
                        pnl = trade.pnl,
                        hold_min = trade.hold_minutes(),
                        "exit on spread"
                    );
                    trades.push(trade);
                    PositionState::Flat
                } else {
                    PositionState::Open(position)
                }
            }
        };
    }

    if let (PositionState::Open(position), Some(last)) = (state, candles.last()) {
        let exit_spread = last_spread
            .map(|s| s.in_direction(position.side))
            .unwrap_or(0.0);
        let trade = position.close(last, exit_spread, ExitReason::EndOfData, &config.fees);
        debug!(symbol, exit_price = trade.exit_price, pnl = trade.pnl, "end-of-data exit");
        trades.push(trade);
    }

    SymbolSimulation {
        symbol: symbol.to_string(),
        candles_processed: candles.len(),
        max_spread,
        trades,
    }
}

fn try_open(
    symbol: &str,
    index: usize,
    candle_count: usize,
    candle: &Candle,
    spread: &SyntheticSpread,
    config: &SimulatorConfig,
) -> PositionState {
    // A position opened on the final candle could never exit after its entry.
    if index + 1 >= candle_count || spread.spread_percent < config.min_entry_spread_pct {
        return PositionState::Flat;
    }
    let Some(side) = spread.direction.side() else {
        return PositionState::Flat;
    };

    debug!(
        symbol,
        ?side,
        entry_price = candle.close,
        spread = spread.spread_percent,
        "enter"
    );
    PositionState::Open(OpenPosition {
        symbol: symbol.to_string(),
        side,
        entry_time: candle.timestamp,
        entry_price: candle.close,
        entry_spread: spread.spread_percent,
        leverage: config.leverage,
        size: config.position_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PositionSide;
    use crate::spread::{ScriptedSpread, SpreadDirection};
    use chrono::{Duration, TimeZone, Utc};

    fn candles(closes: &[f64]) -> Vec<Candle> {
        let base = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                symbol: "DOGE_USDT".into(),
                timestamp: base + Duration::minutes(15 * i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 100.0,
            })
            .collect()
    }

    fn frictionless() -> SimulatorConfig {
        SimulatorConfig {
            fees: FeeModel::free(),
            ..SimulatorConfig::default()
        }
    }

    #[test]
    fn opens_on_first_cross_and_closes_on_decay() {
        let bars = candles(&[1.0, 1.1, 1.2, 1.3]);
        let mut spreads = ScriptedSpread::new([8.0, 8.0, 3.0, 0.1]);
        let sim = simulate_symbol("DOGE_USDT", &bars, &SimulatorConfig::default(), &mut spreads);

        assert_eq!(sim.trades.len(), 1);
        let t = &sim.trades[0];
        assert_eq!(t.entry_time, bars[0].timestamp);
        assert_eq!(t.exit_time, bars[3].timestamp);
        assert_eq!(t.entry_price, 1.0);
        assert_eq!(t.exit_price, 1.3);
        assert_eq!(t.exit_reason, ExitReason::SpreadExit);
        assert_eq!(t.entry_spread, 8.0);
        assert!((t.exit_spread - 0.1).abs() < 1e-12);
    }

    #[test]
    fn below_threshold_never_trades() {
        let bars = candles(&[1.0; 50]);
        let mut spreads = ScriptedSpread::new(vec![6.99; 50]);
        let sim = simulate_symbol("DOGE_USDT", &bars, &SimulatorConfig::default(), &mut spreads);
        assert!(sim.trades.is_empty());
        assert_eq!(sim.candles_processed, 50);
    }

    #[test]
    fn entry_threshold_is_inclusive() {
        let bars = candles(&[1.0, 1.0, 1.0]);
        let mut spreads = ScriptedSpread::new([7.0, 0.2, 0.0]);
        let sim = simulate_symbol("DOGE_USDT", &bars, &frictionless(), &mut spreads);
        assert_eq!(sim.trades.len(), 1);
        // exit threshold is inclusive too
        assert_eq!(sim.trades[0].exit_time, bars[1].timestamp);
    }

    #[test]
    fn open_position_is_force_closed_at_end_of_data() {
        let bars = candles(&[2.0, 2.2, 2.4]);
        let mut spreads = ScriptedSpread::new([9.0, 5.0, 4.0]);
        let sim = simulate_symbol("DOGE_USDT", &bars, &frictionless(), &mut spreads);

        assert_eq!(sim.trades.len(), 1);
        let t = &sim.trades[0];
        assert_eq!(t.exit_reason, ExitReason::EndOfData);
        assert_eq!(t.exit_time, bars[2].timestamp);
        assert_eq!(t.exit_price, 2.4);
        assert_eq!(t.exit_spread, 4.0);
    }

    #[test]
    fn no_entry_on_final_candle() {
        let bars = candles(&[1.0, 1.0]);
        let mut spreads = ScriptedSpread::new([0.0, 9.0]);
        let sim = simulate_symbol("DOGE_USDT", &bars, &frictionless(), &mut spreads);
        assert!(sim.trades.is_empty());
    }

    #[test]
    fn reversed_spread_closes_position() {
        let bars = candles(&[1.0, 1.0, 1.0]);
        let mut spreads = ScriptedSpread::with_directions([
            (8.0, SpreadDirection::Long),
            (5.0, SpreadDirection::Short),
            (8.0, SpreadDirection::Long),
        ]);
        let sim = simulate_symbol("DOGE_USDT", &bars, &frictionless(), &mut spreads);
        assert_eq!(sim.trades.len(), 1);
        assert_eq!(sim.trades[0].exit_time, bars[1].timestamp);
        assert_eq!(sim.trades[0].exit_spread, 0.0);
    }

    #[test]
    fn short_side_follows_direction() {
        let bars = candles(&[10.0, 9.0, 9.0]);
        let mut spreads = ScriptedSpread::with_directions([
            (7.5, SpreadDirection::Short),
            (0.1, SpreadDirection::Short),
        ]);
        let sim = simulate_symbol("DOGE_USDT", &bars, &frictionless(), &mut spreads);
        assert_eq!(sim.trades.len(), 1);
        let t = &sim.trades[0];
        assert_eq!(t.side, PositionSide::Short);
        // short from 10 to 9: +10% × 20 × 10
        assert!((t.pnl - 20.0).abs() < 1e-9);
    }

    #[test]
    fn no_reentry_while_open_then_reenters_after_close() {
        let bars = candles(&[1.0; 6]);
        let mut spreads = ScriptedSpread::new([8.0, 9.0, 0.1, 8.0, 0.0, 0.0]);
        let sim = simulate_symbol("DOGE_USDT", &bars, &frictionless(), &mut spreads);
        assert_eq!(sim.trades.len(), 2);
        assert_eq!(sim.trades[0].entry_time, bars[0].timestamp);
        assert_eq!(sim.trades[0].exit_time, bars[2].timestamp);
        assert_eq!(sim.trades[1].entry_time, bars[3].timestamp);
        assert_eq!(sim.trades[1].exit_time, bars[4].timestamp);
    }

    #[test]
    fn exit_bar_does_not_reopen() {
        let bars = candles(&[1.0; 4]);
        // A 9% short spread closes the long; it must not open a short on the same bar.
        let mut spreads = ScriptedSpread::with_directions([
            (8.0, SpreadDirection::Long),
            (9.0, SpreadDirection::Short),
            (0.0, SpreadDirection::Flat),
            (0.0, SpreadDirection::Flat),
        ]);
        let sim = simulate_symbol("DOGE_USDT", &bars, &frictionless(), &mut spreads);
        assert_eq!(sim.trades.len(), 1);
        assert_eq!(sim.trades[0].side, PositionSide::Long);
    }

    #[test]
    fn empty_input_yields_nothing() {
        let mut spreads = ScriptedSpread::default();
        let sim = simulate_symbol("DOGE_USDT", &[], &SimulatorConfig::default(), &mut spreads);
        assert!(sim.trades.is_empty());
        assert_eq!(sim.max_spread, 0.0);
    }

    #[test]
    fn fees_reduce_net_pnl() {
        let bars = candles(&[100.0, 110.0]);
        let mut spreads = ScriptedSpread::new([7.1, 0.0]);
        let sim = simulate_symbol("DOGE_USDT", &bars, &SimulatorConfig::default(), &mut spreads);
        let t = &sim.trades[0];
        assert!((t.gross_pnl - 20.0).abs() < 1e-9);
        assert!((t.fees - 0.21).abs() < 1e-9);
        assert!((sim.total_pnl() - 19.79).abs() < 1e-9);
        assert_eq!(sim.winners(), 1);
    }
}
