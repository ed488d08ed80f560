//! Property tests for simulator invariants.
//!
//! Uses proptest to verify, over arbitrary price paths and spread scripts:
//! 1. Every trade exits strictly after it enters, with positive leverage
//! 2. At most one open position per symbol at any timestamp
//! 3. Every trade ends by spread exit or end of data, and only the last can be end of data
//! 4. Spreads that never reach the entry threshold produce no trades
//! 5. Net P&L is gross P&L minus fees, and fees are never negative

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use spreadlab_core::domain::{Candle, ExitReason};
use spreadlab_core::spread::{ScriptedSpread, SpreadDirection};
use spreadlab_core::{simulate_symbol, FeeModel, SimulatorConfig};

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_closes() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(1.0..500.0_f64, 0..120)
}

fn arb_direction() -> impl Strategy<Value = SpreadDirection> {
    prop_oneof![
        Just(SpreadDirection::Long),
        Just(SpreadDirection::Short),
        Just(SpreadDirection::Flat),
    ]
}

fn arb_script(max_spread: f64) -> impl Strategy<Value = Vec<(f64, SpreadDirection)>> {
    prop::collection::vec((0.0..max_spread, arb_direction()), 0..120)
}

fn candles(closes: &[f64]) -> Vec<Candle> {
    let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Candle {
            symbol: "PROP_USDT".into(),
            timestamp: t0 + Duration::minutes(15 * i as i64),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
        })
        .collect()
}

proptest! {
    #[test]
    fn trades_are_well_formed(closes in arb_closes(), script in arb_script(15.0)) {
        let candles = candles(&closes);
        let config = SimulatorConfig::default();
        let mut source = ScriptedSpread::with_directions(script);
        let sim = simulate_symbol("PROP_USDT", &candles, &config, &mut source);

        for trade in &sim.trades {
            prop_assert!(trade.exit_time > trade.entry_time);
            prop_assert!(trade.leverage > 0.0);
            prop_assert!(trade.fees >= 0.0);
            prop_assert!((trade.pnl - (trade.gross_pnl - trade.fees)).abs() < 1e-9);
        }
    }

    #[test]
    fn positions_never_overlap(closes in arb_closes(), script in arb_script(15.0)) {
        let candles = candles(&closes);
        let mut source = ScriptedSpread::with_directions(script);
        let sim = simulate_symbol("PROP_USDT", &candles, &SimulatorConfig::default(), &mut source);

        for pair in sim.trades.windows(2) {
            prop_assert!(pair[0].exit_time < pair[1].entry_time);
        }
    }

    #[test]
    fn only_the_final_trade_can_end_at_end_of_data(
        closes in arb_closes(),
        script in arb_script(15.0),
    ) {
        let candles = candles(&closes);
        let mut source = ScriptedSpread::with_directions(script);
        let sim = simulate_symbol("PROP_USDT", &candles, &SimulatorConfig::default(), &mut source);

        let n = sim.trades.len();
        for (i, trade) in sim.trades.iter().enumerate() {
            if trade.exit_reason == ExitReason::EndOfData {
                prop_assert_eq!(i, n - 1);
                prop_assert_eq!(Some(trade.exit_time), candles.last().map(|c| c.timestamp));
            } else {
                prop_assert_eq!(trade.exit_reason, ExitReason::SpreadExit);
            }
        }
    }

    #[test]
    fn sub_threshold_spreads_never_trade(closes in arb_closes(), script in arb_script(6.99)) {
        let candles = candles(&closes);
        let mut source = ScriptedSpread::with_directions(script);
        let sim = simulate_symbol("PROP_USDT", &candles, &SimulatorConfig::default(), &mut source);
        prop_assert!(sim.trades.is_empty());
    }

    #[test]
    fn frictionless_pnl_equals_gross(closes in arb_closes(), script in arb_script(15.0)) {
        let candles = candles(&closes);
        let config = SimulatorConfig {
            fees: FeeModel::free(),
            ..SimulatorConfig::default()
        };
        let mut source = ScriptedSpread::with_directions(script);
        let sim = simulate_symbol("PROP_USDT", &candles, &config, &mut source);

        for trade in &sim.trades {
            prop_assert_eq!(trade.fees, 0.0);
            prop_assert_eq!(trade.pnl, trade.gross_pnl);
        }
    }
}
