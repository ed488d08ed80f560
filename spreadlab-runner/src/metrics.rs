//! Performance metrics: pure functions over trade records.
//!
//! Every metric is a pure function: trade list in, scalar out. Nothing here
//! mutates its input or touches I/O.

use serde::{Deserialize, Serialize};
use spreadlab_core::domain::{ExitReason, TradeRecord};
use std::collections::BTreeMap;
use std::fmt;

/// Win rate at or above which a profitable run is called profitable outright.
pub const STRONG_WIN_RATE: f64 = 0.60;

/// Gross profit over gross loss, with explicit sentinels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfitFactor {
    Finite(f64),
    /// Gross loss is zero and gross profit positive.
    Infinite,
    /// Gross profit and gross loss are both zero.
    NotApplicable,
}

impl ProfitFactor {
    pub fn from_gross(gross_profit: f64, gross_loss: f64) -> Self {
        if gross_loss > 0.0 {
            Self::Finite(gross_profit / gross_loss)
        } else if gross_profit > 0.0 {
            Self::Infinite
        } else {
            Self::NotApplicable
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Finite(v) => Some(*v),
            Self::Infinite => Some(f64::INFINITY),
            Self::NotApplicable => None,
        }
    }
}

impl fmt::Display for ProfitFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Finite(v) => write!(f, "{v:.2}"),
            Self::Infinite => f.write_str("∞"),
            Self::NotApplicable => f.write_str("N/A"),
        }
    }
}

/// Overall judgement of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    NoTrades,
    /// Net positive with a win rate of at least [`STRONG_WIN_RATE`].
    Profitable,
    ProfitableLowWinRate,
    Unprofitable,
}

impl Verdict {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::NoTrades => "No trades were executed; the entry threshold was never reached.",
            Self::Profitable => "Strategy is PROFITABLE with a good win rate.",
            Self::ProfitableLowWinRate => {
                "Strategy is profitable but the win rate is low; consider tuning parameters."
            }
            Self::Unprofitable => "Strategy is NOT profitable with the current parameters.",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Aggregate statistics for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolBreakdown {
    pub symbol: String,
    pub trades: usize,
    pub win_rate: f64,
    pub total_pnl: f64,
}

/// Aggregate statistics for a whole run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// Fraction in [0, 1].
    pub win_rate: f64,
    pub total_pnl: f64,
    pub avg_pnl: f64,
    pub avg_win: f64,
    /// Mean size of a losing trade, as a positive amount (`gross_loss / losing_trades`).
    pub avg_loss: f64,
    pub best_trade: f64,
    pub worst_trade: f64,
    pub gross_profit: f64,
    pub gross_loss: f64,
    pub profit_factor: ProfitFactor,
    pub total_fees: f64,
    pub avg_hold_minutes: f64,
    pub end_of_data_exits: usize,
    /// Sorted by total P&L, best first.
    pub per_symbol: Vec<SymbolBreakdown>,
    pub verdict: Verdict,
}

impl ReportSummary {
    pub fn compute(trades: &[TradeRecord]) -> Self {
        let winners: Vec<f64> = trades.iter().filter(|t| t.is_winner()).map(|t| t.pnl).collect();
        let losers: Vec<f64> = trades.iter().filter(|t| !t.is_winner()).map(|t| t.pnl).collect();
        let (gross_profit, gross_loss) = gross_profit_loss(trades);
        let total_pnl = total_pnl(trades);
        let win_rate = win_rate(trades);

        Self {
            total_trades: trades.len(),
            winning_trades: winners.len(),
            losing_trades: losers.len(),
            win_rate,
            total_pnl,
            avg_pnl: mean(trades.iter().map(|t| t.pnl)),
            avg_win: mean(winners.iter().copied()),
            avg_loss: mean(losers.iter().map(|p| p.abs())),
            best_trade: trades.iter().map(|t| t.pnl).reduce(f64::max).unwrap_or(0.0),
            worst_trade: trades.iter().map(|t| t.pnl).reduce(f64::min).unwrap_or(0.0),
            gross_profit,
            gross_loss,
            profit_factor: ProfitFactor::from_gross(gross_profit, gross_loss),
            total_fees: trades.iter().map(|t| t.fees).sum(),
            avg_hold_minutes: mean(trades.iter().map(|t| t.hold_minutes())),
            end_of_data_exits: trades
                .iter()
                .filter(|t| t.exit_reason == ExitReason::EndOfData)
                .count(),
            per_symbol: per_symbol(trades),
            verdict: verdict(trades.len(), total_pnl, win_rate),
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Fraction of trades closed with positive net P&L; 0 with no trades.
pub fn win_rate(trades: &[TradeRecord]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    trades.iter().filter(|t| t.is_winner()).count() as f64 / trades.len() as f64
}

pub fn total_pnl(trades: &[TradeRecord]) -> f64 {
    trades.iter().map(|t| t.pnl).sum()
}

/// Sum of winning net P&L and absolute sum of losing net P&L.
pub fn gross_profit_loss(trades: &[TradeRecord]) -> (f64, f64) {
    trades.iter().fold((0.0, 0.0), |(profit, loss), t| {
        if t.pnl > 0.0 {
            (profit + t.pnl, loss)
        } else {
            (profit, loss - t.pnl)
        }
    })
}

pub fn profit_factor(trades: &[TradeRecord]) -> ProfitFactor {
    let (profit, loss) = gross_profit_loss(trades);
    ProfitFactor::from_gross(profit, loss)
}

/// Per-symbol trade count, win rate and P&L, best total P&L first.
pub fn per_symbol(trades: &[TradeRecord]) -> Vec<SymbolBreakdown> {
    let mut grouped: BTreeMap<&str, Vec<&TradeRecord>> = BTreeMap::new();
    for trade in trades {
        grouped.entry(trade.symbol.as_str()).or_default().push(trade);
    }

    let mut rows: Vec<SymbolBreakdown> = grouped
        .into_iter()
        .map(|(symbol, group)| SymbolBreakdown {
            symbol: symbol.to_string(),
            trades: group.len(),
            win_rate: group.iter().filter(|t| t.is_winner()).count() as f64 / group.len() as f64,
            total_pnl: group.iter().map(|t| t.pnl).sum(),
        })
        .collect();
    rows.sort_by(|a, b| b.total_pnl.total_cmp(&a.total_pnl));
    rows
}

pub fn verdict(trade_count: usize, total_pnl: f64, win_rate: f64) -> Verdict {
    if trade_count == 0 {
        Verdict::NoTrades
    } else if total_pnl > 0.0 && win_rate >= STRONG_WIN_RATE {
        Verdict::Profitable
    } else if total_pnl > 0.0 {
        Verdict::ProfitableLowWinRate
    } else {
        Verdict::Unprofitable
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use spreadlab_core::domain::PositionSide;

    fn make_trade(symbol: &str, pnl: f64) -> TradeRecord {
        let entry = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap();
        TradeRecord {
            symbol: symbol.into(),
            side: PositionSide::Long,
            entry_time: entry,
            exit_time: entry + Duration::minutes(30),
            entry_price: 100.0,
            exit_price: 101.0,
            leverage: 20.0,
            size: 10.0,
            entry_spread: 7.5,
            exit_spread: 0.1,
            gross_pnl: pnl + 0.2,
            fees: 0.2,
            pnl,
            exit_reason: ExitReason::SpreadExit,
        }
    }

    #[test]
    fn profit_factor_mixed() {
        let trades = vec![
            make_trade("A", 5.0),
            make_trade("A", -2.0),
            make_trade("B", 3.0),
        ];
        assert_eq!(profit_factor(&trades), ProfitFactor::Finite(4.0));
    }

    #[test]
    fn profit_factor_all_winners_is_infinite() {
        let trades = vec![make_trade("A", 5.0), make_trade("A", 3.0)];
        let pf = profit_factor(&trades);
        assert_eq!(pf, ProfitFactor::Infinite);
        assert_eq!(pf.to_string(), "∞");
    }

    #[test]
    fn profit_factor_empty_is_not_applicable() {
        let pf = profit_factor(&[]);
        assert_eq!(pf, ProfitFactor::NotApplicable);
        assert_eq!(pf.to_string(), "N/A");
        assert_eq!(pf.value(), None);
    }

    #[test]
    fn profit_factor_all_losers_is_zero() {
        let trades = vec![make_trade("A", -5.0)];
        assert_eq!(profit_factor(&trades), ProfitFactor::Finite(0.0));
    }

    #[test]
    fn zero_pnl_counts_as_a_loss() {
        let trades = vec![make_trade("A", 0.0), make_trade("A", 1.0)];
        assert_eq!(win_rate(&trades), 0.5);
        assert_eq!(gross_profit_loss(&trades), (1.0, 0.0));
    }

    #[test]
    fn summary_of_mixed_trades() {
        let trades = vec![
            make_trade("A", 4.0),
            make_trade("B", -1.0),
            make_trade("B", 2.0),
            make_trade("C", -3.0),
        ];
        let s = ReportSummary::compute(&trades);

        assert_eq!(s.total_trades, 4);
        assert_eq!(s.winning_trades, 2);
        assert_eq!(s.losing_trades, 2);
        assert_eq!(s.win_rate, 0.5);
        assert_eq!(s.total_pnl, 2.0);
        assert_eq!(s.avg_pnl, 0.5);
        assert_eq!(s.avg_win, 3.0);
        assert_eq!(s.avg_loss, 2.0);
        assert_eq!(s.best_trade, 4.0);
        assert_eq!(s.worst_trade, -3.0);
        assert!((s.total_fees - 0.8).abs() < 1e-12);
        assert_eq!(s.avg_hold_minutes, 30.0);
        assert_eq!(s.verdict, Verdict::ProfitableLowWinRate);

        let order: Vec<&str> = s.per_symbol.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(order, vec!["A", "B", "C"]);
        assert_eq!(s.per_symbol[1].trades, 2);
        assert_eq!(s.per_symbol[1].win_rate, 0.5);
    }

    #[test]
    fn summary_does_not_mutate_input() {
        let trades = vec![make_trade("B", -1.0), make_trade("A", 2.0)];
        let before = trades.clone();
        let _ = ReportSummary::compute(&trades);
        assert_eq!(trades, before);
    }

    #[test]
    fn verdicts() {
        assert_eq!(verdict(0, 0.0, 0.0), Verdict::NoTrades);
        assert_eq!(verdict(5, 10.0, 0.6), Verdict::Profitable);
        assert_eq!(verdict(5, 10.0, 0.4), Verdict::ProfitableLowWinRate);
        assert_eq!(verdict(5, -1.0, 0.9), Verdict::Unprofitable);
        assert_eq!(verdict(5, 0.0, 1.0), Verdict::Unprofitable);
    }

    #[test]
    fn empty_summary_is_all_zero() {
        let s = ReportSummary::compute(&[]);
        assert_eq!(s.total_trades, 0);
        assert_eq!(s.win_rate, 0.0);
        assert_eq!(s.best_trade, 0.0);
        assert_eq!(s.profit_factor, ProfitFactor::NotApplicable);
        assert_eq!(s.verdict, Verdict::NoTrades);
        assert!(s.per_symbol.is_empty());
    }
}
