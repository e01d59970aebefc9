//! Performance metrics and statistics.
//!
//! Derived from a finished [`BacktestResult`]; the balance curve is sampled
//! once per processed bar so risk ratios are annualized by bars per year.

use super::backtest::BacktestResult;
use super::ledger::Trade;
use super::position::Side;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SideStats {
    pub trades: usize,
    pub wins: usize,
    pub total_pnl: f64,
    pub win_rate: f64,
}

impl SideStats {
    fn collect<'a>(trades: impl Iterator<Item = &'a Trade>) -> Self {
        let mut stats = SideStats::default();
        for trade in trades {
            stats.trades += 1;
            stats.total_pnl += trade.pnl;
            if trade.is_win() {
                stats.wins += 1;
            }
        }
        if stats.trades > 0 {
            stats.win_rate = stats.wins as f64 / stats.trades as f64;
        }
        stats
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub total_return: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown: f64,
    /// Longest run of bars spent below a prior peak.
    pub max_drawdown_duration: usize,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    /// Seconds.
    pub avg_holding_time: f64,
    pub long: SideStats,
    pub short: SideStats,
}

impl Metrics {
    pub fn compute(result: &BacktestResult, bars_per_year: f64) -> Self {
        let curve = &result.balance_curve;
        let initial = curve.first().copied().unwrap_or(0.0);
        let final_balance = curve.last().copied().unwrap_or(initial);

        let total_return = if initial > 0.0 {
            (final_balance - initial) / initial
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_duration) = compute_drawdown(curve);
        let (sharpe_ratio, sortino_ratio) = compute_risk_adjusted(curve, bars_per_year);

        let mut wins = 0usize;
        let mut losses = 0usize;
        let mut total_wins = 0.0_f64;
        let mut total_losses = 0.0_f64;
        let mut largest_win = 0.0_f64;
        let mut largest_loss = 0.0_f64;
        let mut total_holding = 0i64;

        for trade in &result.trades {
            let pnl = trade.pnl;
            if pnl > 0.0 {
                wins += 1;
                total_wins += pnl;
                largest_win = largest_win.max(pnl);
            } else if pnl < 0.0 {
                losses += 1;
                total_losses += pnl.abs();
                largest_loss = largest_loss.max(pnl.abs());
            }
            total_holding += trade.holding_time();
        }

        let avg_win = if wins > 0 {
            total_wins / wins as f64
        } else {
            0.0
        };

        let avg_loss = if losses > 0 {
            total_losses / losses as f64
        } else {
            0.0
        };

        let avg_holding_time = if result.trades.is_empty() {
            0.0
        } else {
            total_holding as f64 / result.trades.len() as f64
        };

        Metrics {
            total_return,
            sharpe_ratio,
            sortino_ratio,
            max_drawdown,
            max_drawdown_duration,
            avg_win,
            avg_loss,
            largest_win,
            largest_loss,
            avg_holding_time,
            long: SideStats::collect(result.trades.iter().filter(|t| t.side == Side::Long)),
            short: SideStats::collect(result.trades.iter().filter(|t| t.side == Side::Short)),
        }
    }
}

fn compute_drawdown(curve: &[f64]) -> (f64, usize) {
    let Some(&first) = curve.first() else {
        return (0.0, 0);
    };

    let mut peak = first;
    let mut max_dd = 0.0_f64;
    let mut max_dd_duration = 0usize;
    let mut current_dd_duration = 0usize;

    for &balance in curve {
        if balance >= peak {
            peak = balance;
            current_dd_duration = 0;
        } else if peak > 0.0 {
            let dd = (peak - balance) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
            current_dd_duration += 1;
            if current_dd_duration > max_dd_duration {
                max_dd_duration = current_dd_duration;
            }
        }
    }

    (max_dd, max_dd_duration)
}

fn compute_risk_adjusted(curve: &[f64], bars_per_year: f64) -> (f64, f64) {
    if curve.len() < 2 {
        return (0.0, 0.0);
    }

    let returns: Vec<f64> = curve
        .windows(2)
        .map(|w| if w[0] > 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect();

    let n = returns.len() as f64;
    let mean: f64 = returns.iter().sum::<f64>() / n;

    let variance: f64 = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();
    let annualize = bars_per_year.max(0.0).sqrt();

    let sharpe = if stddev > 0.0 {
        (mean / stddev) * annualize
    } else {
        0.0
    };

    let downside: f64 = returns
        .iter()
        .filter(|&&r| r < 0.0)
        .map(|r| r.powi(2))
        .sum::<f64>();
    let downside_stddev = (downside / n).sqrt();

    let sortino = if downside_stddev > 0.0 {
        (mean / downside_stddev) * annualize
    } else {
        0.0
    };

    (sharpe, sortino)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ledger::{CloseReason, Ledger};
    use crate::domain::position::PositionState;

    fn trade(side: Side, pnl: f64, holding: i64) -> Trade {
        Trade {
            side,
            entry_time: 0,
            exit_time: holding,
            entry_price: 100.0,
            exit_price: 100.0,
            amount: 1.0,
            batch: 1,
            pnl,
            fee: 0.0,
            reason: CloseReason::TrendReversal,
        }
    }

    fn result_with(curve: Vec<f64>, trades: Vec<Trade>) -> BacktestResult {
        let mut result = Ledger::new(curve[0]).into_result(PositionState::Flat);
        result.balance_curve = curve;
        result.total_trades = trades.len();
        result.trades = trades;
        result
    }

    #[test]
    fn total_return_from_curve() {
        let m = Metrics::compute(&result_with(vec![100.0, 110.0, 120.0], vec![]), 252.0);
        assert!((m.total_return - 0.2).abs() < 1e-12);
    }

    #[test]
    fn drawdown_depth_and_duration() {
        let (dd, duration) = compute_drawdown(&[100.0, 120.0, 90.0, 100.0, 130.0, 125.0]);
        assert!((dd - 0.25).abs() < 1e-12);
        assert_eq!(duration, 2);
    }

    #[test]
    fn drawdown_empty_curve() {
        assert_eq!(compute_drawdown(&[]), (0.0, 0));
    }

    #[test]
    fn constant_curve_has_zero_ratios() {
        let (sharpe, sortino) = compute_risk_adjusted(&[100.0; 10], 105_120.0);
        assert_eq!(sharpe, 0.0);
        assert_eq!(sortino, 0.0);
    }

    #[test]
    fn steady_gains_without_losses_have_no_sortino() {
        let curve: Vec<f64> = (0..10).map(|i| 100.0 + i as f64 * (1.0 + (i % 2) as f64)).collect();
        let (sharpe, sortino) = compute_risk_adjusted(&curve, 252.0);
        assert!(sharpe > 0.0);
        assert_eq!(sortino, 0.0);
    }

    #[test]
    fn trade_statistics() {
        let trades = vec![
            trade(Side::Long, 30.0, 600),
            trade(Side::Long, -10.0, 300),
            trade(Side::Short, 10.0, 900),
            trade(Side::Short, 0.0, 0),
        ];
        let m = Metrics::compute(&result_with(vec![100.0, 130.0], trades), 252.0);

        assert!((m.avg_win - 20.0).abs() < 1e-12);
        assert!((m.avg_loss - 10.0).abs() < 1e-12);
        assert!((m.largest_win - 30.0).abs() < 1e-12);
        assert!((m.largest_loss - 10.0).abs() < 1e-12);
        assert!((m.avg_holding_time - 450.0).abs() < 1e-12);

        assert_eq!(m.long.trades, 2);
        assert_eq!(m.long.wins, 1);
        assert!((m.long.total_pnl - 20.0).abs() < 1e-12);
        assert_eq!(m.short.trades, 2);
        assert!((m.short.win_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn no_trades_all_zero() {
        let m = Metrics::compute(&result_with(vec![100.0], vec![]), 252.0);
        assert_eq!(m.avg_win, 0.0);
        assert_eq!(m.avg_holding_time, 0.0);
        assert_eq!(m.long, SideStats::default());
    }
}
