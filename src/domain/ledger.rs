//! Trade ledger and running balance.
//!
//! Balance changes only when fees are charged or trades are realized;
//! drawdown is measured on that realized balance.

use std::fmt;

use super::backtest::BacktestResult;
use super::position::{PositionState, Side};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CloseReason {
    RsiStop,
    MaxHoldTime,
    TrendReversal,
    StopLoss,
    TrendExhaustion,
    /// Scheduled partial take-profit; `progress` is the profit-band progress
    /// at the time of the exit.
    PartialTakeProfit { slot: usize, progress: f64 },
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::RsiStop => write!(f, "rsi stop"),
            CloseReason::MaxHoldTime => write!(f, "max hold time"),
            CloseReason::TrendReversal => write!(f, "ema cross"),
            CloseReason::StopLoss => write!(f, "stop loss"),
            CloseReason::TrendExhaustion => write!(f, "rsi neutral"),
            CloseReason::PartialTakeProfit { slot, progress } => {
                write!(f, "partial tp #{} ({:.1}%)", slot, progress * 100.0)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub side: Side,
    pub entry_time: i64,
    pub exit_time: i64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub amount: f64,
    pub batch: usize,
    /// Net of `fee`.
    pub pnl: f64,
    pub fee: f64,
    pub reason: CloseReason,
}

impl Trade {
    /// Zero PnL counts as a loss.
    pub fn is_win(&self) -> bool {
        self.pnl > 0.0
    }

    pub fn holding_time(&self) -> i64 {
        self.exit_time - self.entry_time
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ledger {
    pub start_balance: f64,
    pub balance: f64,
    pub peak_balance: f64,
    pub max_drawdown: f64,
    pub total_pnl: f64,
    pub total_fees: f64,
    pub opening_fees: f64,
    pub win_trades: usize,
    pub lose_trades: usize,
    pub trades: Vec<Trade>,
    pub balance_curve: Vec<f64>,
}

impl Ledger {
    pub fn new(start_balance: f64) -> Self {
        Ledger {
            start_balance,
            balance: start_balance,
            peak_balance: start_balance,
            max_drawdown: 0.0,
            total_pnl: 0.0,
            total_fees: 0.0,
            opening_fees: 0.0,
            win_trades: 0,
            lose_trades: 0,
            trades: Vec::new(),
            balance_curve: vec![start_balance],
        }
    }

    pub fn charge_opening_fee(&mut self, fee: f64) {
        self.balance -= fee;
        self.opening_fees += fee;
    }

    pub fn record_trade(&mut self, trade: Trade) {
        self.balance += trade.pnl;
        self.total_pnl += trade.pnl;
        self.total_fees += trade.fee;
        if trade.is_win() {
            self.win_trades += 1;
        } else {
            self.lose_trades += 1;
        }
        self.trades.push(trade);
    }

    /// End-of-bar bookkeeping: extend the curve, track peak and drawdown.
    pub fn mark_bar(&mut self) {
        self.balance_curve.push(self.balance);
        if self.balance > self.peak_balance {
            self.peak_balance = self.balance;
        }
        if self.peak_balance > 0.0 {
            let drawdown = (self.peak_balance - self.balance) / self.peak_balance;
            if drawdown > self.max_drawdown {
                self.max_drawdown = drawdown;
            }
        }
    }

    pub fn into_result(self, final_position: PositionState) -> BacktestResult {
        let total_trades = self.trades.len();
        BacktestResult {
            total_trades,
            win_trades: self.win_trades,
            lose_trades: self.lose_trades,
            total_pnl: self.total_pnl,
            total_fees: self.total_fees,
            opening_fees: self.opening_fees,
            win_rate: win_rate(self.win_trades, total_trades),
            profit_factor: profit_factor(&self.trades),
            max_drawdown: self.max_drawdown,
            final_balance: self.balance,
            trades: self.trades,
            balance_curve: self.balance_curve,
            final_position,
        }
    }
}

/// Wins over total; 0 with no trades.
pub fn win_rate(wins: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        wins as f64 / total as f64
    }
}

/// Gross winning PnL over gross losing PnL; 0 when nothing was lost.
pub fn profit_factor(trades: &[Trade]) -> f64 {
    let gross_win: f64 = trades.iter().filter(|t| t.is_win()).map(|t| t.pnl).sum();
    let gross_loss: f64 = trades
        .iter()
        .filter(|t| !t.is_win())
        .map(|t| t.pnl.abs())
        .sum();

    if gross_loss == 0.0 {
        0.0
    } else {
        gross_win / gross_loss
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade(pnl: f64) -> Trade {
        Trade {
            side: Side::Long,
            entry_time: 0,
            exit_time: 300,
            entry_price: 100.0,
            exit_price: 100.0 + pnl,
            amount: 1.0,
            batch: 1,
            pnl,
            fee: 0.5,
            reason: CloseReason::TrendReversal,
        }
    }

    #[test]
    fn new_ledger() {
        let ledger = Ledger::new(10_000.0);
        assert!((ledger.balance - 10_000.0).abs() < f64::EPSILON);
        assert_eq!(ledger.balance_curve, vec![10_000.0]);
        assert!(ledger.trades.is_empty());
    }

    #[test]
    fn record_trade_updates_counters() {
        let mut ledger = Ledger::new(1000.0);
        ledger.record_trade(trade(50.0));
        ledger.record_trade(trade(0.0));
        ledger.record_trade(trade(-20.0));

        assert_eq!(ledger.win_trades, 1);
        assert_eq!(ledger.lose_trades, 2);
        assert!((ledger.balance - 1030.0).abs() < 1e-9);
        assert!((ledger.total_pnl - 30.0).abs() < 1e-9);
        assert!((ledger.total_fees - 1.5).abs() < 1e-9);
    }

    #[test]
    fn opening_fee_reduces_balance() {
        let mut ledger = Ledger::new(1000.0);
        ledger.charge_opening_fee(2.5);
        assert!((ledger.balance - 997.5).abs() < 1e-12);
        assert!((ledger.opening_fees - 2.5).abs() < 1e-12);
        assert_eq!(ledger.total_fees, 0.0);
    }

    #[test]
    fn drawdown_tracks_peak() {
        let mut ledger = Ledger::new(100.0);
        ledger.record_trade(trade(20.0));
        ledger.mark_bar();
        ledger.record_trade(trade(-30.0));
        ledger.mark_bar();
        ledger.record_trade(trade(5.0));
        ledger.mark_bar();

        assert!((ledger.peak_balance - 120.0).abs() < 1e-12);
        assert!((ledger.max_drawdown - 0.25).abs() < 1e-12);
        assert_eq!(ledger.balance_curve.len(), 4);
    }

    #[test]
    fn win_rate_and_profit_factor() {
        assert_eq!(win_rate(0, 0), 0.0);
        assert!((win_rate(1, 4) - 0.25).abs() < f64::EPSILON);

        assert_eq!(profit_factor(&[trade(10.0), trade(5.0)]), 0.0);
        assert!((profit_factor(&[trade(30.0), trade(-10.0), trade(-5.0)]) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn into_result_derives_summary() {
        let mut ledger = Ledger::new(100.0);
        ledger.record_trade(trade(10.0));
        ledger.record_trade(trade(-5.0));
        ledger.mark_bar();

        let result = ledger.into_result(PositionState::Flat);
        assert_eq!(result.total_trades, 2);
        assert!((result.win_rate - 0.5).abs() < f64::EPSILON);
        assert!((result.profit_factor - 2.0).abs() < 1e-12);
        assert!((result.final_balance - 105.0).abs() < 1e-12);
    }

    #[test]
    fn close_reason_display() {
        assert_eq!(CloseReason::RsiStop.to_string(), "rsi stop");
        assert_eq!(
            CloseReason::PartialTakeProfit {
                slot: 2,
                progress: 0.615
            }
            .to_string(),
            "partial tp #2 (61.5%)"
        );
    }
}
