//! Plain-text report adapter implementing ReportPort.
//!
//! Renders the run summary, risk metrics, per-side breakdown and the most
//! recent trades; sweep rankings render as a fixed-width table. Output goes
//! to stdout unless a file path is configured.

use std::fmt::Write as _;
use std::fs;
use std::io::Write as _;
use std::path::PathBuf;

use chrono::DateTime;

use crate::domain::backtest::{BacktestConfig, BacktestResult};
use crate::domain::error::TraderError;
use crate::domain::metrics::{Metrics, SideStats};
use crate::domain::position::PositionState;
use crate::domain::strategy::StrategyConfig;
use crate::domain::sweep::SweepEntry;
use crate::ports::report_port::ReportPort;

/// Trades listed at the end of a backtest report.
pub const DEFAULT_TRADE_LIMIT: usize = 20;

pub struct TextReportAdapter {
    output: Option<PathBuf>,
    trade_limit: usize,
}

impl TextReportAdapter {
    pub fn stdout() -> Self {
        Self {
            output: None,
            trade_limit: DEFAULT_TRADE_LIMIT,
        }
    }

    pub fn to_file(path: PathBuf) -> Self {
        Self {
            output: Some(path),
            trade_limit: DEFAULT_TRADE_LIMIT,
        }
    }

    pub fn with_trade_limit(mut self, limit: usize) -> Self {
        self.trade_limit = limit;
        self
    }

    fn emit(&self, text: &str) -> Result<(), TraderError> {
        match &self.output {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        fs::create_dir_all(parent)?;
                    }
                }
                fs::write(path, text)?;
            }
            None => {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(text.as_bytes())?;
                stdout.flush()?;
            }
        }
        Ok(())
    }

    pub fn render(
        &self,
        result: &BacktestResult,
        strategy: &StrategyConfig,
        config: &BacktestConfig,
    ) -> String {
        let metrics = Metrics::compute(result, config.bars_per_year);
        let mut out = String::new();

        let _ = writeln!(out, "=== Backtest: {} on {} ===", strategy.name, config.symbol);
        let _ = writeln!(
            out,
            "pattern {}  filter {}  shorts {}  batches {}",
            strategy.pattern,
            strategy.trend_filter,
            if strategy.allow_short { "on" } else { "off" },
            strategy.max_batches
        );
        let _ = writeln!(
            out,
            "rsi {}  ema {}/{}  fee {:.4}%",
            strategy.rsi_period,
            strategy.ema_fast,
            strategy.ema_slow,
            config.fee_rate * 100.0
        );
        out.push('\n');

        let _ = writeln!(out, "--- Summary ---");
        let _ = writeln!(out, "{:<20}{:>14.2}", "Start balance", config.start_balance);
        let _ = writeln!(out, "{:<20}{:>14.2}", "Final balance", result.final_balance);
        let _ = writeln!(out, "{:<20}{:>14.2}", "Total PnL", result.total_pnl);
        let _ = writeln!(out, "{:<20}{:>14.2}", "Trade fees", result.total_fees);
        let _ = writeln!(out, "{:<20}{:>14.2}", "Opening fees", result.opening_fees);
        let _ = writeln!(
            out,
            "{:<20}{:>14}",
            "Trades",
            format!(
                "{} ({}W/{}L)",
                result.total_trades, result.win_trades, result.lose_trades
            )
        );
        let _ = writeln!(out, "{:<20}{:>13.2}%", "Win rate", result.win_rate * 100.0);
        let _ = writeln!(out, "{:<20}{:>14.2}", "Profit factor", result.profit_factor);
        let _ = writeln!(out, "{:<20}{:>13.2}%", "Max drawdown", result.max_drawdown * 100.0);
        out.push('\n');

        let _ = writeln!(out, "--- Metrics ---");
        let _ = writeln!(out, "{:<20}{:>13.2}%", "Total return", metrics.total_return * 100.0);
        let _ = writeln!(out, "{:<20}{:>14.3}", "Sharpe ratio", metrics.sharpe_ratio);
        let _ = writeln!(out, "{:<20}{:>14.3}", "Sortino ratio", metrics.sortino_ratio);
        let _ = writeln!(
            out,
            "{:<20}{:>14}",
            "Drawdown duration",
            format!("{} bars", metrics.max_drawdown_duration)
        );
        let _ = writeln!(out, "{:<20}{:>14.2}", "Avg win", metrics.avg_win);
        let _ = writeln!(out, "{:<20}{:>14.2}", "Avg loss", metrics.avg_loss);
        let _ = writeln!(out, "{:<20}{:>14.2}", "Largest win", metrics.largest_win);
        let _ = writeln!(out, "{:<20}{:>14.2}", "Largest loss", metrics.largest_loss);
        let _ = writeln!(
            out,
            "{:<20}{:>14}",
            "Avg holding",
            format_duration(metrics.avg_holding_time as i64)
        );
        out.push('\n');

        let _ = writeln!(out, "--- By side ---");
        write_side(&mut out, "Long", &metrics.long);
        write_side(&mut out, "Short", &metrics.short);
        out.push('\n');

        match &result.final_position {
            PositionState::Flat => {
                let _ = writeln!(out, "Final position: flat");
            }
            PositionState::Open(position) => {
                let _ = writeln!(
                    out,
                    "Final position: {} {:.6} @ {:.4} ({} tranches, opened {})",
                    position.side,
                    position.total_amount(),
                    position.avg_price(),
                    position.tranches().len(),
                    format_time(position.entry_time)
                );
            }
        }

        if !result.trades.is_empty() && self.trade_limit > 0 {
            let shown = result.trades.len().min(self.trade_limit);
            out.push('\n');
            let _ = writeln!(
                out,
                "--- Last {} of {} trades ---",
                shown,
                result.trades.len()
            );
            let _ = writeln!(
                out,
                "{:<5} {:<16} {:<16} {:>12} {:>12} {:>12} {:>10}  {}",
                "side", "entry", "exit", "entry px", "exit px", "amount", "pnl", "reason"
            );
            for trade in &result.trades[result.trades.len() - shown..] {
                let _ = writeln!(
                    out,
                    "{:<5} {:<16} {:<16} {:>12.4} {:>12.4} {:>12.6} {:>10.2}  {}",
                    trade.side,
                    format_time(trade.entry_time),
                    format_time(trade.exit_time),
                    trade.entry_price,
                    trade.exit_price,
                    trade.amount,
                    trade.pnl,
                    trade.reason
                );
            }
        }

        out
    }

    pub fn render_sweep(&self, entries: &[SweepEntry], top: usize) -> String {
        let mut out = String::new();
        let shown = entries.len().min(top);

        let _ = writeln!(
            out,
            "=== Parameter sweep: top {} of {} ===",
            shown,
            entries.len()
        );
        let _ = writeln!(
            out,
            "{:>4} {:>6} {:>6} {:>6} {:>6} {:>5} {:>4} {:>4} {:>12} {:>7} {:>7} {:>6}",
            "#",
            "os_l",
            "en_l",
            "ob_s",
            "en_s",
            "vol",
            "fast",
            "slow",
            "pnl",
            "win%",
            "trades",
            "pf"
        );

        for (rank, entry) in entries.iter().take(top).enumerate() {
            let s = &entry.strategy;
            let _ = writeln!(
                out,
                concat!(
                    "{:>4} {:>6.1} {:>6.1} {:>6.1} {:>6.1} {:>5.1} ",
                    "{:>4} {:>4} {:>12.2} {:>6.1}% {:>7} {:>6.2}"
                ),
                rank + 1,
                s.rsi_oversold_long,
                s.rsi_entry_long,
                s.rsi_overbought_short,
                s.rsi_entry_short,
                s.volume_ratio_threshold,
                s.ema_fast,
                s.ema_slow,
                entry.total_pnl,
                entry.win_rate * 100.0,
                entry.total_trades,
                entry.profit_factor
            );
        }

        out
    }
}

impl ReportPort for TextReportAdapter {
    fn write(
        &self,
        result: &BacktestResult,
        strategy: &StrategyConfig,
        config: &BacktestConfig,
    ) -> Result<(), TraderError> {
        self.emit(&self.render(result, strategy, config))
    }

    fn write_sweep(&self, entries: &[SweepEntry], top: usize) -> Result<(), TraderError> {
        self.emit(&self.render_sweep(entries, top))
    }
}

fn write_side(out: &mut String, label: &str, stats: &SideStats) {
    let _ = writeln!(
        out,
        "{:<6} trades {:>5}  wins {:>5}  win rate {:>6.2}%  pnl {:>12.2}",
        label,
        stats.trades,
        stats.wins,
        stats.win_rate * 100.0,
        stats.total_pnl
    );
}

/// UTC `YYYY-MM-DD HH:MM`, or the raw seconds when out of range.
pub fn format_time(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

fn format_duration(seconds: i64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    if hours > 0 {
        format!("{}h {:02}m", hours, minutes)
    } else {
        format!("{}m {:02}s", minutes, seconds % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ledger::{CloseReason, Trade};
    use crate::domain::position::{Position, Side};

    fn trade(exit_time: i64, pnl: f64) -> Trade {
        Trade {
            side: Side::Long,
            entry_time: exit_time - 600,
            exit_time,
            entry_price: 100.0,
            exit_price: 101.0,
            amount: 1.0,
            batch: 1,
            pnl,
            fee: 0.08,
            reason: CloseReason::TrendReversal,
        }
    }

    fn sample_result() -> BacktestResult {
        let mut result = BacktestResult::empty(10_000.0);
        result.trades = (1..=5).map(|i| trade(1_704_067_200 + i * 600, 10.0)).collect();
        result.total_trades = 5;
        result.win_trades = 5;
        result.win_rate = 1.0;
        result.total_pnl = 50.0;
        result.final_balance = 10_050.0;
        result.balance_curve = vec![10_000.0, 10_050.0];
        result
    }

    #[test]
    fn format_time_is_utc_minutes() {
        assert_eq!(format_time(1_704_067_200), "2024-01-01 00:00");
        assert_eq!(format_time(1_704_067_500), "2024-01-01 00:05");
    }

    #[test]
    fn format_duration_units() {
        assert_eq!(format_duration(90), "1m 30s");
        assert_eq!(format_duration(7_500), "2h 05m");
    }

    #[test]
    fn report_contains_sections() {
        let report = TextReportAdapter::stdout().render(
            &sample_result(),
            &StrategyConfig::default(),
            &BacktestConfig::default(),
        );

        assert!(report.contains("=== Backtest: rsi-ema-trend on BTCUSDT ==="));
        assert!(report.contains("--- Summary ---"));
        assert!(report.contains("--- Metrics ---"));
        assert!(report.contains("5 (5W/0L)"));
        assert!(report.contains("Final position: flat"));
        assert!(report.contains("--- Last 5 of 5 trades ---"));
        assert!(report.contains("ema cross"));
    }

    #[test]
    fn trade_limit_keeps_latest() {
        let report = TextReportAdapter::stdout().with_trade_limit(2).render(
            &sample_result(),
            &StrategyConfig::default(),
            &BacktestConfig::default(),
        );

        assert!(report.contains("--- Last 2 of 5 trades ---"));
        assert!(report.contains(&format_time(1_704_067_200 + 5 * 600)));
        assert!(!report.contains(&format_time(1_704_067_200 + 2 * 600)));
    }

    #[test]
    fn report_describes_open_position() {
        let mut result = sample_result();
        result.final_position = PositionState::Open(Position::open(
            Side::Short,
            1_704_067_200,
            50.0,
            2.0,
            None,
            0,
        ));
        let report = TextReportAdapter::stdout().render(
            &result,
            &StrategyConfig::default(),
            &BacktestConfig::default(),
        );
        assert!(report.contains("Final position: SHORT 2.000000 @ 50.0000 (1 tranches"));
    }

    #[test]
    fn sweep_table_respects_top() {
        let entries: Vec<SweepEntry> = (0..5)
            .map(|i| SweepEntry {
                strategy: StrategyConfig::default(),
                total_pnl: 100.0 - i as f64,
                win_rate: 0.5,
                total_trades: 10,
                profit_factor: 1.2,
            })
            .collect();

        let table = TextReportAdapter::stdout().render_sweep(&entries, 3);
        assert!(table.contains("top 3 of 5"));
        assert_eq!(table.lines().count(), 2 + 3);
    }

    #[test]
    fn write_to_file_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("run.txt");
        let adapter = TextReportAdapter::to_file(path.clone());

        adapter
            .write(
                &sample_result(),
                &StrategyConfig::default(),
                &BacktestConfig::default(),
            )
            .unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("--- Summary ---"));
    }
}
