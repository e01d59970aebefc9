//! Parameter grid search over strategy thresholds.
//!
//! Every consistent combination runs as an independent backtest over the
//! same bars; results are ranked by total PnL.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use rayon::prelude::*;
use tracing::{debug, info};

use super::backtest::{BacktestConfig, run_backtest};
use super::config_validation::check_consistency;
use super::ohlcv::OhlcvBar;
use super::strategy::StrategyConfig;

/// Completed combinations between progress log lines.
pub const PROGRESS_EVERY: usize = 200;

#[derive(Debug, Clone, PartialEq)]
pub struct ParamGrid {
    pub rsi_oversold_long: Vec<f64>,
    pub rsi_entry_long: Vec<f64>,
    pub rsi_overbought_short: Vec<f64>,
    pub rsi_entry_short: Vec<f64>,
    pub volume_ratio_threshold: Vec<f64>,
    pub ema_fast: Vec<usize>,
    pub ema_slow: Vec<usize>,
}

impl Default for ParamGrid {
    fn default() -> Self {
        ParamGrid {
            rsi_oversold_long: vec![35.0, 40.0, 45.0],
            rsi_entry_long: vec![45.0, 50.0, 55.0],
            rsi_overbought_short: vec![55.0, 60.0, 65.0],
            rsi_entry_short: vec![45.0, 50.0, 55.0],
            volume_ratio_threshold: vec![1.0, 1.5, 2.0],
            ema_fast: vec![5, 7, 10],
            ema_slow: vec![14, 20, 30],
        }
    }
}

impl ParamGrid {
    /// Number of raw combinations, including inconsistent ones.
    pub fn size(&self) -> usize {
        self.rsi_oversold_long.len()
            * self.rsi_entry_long.len()
            * self.rsi_overbought_short.len()
            * self.rsi_entry_short.len()
            * self.volume_ratio_threshold.len()
            * self.ema_fast.len()
            * self.ema_slow.len()
    }

    /// Every consistent combination applied on top of `base`.
    pub fn generate(&self, base: &StrategyConfig) -> Vec<StrategyConfig> {
        let mut configs = Vec::new();

        for &oversold in &self.rsi_oversold_long {
            for &entry_long in &self.rsi_entry_long {
                for &overbought in &self.rsi_overbought_short {
                    for &entry_short in &self.rsi_entry_short {
                        for &volume in &self.volume_ratio_threshold {
                            for &fast in &self.ema_fast {
                                for &slow in &self.ema_slow {
                                    let candidate = StrategyConfig {
                                        rsi_oversold_long: oversold,
                                        rsi_entry_long: entry_long,
                                        rsi_overbought_short: overbought,
                                        rsi_entry_short: entry_short,
                                        volume_ratio_threshold: volume,
                                        ema_fast: fast,
                                        ema_slow: slow,
                                        ..base.clone()
                                    };
                                    match check_consistency(&candidate) {
                                        Ok(()) => configs.push(candidate),
                                        Err(e) => debug!(%e, "skipping combination"),
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }

        configs
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepEntry {
    pub strategy: StrategyConfig,
    pub total_pnl: f64,
    pub win_rate: f64,
    pub total_trades: usize,
    pub profit_factor: f64,
}

/// Run every consistent combination of `grid` over `bars`.
///
/// Combinations not yet started when `cancel` is set are dropped from the
/// output. The result is sorted by total PnL, best first.
pub fn run_sweep(
    bars: &[OhlcvBar],
    grid: &ParamGrid,
    base: &StrategyConfig,
    config: &BacktestConfig,
    parallel: bool,
    cancel: &AtomicBool,
) -> Vec<SweepEntry> {
    let candidates = grid.generate(base);
    let total = candidates.len();
    info!(
        combinations = total,
        skipped = grid.size() - total,
        parallel,
        "starting parameter sweep"
    );

    let done = AtomicUsize::new(0);
    let evaluate = |strategy: &StrategyConfig| -> Option<SweepEntry> {
        if cancel.load(Ordering::Relaxed) {
            return None;
        }
        let result = run_backtest(bars, strategy, config);

        let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
        if finished % PROGRESS_EVERY == 0 {
            info!(finished, total, "sweep progress");
        }

        Some(SweepEntry {
            strategy: strategy.clone(),
            total_pnl: result.total_pnl,
            win_rate: result.win_rate,
            total_trades: result.total_trades,
            profit_factor: result.profit_factor,
        })
    };

    let mut entries: Vec<SweepEntry> = if parallel {
        candidates.par_iter().filter_map(evaluate).collect()
    } else {
        candidates.iter().filter_map(evaluate).collect()
    };

    entries.sort_by(|a, b| b.total_pnl.total_cmp(&a.total_pnl));
    entries
}
