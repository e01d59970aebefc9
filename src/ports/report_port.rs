//! Report generation port trait.

use crate::domain::backtest::{BacktestConfig, BacktestResult};
use crate::domain::error::TraderError;
use crate::domain::strategy::StrategyConfig;
use crate::domain::sweep::SweepEntry;

/// Port for writing backtest and sweep reports.
pub trait ReportPort {
    fn write(
        &self,
        result: &BacktestResult,
        strategy: &StrategyConfig,
        config: &BacktestConfig,
    ) -> Result<(), TraderError>;

    /// `entries` arrive ranked best first; only the first `top` are shown.
    fn write_sweep(&self, entries: &[SweepEntry], top: usize) -> Result<(), TraderError>;
}
