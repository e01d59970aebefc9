//! Technical indicator implementations.
//!
//! Every indicator returns an [`IndicatorSeries`] aligned 1:1 with the input
//! bars. Values before the warm-up index are stored as zero and are hidden by
//! [`IndicatorSeries::get`].

pub mod ema;
pub mod rsi;
pub mod volatility;
pub mod volume;

use std::fmt;

use crate::domain::ohlcv::OhlcvBar;
use crate::domain::strategy::StrategyConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorType {
    Rsi(usize),
    Ema(usize),
    VolumeRatio(usize),
    Volatility(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    /// First index holding a computed value.
    pub warmup: usize,
    pub values: Vec<f64>,
}

impl IndicatorSeries {
    /// Value at `index`, or `None` before warm-up or past the end.
    pub fn get(&self, index: usize) -> Option<f64> {
        if index < self.warmup {
            return None;
        }
        self.values.get(index).copied()
    }

    /// Raw value at `index`; zero before warm-up.
    pub fn value(&self, index: usize) -> f64 {
        self.values.get(index).copied().unwrap_or(0.0)
    }

    pub fn last(&self) -> Option<f64> {
        self.values.len().checked_sub(1).and_then(|i| self.get(i))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Rsi(period) => write!(f, "RSI({})", period),
            IndicatorType::Ema(period) => write!(f, "EMA({})", period),
            IndicatorType::VolumeRatio(period) => write!(f, "VOLRATIO({})", period),
            IndicatorType::Volatility(period) => write!(f, "VOLATILITY({})", period),
        }
    }
}

/// All series the engine reads, precomputed once per run. Volatility is
/// informational only and computed separately by callers that log it.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSet {
    pub rsi: IndicatorSeries,
    pub ema_fast: IndicatorSeries,
    pub ema_slow: IndicatorSeries,
    pub volume_ratio: IndicatorSeries,
}

impl IndicatorSet {
    /// Returns `None` if any series cannot be computed from `bars`.
    pub fn compute(bars: &[OhlcvBar], strategy: &StrategyConfig) -> Option<Self> {
        Some(Self {
            rsi: rsi::calculate_rsi(bars, strategy.rsi_period)?,
            ema_fast: ema::calculate_ema(bars, strategy.ema_fast)?,
            ema_slow: ema::calculate_ema(bars, strategy.ema_slow)?,
            volume_ratio: volume::calculate_volume_ratio(bars, strategy.volume_period)?,
        })
    }
}
