//! Strategy configuration.
//!
//! One parameterized engine covers both entry styles; [`EntryPattern`]
//! selects between them and the preset constructors carry each style's
//! tuned defaults.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPattern {
    /// RSI recovers from an extreme while the trend filter confirms.
    TrendBreakout,
    /// A sharp drop over the lookback window followed by an RSI rebound.
    DropBounce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendFilter {
    /// Fast EMA above slow EMA (below for shorts).
    EmaAlignment,
    /// Close beyond the extreme of the previous `lookback` bars.
    Breakout { lookback: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyConfig {
    pub name: String,
    pub pattern: EntryPattern,
    pub trend_filter: TrendFilter,
    pub allow_short: bool,

    pub rsi_period: usize,
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub volume_period: usize,
    /// Only logged by the `signal` command; the engine never reads volatility.
    pub volatility_period: usize,

    pub rsi_oversold_long: f64,
    pub rsi_entry_long: f64,
    pub rsi_overbought_short: f64,
    pub rsi_entry_short: f64,
    pub volume_ratio_threshold: f64,

    pub drop_lookback: usize,
    pub drop_threshold: f64,

    /// Fractions of the current balance committed per tranche.
    pub first_batch_size: f64,
    pub other_batch_size: f64,
    /// Seconds between scale-ins.
    pub batch_interval: i64,
    pub max_batches: usize,
    pub scale_in_min_profit: f64,

    /// RSI level below which a long is stopped out; 0 disables.
    pub rsi_exit: f64,
    /// Seconds; 0 disables.
    pub max_hold_time: i64,
    pub exit_on_ema_cross: bool,
    pub stop_loss_pct: f64,
    pub exit_on_rsi_neutral: bool,

    pub profit_threshold: f64,
    /// Seconds after entry before partial exits may start.
    pub start_exit_time: i64,
    /// Seconds between partial exit slots.
    pub exit_interval: i64,
    /// Fraction of the open amount liquidated per slot; 0 disables.
    pub exit_percent: f64,
    /// Width of the trend profit band; 0 leaves trend positions without one.
    pub take_profit_pct: f64,

    pub min_warmup: usize,
}

impl Default for StrategyConfig {
    /// The RSI/EMA trend preset.
    fn default() -> Self {
        Self {
            name: "rsi-ema-trend".into(),
            pattern: EntryPattern::TrendBreakout,
            trend_filter: TrendFilter::EmaAlignment,
            allow_short: true,

            rsi_period: 14,
            ema_fast: 7,
            ema_slow: 20,
            volume_period: 14,
            volatility_period: 14,

            rsi_oversold_long: 45.0,
            rsi_entry_long: 50.0,
            rsi_overbought_short: 55.0,
            rsi_entry_short: 50.0,
            volume_ratio_threshold: 1.5,

            drop_lookback: 0,
            drop_threshold: 0.0,

            first_batch_size: 0.20,
            other_batch_size: 0.20,
            batch_interval: 0,
            max_batches: 2,
            scale_in_min_profit: 0.015,

            rsi_exit: 0.0,
            max_hold_time: 0,
            exit_on_ema_cross: true,
            stop_loss_pct: 0.03,
            exit_on_rsi_neutral: false,

            profit_threshold: 0.0,
            start_exit_time: 0,
            exit_interval: 0,
            exit_percent: 0.0,
            take_profit_pct: 0.0,

            min_warmup: 50,
        }
    }
}

impl StrategyConfig {
    /// The drop-and-bounce preset: long only, scaled in over several batches
    /// and scaled out on a schedule once the rebound is under way.
    pub fn bounce() -> Self {
        Self {
            name: "drop-bounce".into(),
            pattern: EntryPattern::DropBounce,
            trend_filter: TrendFilter::EmaAlignment,
            allow_short: false,

            rsi_period: 14,
            ema_fast: 5,
            ema_slow: 13,
            volume_period: 14,
            volatility_period: 14,

            rsi_oversold_long: 32.0,
            rsi_entry_long: 38.0,
            rsi_overbought_short: 68.0,
            rsi_entry_short: 62.0,
            volume_ratio_threshold: 0.0,

            drop_lookback: 45,
            drop_threshold: 0.012,

            first_batch_size: 0.12,
            other_batch_size: 0.13,
            batch_interval: 180,
            max_batches: 7,
            scale_in_min_profit: 0.0,

            rsi_exit: 32.0,
            max_hold_time: 2700,
            exit_on_ema_cross: false,
            stop_loss_pct: 0.0,
            exit_on_rsi_neutral: false,

            profit_threshold: 0.5,
            start_exit_time: 600,
            exit_interval: 180,
            exit_percent: 0.25,
            take_profit_pct: 0.0,

            min_warmup: 0,
        }
    }

    /// Preset for `pattern`.
    pub fn preset(pattern: EntryPattern) -> Self {
        match pattern {
            EntryPattern::TrendBreakout => Self::default(),
            EntryPattern::DropBounce => Self::bounce(),
        }
    }

    /// Index of the first bar the engine processes.
    pub fn warmup_bars(&self) -> usize {
        let mut warmup = (self.rsi_period + 1)
            .max(self.ema_fast)
            .max(self.ema_slow)
            .max(self.volume_period)
            .max(self.min_warmup);

        if self.pattern == EntryPattern::DropBounce {
            warmup = warmup.max(self.drop_lookback);
        }
        if let TrendFilter::Breakout { lookback } = self.trend_filter {
            warmup = warmup.max(lookback);
        }
        warmup
    }

    pub fn partial_exits_enabled(&self) -> bool {
        self.exit_percent > 0.0
    }
}

impl fmt::Display for EntryPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryPattern::TrendBreakout => write!(f, "trend"),
            EntryPattern::DropBounce => write!(f, "bounce"),
        }
    }
}

impl FromStr for EntryPattern {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trend" | "breakout" => Ok(EntryPattern::TrendBreakout),
            "bounce" | "drop_bounce" => Ok(EntryPattern::DropBounce),
            other => Err(format!("unknown entry pattern '{other}' (expected trend or bounce)")),
        }
    }
}

impl fmt::Display for TrendFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrendFilter::EmaAlignment => write!(f, "ema"),
            TrendFilter::Breakout { lookback } => write!(f, "breakout({lookback})"),
        }
    }
}
