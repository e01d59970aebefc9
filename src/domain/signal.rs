//! Entry and exit signal evaluation.
//!
//! Everything here is a pure function of the current and previous indicator
//! values plus the configured thresholds.

use crate::domain::position::Side;
use crate::domain::strategy::{StrategyConfig, TrendFilter};

/// RSI level separating bullish from bearish momentum.
pub const RSI_NEUTRAL: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    None,
    OpenLong,
    OpenShort,
    CloseLong,
    CloseShort,
}

impl Signal {
    pub fn is_entry(self) -> bool {
        matches!(self, Signal::OpenLong | Signal::OpenShort)
    }

    pub fn entry_side(self) -> Option<Side> {
        match self {
            Signal::OpenLong => Some(Side::Long),
            Signal::OpenShort => Some(Side::Short),
            _ => None,
        }
    }
}

/// Indicator snapshot for one bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalInputs {
    pub close: f64,
    pub rsi: f64,
    pub prev_rsi: f64,
    pub ema_fast: f64,
    pub ema_slow: f64,
    pub prev_ema_fast: f64,
    pub prev_ema_slow: f64,
    pub volume_ratio: f64,
    /// Highest high / lowest low of the breakout window, when the strategy
    /// uses one and enough history exists.
    pub recent_high: Option<f64>,
    pub recent_low: Option<f64>,
}

pub fn trend_up(inputs: &SignalInputs, filter: TrendFilter) -> bool {
    match filter {
        TrendFilter::EmaAlignment => inputs.ema_fast > inputs.ema_slow,
        TrendFilter::Breakout { .. } => inputs.recent_high.is_some_and(|h| inputs.close > h),
    }
}

pub fn trend_down(inputs: &SignalInputs, filter: TrendFilter) -> bool {
    match filter {
        TrendFilter::EmaAlignment => inputs.ema_fast < inputs.ema_slow,
        TrendFilter::Breakout { .. } => inputs.recent_low.is_some_and(|l| inputs.close < l),
    }
}

/// Fast EMA crossed the slow EMA against a position on `side` this bar.
pub fn ema_cross_against(side: Side, inputs: &SignalInputs) -> bool {
    match side {
        Side::Long => {
            inputs.prev_ema_fast >= inputs.prev_ema_slow && inputs.ema_fast < inputs.ema_slow
        }
        Side::Short => {
            inputs.prev_ema_fast <= inputs.prev_ema_slow && inputs.ema_fast > inputs.ema_slow
        }
    }
}

fn long_entry(inputs: &SignalInputs, strategy: &StrategyConfig) -> bool {
    inputs.prev_rsi < strategy.rsi_oversold_long
        && inputs.rsi >= strategy.rsi_entry_long
        && trend_up(inputs, strategy.trend_filter)
        && inputs.volume_ratio >= strategy.volume_ratio_threshold
}

fn short_entry(inputs: &SignalInputs, strategy: &StrategyConfig) -> bool {
    strategy.allow_short
        && inputs.prev_rsi > strategy.rsi_overbought_short
        && inputs.rsi <= strategy.rsi_entry_short
        && trend_down(inputs, strategy.trend_filter)
        && inputs.volume_ratio >= strategy.volume_ratio_threshold
}

/// RSI recovery entry with trend and volume confirmation. Long wins if both
/// sides somehow qualify.
pub fn evaluate_entry(inputs: &SignalInputs, strategy: &StrategyConfig) -> Signal {
    if long_entry(inputs, strategy) {
        Signal::OpenLong
    } else if short_entry(inputs, strategy) {
        Signal::OpenShort
    } else {
        Signal::None
    }
}

/// Relative depth of a `(high, low)` range, measured from the high.
pub fn drop_depth(high: f64, low: f64) -> f64 {
    if high <= 0.0 {
        0.0
    } else {
        (high - low) / high
    }
}

/// Long entry after the previous window fell at least `drop_threshold` and
/// RSI rebounds out of oversold with the trend turning up.
pub fn evaluate_bounce_entry(
    inputs: &SignalInputs,
    drop_range: Option<(f64, f64)>,
    strategy: &StrategyConfig,
) -> Signal {
    let Some((high, low)) = drop_range else {
        return Signal::None;
    };

    let triggered = drop_depth(high, low) >= strategy.drop_threshold
        && inputs.prev_rsi < strategy.rsi_oversold_long
        && inputs.rsi >= strategy.rsi_entry_long
        && trend_up(inputs, strategy.trend_filter)
        && inputs.volume_ratio >= strategy.volume_ratio_threshold;

    if triggered {
        Signal::OpenLong
    } else {
        Signal::None
    }
}

/// Whether a position on `side` may still be added to.
pub fn entry_conditions_hold(side: Side, inputs: &SignalInputs, strategy: &StrategyConfig) -> bool {
    match side {
        Side::Long => {
            inputs.rsi >= strategy.rsi_entry_long && trend_up(inputs, strategy.trend_filter)
        }
        Side::Short => {
            inputs.rsi <= strategy.rsi_entry_short && trend_down(inputs, strategy.trend_filter)
        }
    }
}

/// RSI crossing the neutral line against the position.
pub fn evaluate_exit(side: Side, prev_rsi: f64, rsi: f64) -> Signal {
    match side {
        Side::Long if prev_rsi >= RSI_NEUTRAL && rsi < RSI_NEUTRAL => Signal::CloseLong,
        Side::Short if prev_rsi <= RSI_NEUTRAL && rsi > RSI_NEUTRAL => Signal::CloseShort,
        _ => Signal::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::strategy::StrategyConfig;

    fn inputs(prev_rsi: f64, rsi: f64, fast: f64, slow: f64, vol: f64) -> SignalInputs {
        SignalInputs {
            close: 100.0,
            rsi,
            prev_rsi,
            ema_fast: fast,
            ema_slow: slow,
            prev_ema_fast: fast,
            prev_ema_slow: slow,
            volume_ratio: vol,
            recent_high: None,
            recent_low: None,
        }
    }

    #[test]
    fn long_entry_requires_all_conditions() {
        let s = StrategyConfig::default();
        assert_eq!(
            evaluate_entry(&inputs(40.0, 52.0, 101.0, 100.0, 2.0), &s),
            Signal::OpenLong
        );
        // prev RSI not oversold
        assert_eq!(
            evaluate_entry(&inputs(46.0, 52.0, 101.0, 100.0, 2.0), &s),
            Signal::None
        );
        // no uptrend
        assert_eq!(
            evaluate_entry(&inputs(40.0, 52.0, 99.0, 100.0, 2.0), &s),
            Signal::None
        );
        // volume too thin
        assert_eq!(
            evaluate_entry(&inputs(40.0, 52.0, 101.0, 100.0, 1.0), &s),
            Signal::None
        );
    }

    #[test]
    fn entry_threshold_is_inclusive() {
        let s = StrategyConfig::default();
        assert_eq!(
            evaluate_entry(&inputs(44.9, 50.0, 101.0, 100.0, 1.5), &s),
            Signal::OpenLong
        );
    }

    #[test]
    fn short_entry_mirrors_long() {
        let s = StrategyConfig::default();
        assert_eq!(
            evaluate_entry(&inputs(60.0, 48.0, 99.0, 100.0, 2.0), &s),
            Signal::OpenShort
        );

        let long_only = StrategyConfig {
            allow_short: false,
            ..StrategyConfig::default()
        };
        assert_eq!(
            evaluate_entry(&inputs(60.0, 48.0, 99.0, 100.0, 2.0), &long_only),
            Signal::None
        );
    }

    #[test]
    fn breakout_filter_uses_recent_range() {
        let s = StrategyConfig {
            trend_filter: TrendFilter::Breakout { lookback: 20 },
            ..StrategyConfig::default()
        };
        let mut i = inputs(40.0, 55.0, 90.0, 100.0, 2.0);
        i.recent_high = Some(99.0);
        assert_eq!(evaluate_entry(&i, &s), Signal::OpenLong);

        i.recent_high = Some(100.0);
        assert_eq!(evaluate_entry(&i, &s), Signal::None);

        i.recent_high = None;
        assert_eq!(evaluate_entry(&i, &s), Signal::None);
    }

    #[test]
    fn bounce_entry_needs_drop() {
        let s = StrategyConfig::bounce();
        let i = inputs(30.0, 40.0, 101.0, 100.0, 0.0);

        assert_eq!(
            evaluate_bounce_entry(&i, Some((100.0, 98.0)), &s),
            Signal::OpenLong
        );
        assert_eq!(
            evaluate_bounce_entry(&i, Some((100.0, 99.5)), &s),
            Signal::None
        );
        assert_eq!(evaluate_bounce_entry(&i, None, &s), Signal::None);
    }

    #[test]
    fn drop_depth_zero_high() {
        assert_eq!(drop_depth(0.0, 0.0), 0.0);
        assert!((drop_depth(100.0, 95.0) - 0.05).abs() < 1e-12);
    }

    #[test]
    fn scale_in_conditions() {
        let s = StrategyConfig::default();
        assert!(entry_conditions_hold(
            Side::Long,
            &inputs(0.0, 55.0, 101.0, 100.0, 0.0),
            &s
        ));
        assert!(!entry_conditions_hold(
            Side::Long,
            &inputs(0.0, 45.0, 101.0, 100.0, 0.0),
            &s
        ));
        assert!(entry_conditions_hold(
            Side::Short,
            &inputs(0.0, 45.0, 99.0, 100.0, 0.0),
            &s
        ));
    }

    #[test]
    fn ema_cross_detection() {
        let mut i = inputs(50.0, 50.0, 99.0, 100.0, 1.0);
        i.prev_ema_fast = 101.0;
        i.prev_ema_slow = 100.0;
        assert!(ema_cross_against(Side::Long, &i));
        assert!(!ema_cross_against(Side::Short, &i));

        // already below on the previous bar: no fresh cross
        i.prev_ema_fast = 98.0;
        assert!(!ema_cross_against(Side::Long, &i));
    }

    #[test]
    fn neutral_line_exit() {
        assert_eq!(evaluate_exit(Side::Long, 52.0, 49.0), Signal::CloseLong);
        assert_eq!(evaluate_exit(Side::Long, 50.0, 49.9), Signal::CloseLong);
        assert_eq!(evaluate_exit(Side::Long, 48.0, 45.0), Signal::None);
        assert_eq!(evaluate_exit(Side::Short, 48.0, 51.0), Signal::CloseShort);
        assert_eq!(evaluate_exit(Side::Short, 52.0, 55.0), Signal::None);
    }

    #[test]
    fn signal_helpers() {
        assert!(Signal::OpenShort.is_entry());
        assert!(!Signal::CloseLong.is_entry());
        assert_eq!(Signal::OpenLong.entry_side(), Some(Side::Long));
        assert_eq!(Signal::None.entry_side(), None);
    }
}
