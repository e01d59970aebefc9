//! RSI (Relative Strength Index) indicator.
//!
//! Box-average variant: for each index i >= n, average gain and average loss
//! are the simple means over the trailing n close-to-close deltas, recomputed
//! from scratch every bar. No Wilder smoothing is carried forward; entry
//! thresholds are tuned against this form.
//!
//! Formula: RSI = 100 - (100 / (1 + avg_gain / avg_loss))
//! If avg_loss == 0: RSI = 100
//!
//! Warmup: first n bars are invalid. Requires at least n + 1 bars.

use crate::domain::indicator::{IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::OhlcvBar;

pub fn calculate_rsi(bars: &[OhlcvBar], period: usize) -> Option<IndicatorSeries> {
    if period == 0 || bars.len() < period + 1 {
        return None;
    }

    let mut values = vec![0.0; bars.len()];

    for (i, value) in values.iter_mut().enumerate().skip(period) {
        let mut gains = 0.0;
        let mut losses = 0.0;
        for j in (i + 1 - period)..=i {
            let change = bars[j].close - bars[j - 1].close;
            if change > 0.0 {
                gains += change;
            } else {
                losses -= change;
            }
        }

        let avg_gain = gains / period as f64;
        let avg_loss = losses / period as f64;
        *value = if avg_loss == 0.0 {
            100.0
        } else {
            100.0 - (100.0 / (1.0 + avg_gain / avg_loss))
        };
    }

    Some(IndicatorSeries {
        indicator_type: IndicatorType::Rsi(period),
        warmup: period,
        values,
    })
}
