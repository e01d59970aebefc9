//! Exponential Moving Average indicator.
//!
//! k = 2/(n+1), seed with the SMA of the first n closes, then
//! EMA[i] = (C[i] - EMA[i-1]) * k + EMA[i-1].
//! Warmup: first (n-1) bars are invalid.

use crate::domain::indicator::{IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::OhlcvBar;

pub fn calculate_ema(bars: &[OhlcvBar], period: usize) -> Option<IndicatorSeries> {
    if period == 0 || bars.len() < period {
        return None;
    }

    let mut values = vec![0.0; bars.len()];
    let k = 2.0 / (period as f64 + 1.0);

    let seed = bars[..period].iter().map(|b| b.close).sum::<f64>() / period as f64;
    values[period - 1] = seed;

    let mut ema = seed;
    for (i, bar) in bars.iter().enumerate().skip(period) {
        ema = (bar.close - ema) * k + ema;
        values[i] = ema;
    }

    Some(IndicatorSeries {
        indicator_type: IndicatorType::Ema(period),
        warmup: period - 1,
        values,
    })
}
