//! OHLCV bar representation and bar-level helpers.

use chrono::{DateTime, Utc};

/// One OHLCV sample. `timestamp` is unix seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OhlcvBar {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl OhlcvBar {
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timestamp, 0)
    }
}

/// Highest high and lowest low of the `lookback` bars strictly before `index`.
///
/// Returns `None` when fewer than `lookback` bars precede `index` or when
/// `lookback` is zero.
pub fn recent_range(bars: &[OhlcvBar], index: usize, lookback: usize) -> Option<(f64, f64)> {
    if lookback == 0 || index < lookback || index > bars.len() {
        return None;
    }

    let window = &bars[index - lookback..index];
    let high = window.iter().map(|b| b.high).fold(f64::MIN, f64::max);
    let low = window.iter().map(|b| b.low).fold(f64::MAX, f64::min);
    Some((high, low))
}

/// Aggregate consecutive groups of `factor` bars into one bar each.
///
/// The trailing group may be shorter than `factor`. A factor of 0 or 1
/// returns the input unchanged.
pub fn resample(bars: &[OhlcvBar], factor: usize) -> Vec<OhlcvBar> {
    if factor <= 1 {
        return bars.to_vec();
    }

    bars.chunks(factor)
        .filter_map(|bucket| {
            let first = bucket.first()?;
            let last = bucket.last()?;
            Some(OhlcvBar {
                timestamp: first.timestamp,
                open: first.open,
                high: bucket.iter().map(|b| b.high).fold(f64::MIN, f64::max),
                low: bucket.iter().map(|b| b.low).fold(f64::MAX, f64::min),
                close: last.close,
                volume: bucket.iter().map(|b| b.volume).sum(),
            })
        })
        .collect()
}
