//! Volume moving average and volume ratio.
//!
//! VOLMA(n)[i] = mean(V[i-n+1..=i]); VOLRATIO(n)[i] = V[i] / VOLMA(n)[i],
//! zero where the average is zero.
//! Warmup: first (n-1) bars are invalid.

use crate::domain::indicator::{IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::OhlcvBar;

pub fn calculate_volume_ma(bars: &[OhlcvBar], period: usize) -> Option<Vec<f64>> {
    if period == 0 || bars.len() < period {
        return None;
    }

    // each window summed afresh
    let mut values = vec![0.0; bars.len()];
    for i in (period - 1)..bars.len() {
        let sum: f64 = bars[i + 1 - period..=i].iter().map(|b| b.volume).sum();
        values[i] = sum / period as f64;
    }

    Some(values)
}

pub fn calculate_volume_ratio(bars: &[OhlcvBar], period: usize) -> Option<IndicatorSeries> {
    let ma = calculate_volume_ma(bars, period)?;

    let values = bars
        .iter()
        .zip(&ma)
        .enumerate()
        .map(|(i, (bar, &avg))| {
            if i + 1 < period || avg == 0.0 {
                0.0
            } else {
                bar.volume / avg
            }
        })
        .collect();

    Some(IndicatorSeries {
        indicator_type: IndicatorType::VolumeRatio(period),
        warmup: period - 1,
        values,
    })
}
