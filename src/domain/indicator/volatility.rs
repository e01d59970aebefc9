//! Volatility of log returns.
//!
//! r[i] = ln(C[i] / C[i-1]); VOL(n)[i] = population stddev of r[i-n+1..=i],
//! multiplied by sqrt(bars_per_year) when annualized.
//! Warmup: first n bars are invalid.

use crate::domain::indicator::{IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::OhlcvBar;

fn log_return(prev: f64, curr: f64) -> f64 {
    if prev <= 0.0 || curr <= 0.0 {
        0.0
    } else {
        (curr / prev).ln()
    }
}

pub fn calculate_volatility(
    bars: &[OhlcvBar],
    period: usize,
    bars_per_year: Option<f64>,
) -> Option<IndicatorSeries> {
    if period == 0 || bars.len() < period + 1 {
        return None;
    }

    let scale = bars_per_year.map_or(1.0, f64::sqrt);

    // returns[k] is the return into bar k + 1
    let returns: Vec<f64> = bars
        .windows(2)
        .map(|w| log_return(w[0].close, w[1].close))
        .collect();

    let mut values = vec![0.0; bars.len()];
    for (i, value) in values.iter_mut().enumerate().skip(period) {
        let window = &returns[i - period..i];
        let mean = window.iter().sum::<f64>() / period as f64;
        let variance = window
            .iter()
            .map(|r| {
                let diff = r - mean;
                diff * diff
            })
            .sum::<f64>()
            / period as f64;
        *value = variance.sqrt() * scale;
    }

    Some(IndicatorSeries {
        indicator_type: IndicatorType::Volatility(period),
        warmup: period,
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn make_bars(prices: &[f64]) -> Vec<OhlcvBar> {
        prices
            .iter()
            .enumerate()
            .map(|(i, &close)| OhlcvBar {
                timestamp: i as i64 * 300,
                open: close,
                high: close,
                low: close,
                close,
                volume: 1000.0,
            })
            .collect()
    }

    #[test]
    fn volatility_warmup() {
        let series = calculate_volatility(&make_bars(&[1.0, 2.0, 3.0, 4.0]), 2, None).unwrap();
        assert!(series.get(0).is_none());
        assert!(series.get(1).is_none());
        assert!(series.get(2).is_some());
    }

    #[test]
    fn volatility_alternating_log_returns() {
        let e = std::f64::consts::E;
        let bars = make_bars(&[1.0, e, 1.0, e]);

        let raw = calculate_volatility(&bars, 2, None).unwrap();
        assert_relative_eq!(raw.get(2).unwrap(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(raw.get(3).unwrap(), 1.0, epsilon = 1e-12);

        let annual = calculate_volatility(&bars, 2, Some(4.0)).unwrap();
        assert_relative_eq!(annual.get(3).unwrap(), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn volatility_constant_growth_is_zero() {
        let prices: Vec<f64> = (0..10).map(|i| 100.0 * 1.01f64.powi(i)).collect();
        let series = calculate_volatility(&make_bars(&prices), 5, None).unwrap();
        assert!(series.get(9).unwrap().abs() < 1e-12);
    }

    #[test]
    fn volatility_non_positive_close_gives_zero_return() {
        let series = calculate_volatility(&make_bars(&[0.0, 0.0, 0.0]), 2, None).unwrap();
        assert_eq!(series.get(2), Some(0.0));
    }

    #[test]
    fn volatility_too_few_bars() {
        assert!(calculate_volatility(&make_bars(&[1.0, 2.0]), 2, None).is_none());
        assert!(calculate_volatility(&make_bars(&[1.0, 2.0]), 0, None).is_none());
    }
}
