#![allow(dead_code)]

pub use rsitrader::domain::ohlcv::OhlcvBar;
use rsitrader::domain::error::TraderError;
use rsitrader::domain::strategy::StrategyConfig;
use rsitrader::ports::data_port::DataPort;
use std::collections::HashMap;
use std::path::Path;

pub const BASE_TIME: i64 = 1_704_067_200;
pub const BAR_SECONDS: i64 = 60;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<OhlcvBar>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<OhlcvBar>) -> Self {
        self.data.insert(symbol.to_string(), bars);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }

    fn check(&self, symbol: &str) -> Result<&Vec<OhlcvBar>, TraderError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(TraderError::Database {
                reason: reason.clone(),
            });
        }
        self.data
            .get(symbol)
            .ok_or_else(|| TraderError::UnknownInstrument {
                symbol: symbol.to_string(),
            })
    }
}

impl DataPort for MockDataPort {
    fn load_bars(
        &self,
        symbol: &str,
        start: Option<i64>,
        end: Option<i64>,
    ) -> Result<Vec<OhlcvBar>, TraderError> {
        Ok(self
            .check(symbol)?
            .iter()
            .filter(|b| start.is_none_or(|s| b.timestamp >= s))
            .filter(|b| end.is_none_or(|e| b.timestamp <= e))
            .copied()
            .collect())
    }

    fn list_symbols(&self) -> Result<Vec<String>, TraderError> {
        let mut symbols: Vec<String> = self.data.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }

    fn get_data_range(&self, symbol: &str) -> Result<Option<(i64, i64, usize)>, TraderError> {
        let bars = self.check(symbol)?;
        match (bars.first(), bars.last()) {
            (Some(first), Some(last)) => Ok(Some((first.timestamp, last.timestamp, bars.len()))),
            _ => Ok(None),
        }
    }
}

/// One bar per close, `BAR_SECONDS` apart, open/high/low equal to the close.
pub fn bars_from_closes(closes: &[f64]) -> Vec<OhlcvBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| OhlcvBar {
            timestamp: BASE_TIME + i as i64 * BAR_SECONDS,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1000.0,
        })
        .collect()
}

pub fn flat_bars(n: usize, price: f64) -> Vec<OhlcvBar> {
    bars_from_closes(&vec![price; n])
}

pub fn rising_bars(n: usize) -> Vec<OhlcvBar> {
    let closes: Vec<f64> = (0..n).map(|i| 100.0 + i as f64).collect();
    bars_from_closes(&closes)
}

/// Oscillating series with drift and uneven volume, enough to trigger both
/// entries and exits.
pub fn wave_bars(n: usize) -> Vec<OhlcvBar> {
    (0..n)
        .map(|i| {
            let t = i as f64;
            let close = 100.0 + (t * 0.21).sin() * 6.0 + (t * 0.047).cos() * 3.0 + t * 0.01;
            OhlcvBar {
                timestamp: BASE_TIME + i as i64 * BAR_SECONDS,
                open: close - 0.2,
                high: close + 0.6,
                low: close - 0.6,
                close,
                volume: 800.0 + ((i * 37) % 11) as f64 * 120.0,
            }
        })
        .collect()
}

/// Trend preset that enters on any bar with the EMAs aligned, long only.
pub fn lenient_strategy() -> StrategyConfig {
    StrategyConfig {
        rsi_oversold_long: 101.0,
        rsi_entry_long: 0.0,
        volume_ratio_threshold: 0.0,
        scale_in_min_profit: 0.0,
        allow_short: false,
        ..StrategyConfig::default()
    }
}

pub fn write_csv(dir: &Path, symbol: &str, bars: &[OhlcvBar]) {
    let mut content = String::from("timestamp,open,high,low,close,volume\n");
    for b in bars {
        content.push_str(&format!(
            "{},{},{},{},{},{}\n",
            b.timestamp, b.open, b.high, b.low, b.close, b.volume
        ));
    }
    std::fs::write(dir.join(format!("{symbol}.csv")), content).unwrap();
}
