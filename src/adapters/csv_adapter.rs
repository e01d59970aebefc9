//! CSV file data adapter.
//!
//! One file per symbol, `<base>/<SYMBOL>.csv`, with the header
//! `timestamp,open,high,low,close,volume` and unix-second timestamps.

use crate::domain::error::TraderError;
use crate::domain::ohlcv::OhlcvBar;
use crate::ports::data_port::DataPort;
use std::fs;
use std::path::PathBuf;

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", symbol))
    }

    fn read_all(&self, symbol: &str) -> Result<Vec<OhlcvBar>, TraderError> {
        let path = self.csv_path(symbol);
        if !path.is_file() {
            return Err(TraderError::UnknownInstrument {
                symbol: symbol.to_string(),
            });
        }

        let content = fs::read_to_string(&path).map_err(|e| TraderError::Database {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut bars = Vec::new();

        for (line, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| TraderError::Database {
                reason: format!("CSV parse error: {}", e),
            })?;

            let timestamp: i64 = field(&record, 0, "timestamp", line)?
                .parse()
                .map_err(|e| TraderError::Database {
                    reason: format!("row {}: invalid timestamp: {}", line + 1, e),
                })?;

            bars.push(OhlcvBar {
                timestamp,
                open: number(&record, 1, "open", line)?,
                high: number(&record, 2, "high", line)?,
                low: number(&record, 3, "low", line)?,
                close: number(&record, 4, "close", line)?,
                volume: number(&record, 5, "volume", line)?,
            });
        }

        bars.sort_by_key(|b| b.timestamp);
        Ok(bars)
    }
}

fn field<'r>(
    record: &'r csv::StringRecord,
    index: usize,
    name: &str,
    line: usize,
) -> Result<&'r str, TraderError> {
    record
        .get(index)
        .map(str::trim)
        .ok_or_else(|| TraderError::Database {
            reason: format!("row {}: missing {} column", line + 1, name),
        })
}

fn number(
    record: &csv::StringRecord,
    index: usize,
    name: &str,
    line: usize,
) -> Result<f64, TraderError> {
    field(record, index, name, line)?
        .parse()
        .map_err(|e| TraderError::Database {
            reason: format!("row {}: invalid {} value: {}", line + 1, name, e),
        })
}

impl DataPort for CsvAdapter {
    fn load_bars(
        &self,
        symbol: &str,
        start: Option<i64>,
        end: Option<i64>,
    ) -> Result<Vec<OhlcvBar>, TraderError> {
        let mut bars = self.read_all(symbol)?;
        bars.retain(|b| {
            start.is_none_or(|s| b.timestamp >= s) && end.is_none_or(|e| b.timestamp <= e)
        });
        Ok(bars)
    }

    fn list_symbols(&self) -> Result<Vec<String>, TraderError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| TraderError::Database {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let mut symbols = Vec::new();

        for entry in entries {
            let entry = entry.map_err(|e| TraderError::Database {
                reason: format!("directory entry error: {}", e),
            })?;

            let name = entry.file_name();
            let name_str = name.to_string_lossy();

            if let Some(symbol) = name_str.strip_suffix(".csv") {
                symbols.push(symbol.to_string());
            }
        }

        symbols.sort();
        Ok(symbols)
    }

    fn get_data_range(&self, symbol: &str) -> Result<Option<(i64, i64, usize)>, TraderError> {
        let bars = self.read_all(symbol)?;
        match (bars.first(), bars.last()) {
            (Some(first), Some(last)) => Ok(Some((first.timestamp, last.timestamp, bars.len()))),
            _ => Ok(None),
        }
    }
}
