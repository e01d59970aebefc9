//! SQLite kline store adapter.
//!
//! Bars live in `klines_futures`, keyed by a numeric symbol id and a
//! unix-second timestamp. Prices and volumes are stored as integers scaled
//! by [`PRICE_SCALE`].

use crate::domain::error::TraderError;
use crate::domain::ohlcv::OhlcvBar;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, params_from_iter};
use std::path::Path;

pub const PRICE_SCALE: f64 = 1e8;

const SYMBOLS: [(&str, i64); 4] = [
    ("BTCUSDT", 1),
    ("ETHUSDT", 2),
    ("BNBUSDT", 3),
    ("SOLUSDT", 4),
];

pub fn symbol_id(symbol: &str) -> Option<i64> {
    SYMBOLS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(symbol))
        .map(|&(_, id)| id)
}

fn symbol_name(id: i64) -> Option<&'static str> {
    SYMBOLS
        .iter()
        .find(|&&(_, sid)| sid == id)
        .map(|&(name, _)| name)
}

fn scale(value: f64) -> i64 {
    (value * PRICE_SCALE).round() as i64
}

fn unscale(value: i64) -> f64 {
    value as f64 / PRICE_SCALE
}

fn query_error(e: rusqlite::Error) -> TraderError {
    TraderError::DatabaseQuery {
        reason: e.to_string(),
    }
}

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, TraderError> {
        let db_path =
            config
                .get_string("data", "sqlite_path")
                .ok_or_else(|| TraderError::ConfigMissing {
                    section: "data".into(),
                    key: "sqlite_path".into(),
                })?;

        let pool_size = config.get_int("data", "sqlite_pool_size", 4).max(1) as u32;
        Self::open(&db_path, pool_size)
    }

    pub fn open<P: AsRef<Path>>(path: P, pool_size: u32) -> Result<Self, TraderError> {
        let path = path.as_ref();
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(|e: r2d2::Error| TraderError::Database {
                reason: format!("failed to open {}: {}", path.display(), e),
            })?;

        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, TraderError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e: r2d2::Error| TraderError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    fn connection(&self) -> Result<PooledConnection<SqliteConnectionManager>, TraderError> {
        self.pool.get().map_err(|e: r2d2::Error| TraderError::Database {
            reason: e.to_string(),
        })
    }

    fn require_id(symbol: &str) -> Result<i64, TraderError> {
        symbol_id(symbol).ok_or_else(|| TraderError::UnknownInstrument {
            symbol: symbol.to_string(),
        })
    }

    pub fn initialize_schema(&self) -> Result<(), TraderError> {
        let conn = self.connection()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS klines_futures (
                symbol INTEGER NOT NULL,
                ts INTEGER NOT NULL,
                o INTEGER NOT NULL,
                h INTEGER NOT NULL,
                l INTEGER NOT NULL,
                c INTEGER NOT NULL,
                v INTEGER NOT NULL,
                PRIMARY KEY (symbol, ts)
            );",
        )
        .map_err(query_error)?;

        Ok(())
    }

    pub fn insert_bars(&self, symbol: &str, bars: &[OhlcvBar]) -> Result<(), TraderError> {
        let id = Self::require_id(symbol)?;
        let mut conn = self.connection()?;
        let tx = conn.transaction().map_err(query_error)?;

        for bar in bars {
            tx.execute(
                "INSERT OR REPLACE INTO klines_futures (symbol, ts, o, h, l, c, v)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id,
                    bar.timestamp,
                    scale(bar.open),
                    scale(bar.high),
                    scale(bar.low),
                    scale(bar.close),
                    scale(bar.volume)
                ],
            )
            .map_err(query_error)?;
        }

        tx.commit().map_err(query_error)?;
        Ok(())
    }
}

impl DataPort for SqliteAdapter {
    fn load_bars(
        &self,
        symbol: &str,
        start: Option<i64>,
        end: Option<i64>,
    ) -> Result<Vec<OhlcvBar>, TraderError> {
        let id = Self::require_id(symbol)?;
        let conn = self.connection()?;

        let mut query =
            String::from("SELECT ts, o, h, l, c, v FROM klines_futures WHERE symbol = ?");
        let mut bounds = vec![id];
        if let Some(start) = start {
            query.push_str(" AND ts >= ?");
            bounds.push(start);
        }
        if let Some(end) = end {
            query.push_str(" AND ts <= ?");
            bounds.push(end);
        }
        query.push_str(" ORDER BY ts ASC");

        let mut stmt = conn.prepare(&query).map_err(query_error)?;
        let rows = stmt
            .query_map(params_from_iter(bounds.iter()), |row| {
                Ok(OhlcvBar {
                    timestamp: row.get(0)?,
                    open: unscale(row.get(1)?),
                    high: unscale(row.get(2)?),
                    low: unscale(row.get(3)?),
                    close: unscale(row.get(4)?),
                    volume: unscale(row.get(5)?),
                })
            })
            .map_err(query_error)?;

        let mut bars = Vec::new();
        for row in rows {
            bars.push(row.map_err(query_error)?);
        }

        Ok(bars)
    }

    fn list_symbols(&self) -> Result<Vec<String>, TraderError> {
        let conn = self.connection()?;

        let mut stmt = conn
            .prepare("SELECT DISTINCT symbol FROM klines_futures ORDER BY symbol")
            .map_err(query_error)?;

        let rows = stmt
            .query_map([], |row| row.get::<_, i64>(0))
            .map_err(query_error)?;

        let mut symbols = Vec::new();
        for row in rows {
            let id = row.map_err(query_error)?;
            match symbol_name(id) {
                Some(name) => symbols.push(name.to_string()),
                None => symbols.push(format!("#{}", id)),
            }
        }

        Ok(symbols)
    }

    fn get_data_range(&self, symbol: &str) -> Result<Option<(i64, i64, usize)>, TraderError> {
        let id = Self::require_id(symbol)?;
        let conn = self.connection()?;

        let result: (Option<i64>, Option<i64>, i64) = conn
            .query_row(
                "SELECT MIN(ts), MAX(ts), COUNT(*) FROM klines_futures WHERE symbol = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(query_error)?;

        match result {
            (Some(min), Some(max), count) if count > 0 => Ok(Some((min, max, count as usize))),
            _ => Ok(None),
        }
    }
}
