//! INI file configuration adapter.

use crate::domain::backtest::BacktestConfig;
use crate::domain::error::TraderError;
use crate::domain::strategy::{EntryPattern, StrategyConfig, TrendFilter};
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, TraderError> {
        let path = path.as_ref();
        let mut config = Ini::new();
        config.load(path).map_err(|reason| TraderError::ConfigParse {
            file: path.display().to_string(),
            reason,
        })?;
        Ok(Self { config })
    }

    /// No sections; every lookup falls back to its default.
    pub fn empty() -> Self {
        Self { config: Ini::new() }
    }

    pub fn from_string(content: &str) -> Result<Self, String> {
        let mut config = Ini::new();
        config.read(content.to_string())?;
        Ok(Self { config })
    }

    /// Configuration mirroring the given settings, for `init-config`.
    pub fn from_settings(backtest: &BacktestConfig, strategy: &StrategyConfig) -> Self {
        let mut adapter = Self::empty();

        adapter.set("backtest", "symbol", &backtest.symbol);
        adapter.set("backtest", "start_balance", backtest.start_balance);
        adapter.set("backtest", "fee_rate", backtest.fee_rate);
        adapter.set("backtest", "leverage", backtest.leverage);
        adapter.set("backtest", "bars_per_year", backtest.bars_per_year);
        // the trend preset runs on 1m bars grouped into 5m
        let resample = match strategy.pattern {
            EntryPattern::TrendBreakout => 5,
            EntryPattern::DropBounce => 1,
        };
        adapter.set("backtest", "resample", resample);

        adapter.set("data", "sqlite_path", "data/klines.db");
        adapter.set("data", "sqlite_pool_size", 4);

        let s = strategy;
        adapter.set("strategy", "name", &s.name);
        adapter.set("strategy", "pattern", s.pattern);
        match s.trend_filter {
            TrendFilter::EmaAlignment => adapter.set("strategy", "trend_filter", "ema"),
            TrendFilter::Breakout { lookback } => {
                adapter.set("strategy", "trend_filter", "breakout");
                adapter.set("strategy", "breakout_lookback", lookback);
            }
        }
        adapter.set("strategy", "allow_short", s.allow_short);
        adapter.set("strategy", "rsi_period", s.rsi_period);
        adapter.set("strategy", "ema_fast", s.ema_fast);
        adapter.set("strategy", "ema_slow", s.ema_slow);
        adapter.set("strategy", "volume_period", s.volume_period);
        adapter.set("strategy", "volatility_period", s.volatility_period);
        adapter.set("strategy", "rsi_oversold_long", s.rsi_oversold_long);
        adapter.set("strategy", "rsi_entry_long", s.rsi_entry_long);
        adapter.set("strategy", "rsi_overbought_short", s.rsi_overbought_short);
        adapter.set("strategy", "rsi_entry_short", s.rsi_entry_short);
        adapter.set("strategy", "volume_ratio_threshold", s.volume_ratio_threshold);
        adapter.set("strategy", "drop_lookback", s.drop_lookback);
        adapter.set("strategy", "drop_threshold", s.drop_threshold);
        adapter.set("strategy", "first_batch_size", s.first_batch_size);
        adapter.set("strategy", "other_batch_size", s.other_batch_size);
        adapter.set("strategy", "batch_interval", s.batch_interval);
        adapter.set("strategy", "max_batches", s.max_batches);
        adapter.set("strategy", "scale_in_min_profit", s.scale_in_min_profit);
        adapter.set("strategy", "rsi_exit", s.rsi_exit);
        adapter.set("strategy", "max_hold_time", s.max_hold_time);
        adapter.set("strategy", "exit_on_ema_cross", s.exit_on_ema_cross);
        adapter.set("strategy", "stop_loss_pct", s.stop_loss_pct);
        adapter.set("strategy", "exit_on_rsi_neutral", s.exit_on_rsi_neutral);
        adapter.set("strategy", "profit_threshold", s.profit_threshold);
        adapter.set("strategy", "start_exit_time", s.start_exit_time);
        adapter.set("strategy", "exit_interval", s.exit_interval);
        adapter.set("strategy", "exit_percent", s.exit_percent);
        adapter.set("strategy", "take_profit_pct", s.take_profit_pct);
        adapter.set("strategy", "min_warmup", s.min_warmup);

        adapter.set("sweep", "top", 10);

        adapter
    }

    fn set(&mut self, section: &str, key: &str, value: impl ToString) {
        self.config.set(section, key, Some(value.to_string()));
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), TraderError> {
        self.config.write(path)?;
        Ok(())
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.config
            .getint(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.config
            .getfloat(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.config
            .get(section, key)
            .as_ref()
            .and_then(|v| Self::parse_bool(v))
            .unwrap_or(default)
    }
}
