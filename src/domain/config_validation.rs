//! Configuration validation.
//!
//! Range checks on the raw `[backtest]` and `[strategy]` sections before a
//! run, plus the cross-field consistency check the sweep uses to skip
//! combinations.

use chrono::{NaiveDate, NaiveTime};

use crate::domain::backtest::BacktestConfig;
use crate::domain::error::TraderError;
use crate::domain::strategy::{EntryPattern, StrategyConfig};
use crate::ports::config_port::ConfigPort;

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), TraderError> {
    let defaults = BacktestConfig::default();

    let start_balance = config.get_double("backtest", "start_balance", defaults.start_balance);
    if start_balance <= 0.0 {
        return Err(TraderError::invalid(
            "backtest",
            "start_balance",
            "start_balance must be positive",
        ));
    }

    let fee_rate = config.get_double("backtest", "fee_rate", defaults.fee_rate);
    if !(0.0..1.0).contains(&fee_rate) {
        return Err(TraderError::invalid(
            "backtest",
            "fee_rate",
            "fee_rate must be in [0, 1)",
        ));
    }

    let leverage = config.get_double("backtest", "leverage", defaults.leverage);
    if leverage <= 0.0 {
        return Err(TraderError::invalid(
            "backtest",
            "leverage",
            "leverage must be positive",
        ));
    }

    let bars_per_year = config.get_double("backtest", "bars_per_year", defaults.bars_per_year);
    if bars_per_year <= 0.0 {
        return Err(TraderError::invalid(
            "backtest",
            "bars_per_year",
            "bars_per_year must be positive",
        ));
    }

    if config.get_int("backtest", "resample", 1) < 1 {
        return Err(TraderError::invalid(
            "backtest",
            "resample",
            "resample must be at least 1",
        ));
    }

    if let Some(symbol) = config.get_string("backtest", "symbol") {
        if symbol.trim().is_empty() {
            return Err(TraderError::ConfigMissing {
                section: "backtest".to_string(),
                key: "symbol".to_string(),
            });
        }
    }

    validate_dates(config)
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), TraderError> {
    let start = optional_time(config, "start_date")?;
    let end = optional_time(config, "end_date")?;

    if let (Some(start), Some(end)) = (start, end) {
        if start >= end {
            return Err(TraderError::invalid(
                "backtest",
                "start_date",
                "start_date must be before end_date",
            ));
        }
    }
    Ok(())
}

fn optional_time(config: &dyn ConfigPort, key: &str) -> Result<Option<i64>, TraderError> {
    match config.get_string("backtest", key) {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => parse_time_bound(&s).map(Some).ok_or_else(|| {
            TraderError::invalid(
                "backtest",
                key,
                format!("invalid {key} '{s}', expected YYYY-MM-DD or unix seconds"),
            )
        }),
    }
}

/// Parse a `YYYY-MM-DD` date (midnight UTC) or raw unix seconds.
pub fn parse_time_bound(value: &str) -> Option<i64> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<i64>() {
        return Some(seconds);
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN).and_utc().timestamp())
}

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), TraderError> {
    let pattern = match config.get_string("strategy", "pattern") {
        Some(s) => s
            .parse::<EntryPattern>()
            .map_err(|reason| TraderError::invalid("strategy", "pattern", reason))?,
        None => EntryPattern::TrendBreakout,
    };
    let preset = StrategyConfig::preset(pattern);

    if let Some(filter) = config.get_string("strategy", "trend_filter") {
        let filter = filter.trim().to_ascii_lowercase();
        if filter != "ema" && filter != "breakout" {
            return Err(TraderError::invalid(
                "strategy",
                "trend_filter",
                "trend_filter must be ema or breakout",
            ));
        }
        if filter == "breakout" && config.get_int("strategy", "breakout_lookback", 20) < 1 {
            return Err(TraderError::invalid(
                "strategy",
                "breakout_lookback",
                "breakout_lookback must be at least 1",
            ));
        }
    }

    for (key, default) in [
        ("rsi_period", preset.rsi_period),
        ("ema_fast", preset.ema_fast),
        ("ema_slow", preset.ema_slow),
        ("volume_period", preset.volume_period),
        ("volatility_period", preset.volatility_period),
        ("max_batches", preset.max_batches),
    ] {
        if config.get_int("strategy", key, default as i64) < 1 {
            return Err(TraderError::invalid(
                "strategy",
                key,
                format!("{key} must be at least 1"),
            ));
        }
    }

    if pattern == EntryPattern::DropBounce
        && config.get_int("strategy", "drop_lookback", preset.drop_lookback as i64) < 1
    {
        return Err(TraderError::invalid(
            "strategy",
            "drop_lookback",
            "drop_lookback must be at least 1 for the bounce pattern",
        ));
    }

    for (key, default) in [
        ("rsi_oversold_long", preset.rsi_oversold_long),
        ("rsi_entry_long", preset.rsi_entry_long),
        ("rsi_overbought_short", preset.rsi_overbought_short),
        ("rsi_entry_short", preset.rsi_entry_short),
        ("rsi_exit", preset.rsi_exit),
    ] {
        let value = config.get_double("strategy", key, default);
        if !(0.0..=100.0).contains(&value) {
            return Err(TraderError::invalid(
                "strategy",
                key,
                format!("{key} must be between 0 and 100"),
            ));
        }
    }

    for (key, default) in [
        ("first_batch_size", preset.first_batch_size),
        ("other_batch_size", preset.other_batch_size),
    ] {
        let value = config.get_double("strategy", key, default);
        if value <= 0.0 || value > 1.0 {
            return Err(TraderError::invalid(
                "strategy",
                key,
                format!("{key} must be in (0, 1]"),
            ));
        }
    }

    let exit_percent = config.get_double("strategy", "exit_percent", preset.exit_percent);
    if !(0.0..=1.0).contains(&exit_percent) {
        return Err(TraderError::invalid(
            "strategy",
            "exit_percent",
            "exit_percent must be between 0 and 1",
        ));
    }

    for (key, default) in [
        ("volume_ratio_threshold", preset.volume_ratio_threshold),
        ("drop_threshold", preset.drop_threshold),
        ("scale_in_min_profit", preset.scale_in_min_profit),
        ("stop_loss_pct", preset.stop_loss_pct),
        ("profit_threshold", preset.profit_threshold),
        ("take_profit_pct", preset.take_profit_pct),
    ] {
        if config.get_double("strategy", key, default) < 0.0 {
            return Err(TraderError::invalid(
                "strategy",
                key,
                format!("{key} must be non-negative"),
            ));
        }
    }

    for (key, default) in [
        ("batch_interval", preset.batch_interval),
        ("max_hold_time", preset.max_hold_time),
        ("start_exit_time", preset.start_exit_time),
        ("exit_interval", preset.exit_interval),
    ] {
        if config.get_int("strategy", key, default) < 0 {
            return Err(TraderError::invalid(
                "strategy",
                key,
                format!("{key} must be non-negative"),
            ));
        }
    }

    Ok(())
}

/// Cross-field checks: each oversold/overbought threshold must sit strictly
/// beyond its entry threshold and the fast EMA must be faster than the slow.
pub fn check_consistency(strategy: &StrategyConfig) -> Result<(), TraderError> {
    if strategy.rsi_oversold_long >= strategy.rsi_entry_long {
        return Err(TraderError::ConfigurationInconsistency {
            reason: format!(
                "rsi_oversold_long ({}) must be below rsi_entry_long ({})",
                strategy.rsi_oversold_long, strategy.rsi_entry_long
            ),
        });
    }
    if strategy.allow_short && strategy.rsi_overbought_short <= strategy.rsi_entry_short {
        return Err(TraderError::ConfigurationInconsistency {
            reason: format!(
                "rsi_overbought_short ({}) must be above rsi_entry_short ({})",
                strategy.rsi_overbought_short, strategy.rsi_entry_short
            ),
        });
    }
    if strategy.ema_fast >= strategy.ema_slow {
        return Err(TraderError::ConfigurationInconsistency {
            reason: format!(
                "ema_fast ({}) must be shorter than ema_slow ({})",
                strategy.ema_fast, strategy.ema_slow
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapConfig(HashMap<(String, String), String>);

    impl MapConfig {
        fn new(entries: &[(&str, &str, &str)]) -> Self {
            MapConfig(
                entries
                    .iter()
                    .map(|(s, k, v)| ((s.to_string(), k.to_string()), v.to_string()))
                    .collect(),
            )
        }
    }

    impl ConfigPort for MapConfig {
        fn get_string(&self, section: &str, key: &str) -> Option<String> {
            self.0.get(&(section.to_string(), key.to_string())).cloned()
        }
        fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
            self.get_string(section, key)
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        }
        fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
            self.get_string(section, key)
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        }
        fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
            self.get_string(section, key)
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        }
    }

    #[test]
    fn empty_config_is_valid() {
        let config = MapConfig::new(&[]);
        assert!(validate_backtest_config(&config).is_ok());
        assert!(validate_strategy_config(&config).is_ok());
    }

    #[test]
    fn negative_balance_rejected() {
        let config = MapConfig::new(&[("backtest", "start_balance", "-1")]);
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(matches!(
            err,
            TraderError::ConfigInvalid { ref key, .. } if key == "start_balance"
        ));
    }

    #[test]
    fn fee_rate_range() {
        let config = MapConfig::new(&[("backtest", "fee_rate", "1.5")]);
        assert!(validate_backtest_config(&config).is_err());
    }

    #[test]
    fn dates_must_be_ordered() {
        let config = MapConfig::new(&[
            ("backtest", "start_date", "2024-02-01"),
            ("backtest", "end_date", "2024-01-01"),
        ]);
        assert!(validate_backtest_config(&config).is_err());

        let config = MapConfig::new(&[("backtest", "start_date", "01/02/2024")]);
        assert!(validate_backtest_config(&config).is_err());
    }

    #[test]
    fn parse_time_bound_formats() {
        assert_eq!(parse_time_bound("2024-01-01"), Some(1_704_067_200));
        assert_eq!(parse_time_bound(" 1704067200 "), Some(1_704_067_200));
        assert_eq!(parse_time_bound("yesterday"), None);
    }

    #[test]
    fn unknown_pattern_rejected() {
        let config = MapConfig::new(&[("strategy", "pattern", "grid")]);
        let err = validate_strategy_config(&config).unwrap_err();
        assert!(matches!(err, TraderError::ConfigInvalid { ref key, .. } if key == "pattern"));
    }

    #[test]
    fn zero_period_rejected() {
        let config = MapConfig::new(&[("strategy", "rsi_period", "0")]);
        assert!(validate_strategy_config(&config).is_err());
    }

    #[test]
    fn batch_size_range() {
        let config = MapConfig::new(&[("strategy", "first_batch_size", "1.2")]);
        assert!(validate_strategy_config(&config).is_err());
    }

    #[test]
    fn bounce_needs_drop_lookback() {
        let config = MapConfig::new(&[
            ("strategy", "pattern", "bounce"),
            ("strategy", "drop_lookback", "0"),
        ]);
        assert!(validate_strategy_config(&config).is_err());
    }

    #[test]
    fn consistency_of_presets() {
        assert!(check_consistency(&StrategyConfig::default()).is_ok());
        assert!(check_consistency(&StrategyConfig::bounce()).is_ok());
    }

    #[test]
    fn oversold_must_be_below_entry() {
        let s = StrategyConfig {
            rsi_oversold_long: 50.0,
            rsi_entry_long: 50.0,
            ..StrategyConfig::default()
        };
        assert!(matches!(
            check_consistency(&s),
            Err(TraderError::ConfigurationInconsistency { .. })
        ));
    }

    #[test]
    fn ema_order_checked() {
        let s = StrategyConfig {
            ema_fast: 20,
            ema_slow: 14,
            ..StrategyConfig::default()
        };
        assert!(check_consistency(&s).is_err());
    }

    #[test]
    fn short_thresholds_ignored_when_long_only() {
        let s = StrategyConfig {
            allow_short: false,
            rsi_overbought_short: 40.0,
            rsi_entry_short: 50.0,
            ..StrategyConfig::default()
        };
        assert!(check_consistency(&s).is_ok());
    }
}
