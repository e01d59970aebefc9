//! Core domain types and logic.

pub mod ohlcv;
pub mod indicator;
pub mod signal;
pub mod strategy;
pub mod position;
pub mod execution;
pub mod ledger;
pub mod backtest;
pub mod metrics;
pub mod config_validation;
pub mod sweep;
pub mod error;
