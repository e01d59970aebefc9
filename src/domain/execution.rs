//! Fill simulation at the bar close.
//!
//! Sizing, opening fees and tranche realization. Fills are assumed at the
//! close with no slippage.

use super::ledger::{CloseReason, Trade};
use super::position::{Side, Tranche};

/// Fee charged when a tranche is opened.
pub fn opening_fee(price: f64, amount: f64, fee_rate: f64) -> f64 {
    price * amount * fee_rate
}

/// Base-asset amount for committing `batch_size` of `balance` at `price`.
/// Returns 0 for a non-positive price or balance.
pub fn tranche_amount(balance: f64, batch_size: f64, price: f64) -> f64 {
    if price <= 0.0 || balance <= 0.0 {
        return 0.0;
    }
    balance * batch_size / price
}

/// Close `tranche` at `exit_price`.
///
/// Gross = (exit - entry) * amount, negated for short.
/// Fee = (entry + exit) * amount * fee_rate. PnL is net of the fee.
pub fn realize(
    side: Side,
    tranche: &Tranche,
    exit_time: i64,
    exit_price: f64,
    fee_rate: f64,
    reason: CloseReason,
) -> Trade {
    let gross = side.direction() * (exit_price - tranche.entry_price) * tranche.amount;
    let fee = (tranche.entry_price + exit_price) * tranche.amount * fee_rate;

    Trade {
        side,
        entry_time: tranche.entry_time,
        exit_time,
        entry_price: tranche.entry_price,
        exit_price,
        amount: tranche.amount,
        batch: tranche.batch,
        pnl: gross - fee,
        fee,
        reason,
    }
}
