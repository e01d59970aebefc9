//! Order dispatch port trait.

use crate::domain::signal::Signal;

#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub signal: Signal,
    /// Reference price the signal was evaluated at.
    pub price: f64,
    /// Quote-currency value to trade.
    pub notional: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderOutcome {
    Completed { signal: Signal, amount: f64, price: f64 },
    Failed { reason: String },
}

pub trait OrderPort {
    fn execute(&self, request: &OrderRequest) -> OrderOutcome;
}
