//! Order adapter that logs instead of trading.
//!
//! Fills are simulated at the request's reference price.

use tracing::info;

use crate::domain::signal::Signal;
use crate::ports::order_port::{OrderOutcome, OrderPort, OrderRequest};

#[derive(Debug, Default)]
pub struct DryRunOrderAdapter;

impl DryRunOrderAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl OrderPort for DryRunOrderAdapter {
    fn execute(&self, request: &OrderRequest) -> OrderOutcome {
        if request.signal == Signal::None {
            return OrderOutcome::Failed {
                reason: "no signal to execute".into(),
            };
        }
        if !(request.price > 0.0) {
            return OrderOutcome::Failed {
                reason: format!("invalid reference price {}", request.price),
            };
        }
        if !(request.notional > 0.0) {
            return OrderOutcome::Failed {
                reason: format!("invalid notional {}", request.notional),
            };
        }

        let amount = request.notional / request.price;
        info!(
            symbol = %request.symbol,
            signal = ?request.signal,
            amount,
            price = request.price,
            "[dry-run] order filled"
        );

        OrderOutcome::Completed {
            signal: request.signal,
            amount,
            price: request.price,
        }
    }
}
