//! Backtest engine and event loop.
//!
//! One pass over the bars, strictly in order. For every bar past warm-up:
//! exits on the open position (full-close conditions, then scheduled partial
//! take-profit), then a new entry if flat or a scale-in if not, then
//! balance-curve bookkeeping.

use std::mem;

use tracing::debug;

use super::execution::{opening_fee, realize, tranche_amount};
use super::indicator::IndicatorSet;
use super::ledger::{CloseReason, Ledger, Trade};
use super::ohlcv::{OhlcvBar, recent_range};
use super::position::{Position, PositionState, ProfitBand, Side, Tranche};
use super::signal::{
    Signal, SignalInputs, ema_cross_against, entry_conditions_hold, evaluate_bounce_entry,
    evaluate_entry, evaluate_exit,
};
use super::strategy::{EntryPattern, StrategyConfig, TrendFilter};

/// Five-minute bars per 365-day year.
pub const BARS_PER_YEAR_5M: f64 = 105_120.0;

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub symbol: String,
    pub start_balance: f64,
    pub fee_rate: f64,
    /// Accepted for compatibility with exchange configs; sizing ignores it.
    pub leverage: f64,
    /// Annualization factor for volatility and risk-adjusted metrics.
    pub bars_per_year: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            symbol: "BTCUSDT".into(),
            start_balance: 10_000.0,
            fee_rate: 0.0004,
            leverage: 5.0,
            bars_per_year: BARS_PER_YEAR_5M,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    pub total_trades: usize,
    pub win_trades: usize,
    pub lose_trades: usize,
    pub total_pnl: f64,
    /// Fees attributed to closed trades (both legs).
    pub total_fees: f64,
    /// Fees charged against balance when tranches were opened.
    pub opening_fees: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub max_drawdown: f64,
    pub final_balance: f64,
    pub trades: Vec<Trade>,
    /// Starting balance followed by one value per processed bar.
    pub balance_curve: Vec<f64>,
    /// Position still open when the data ran out.
    pub final_position: PositionState,
}

impl BacktestResult {
    /// Result of a run that processed no bars.
    pub fn empty(start_balance: f64) -> Self {
        Ledger::new(start_balance).into_result(PositionState::Flat)
    }
}

/// Run one backtest. Too few bars for the strategy's warm-up yields
/// [`BacktestResult::empty`].
pub fn run_backtest(
    bars: &[OhlcvBar],
    strategy: &StrategyConfig,
    config: &BacktestConfig,
) -> BacktestResult {
    let warmup = strategy.warmup_bars();
    if bars.len() <= warmup {
        debug!(bars = bars.len(), warmup, "not enough bars, skipping run");
        return BacktestResult::empty(config.start_balance);
    }

    let Some(indicators) = IndicatorSet::compute(bars, strategy) else {
        return BacktestResult::empty(config.start_balance);
    };

    let mut engine = Engine {
        bars,
        strategy,
        config,
        indicators: &indicators,
        ledger: Ledger::new(config.start_balance),
        state: PositionState::Flat,
    };

    for i in warmup..bars.len() {
        engine.step(i);
    }

    engine.ledger.into_result(engine.state)
}

/// Indicator snapshot for bar `i`. `i` must be at least 1 and past every
/// series' warm-up.
pub fn inputs_at(
    bars: &[OhlcvBar],
    indicators: &IndicatorSet,
    strategy: &StrategyConfig,
    i: usize,
) -> SignalInputs {
    let (recent_high, recent_low) = match strategy.trend_filter {
        TrendFilter::Breakout { lookback } => recent_range(bars, i, lookback).unzip(),
        TrendFilter::EmaAlignment => (None, None),
    };

    SignalInputs {
        close: bars[i].close,
        rsi: indicators.rsi.value(i),
        prev_rsi: indicators.rsi.value(i - 1),
        ema_fast: indicators.ema_fast.value(i),
        ema_slow: indicators.ema_slow.value(i),
        prev_ema_fast: indicators.ema_fast.value(i - 1),
        prev_ema_slow: indicators.ema_slow.value(i - 1),
        volume_ratio: indicators.volume_ratio.value(i),
        recent_high,
        recent_low,
    }
}

/// Entry signal for bar `i` under the strategy's entry pattern, together
/// with the profit band a position opened on it would carry.
pub fn entry_signal(
    bars: &[OhlcvBar],
    inputs: &SignalInputs,
    strategy: &StrategyConfig,
    i: usize,
) -> (Signal, Option<ProfitBand>) {
    match strategy.pattern {
        EntryPattern::TrendBreakout => {
            let signal = evaluate_entry(inputs, strategy);
            let band = signal
                .entry_side()
                .filter(|_| strategy.take_profit_pct > 0.0)
                .map(|side| ProfitBand {
                    floor: inputs.close,
                    ceiling: inputs.close * (1.0 + side.direction() * strategy.take_profit_pct),
                });
            (signal, band)
        }
        EntryPattern::DropBounce => {
            let range = recent_range(bars, i, strategy.drop_lookback);
            let signal = evaluate_bounce_entry(inputs, range, strategy);
            let band = range.map(|(high, low)| ProfitBand {
                floor: low,
                ceiling: high,
            });
            (signal, band)
        }
    }
}

/// First full-close condition that holds, in priority order.
fn exit_reason(
    strategy: &StrategyConfig,
    position: &Position,
    bar: &OhlcvBar,
    inputs: &SignalInputs,
) -> Option<CloseReason> {
    let side = position.side;

    if strategy.rsi_exit > 0.0 {
        let stopped = match side {
            Side::Long => inputs.rsi < strategy.rsi_exit,
            Side::Short => inputs.rsi > 100.0 - strategy.rsi_exit,
        };
        if stopped {
            return Some(CloseReason::RsiStop);
        }
    }

    if strategy.max_hold_time > 0 && position.holding_time(bar.timestamp) >= strategy.max_hold_time
    {
        return Some(CloseReason::MaxHoldTime);
    }

    if strategy.exit_on_ema_cross && ema_cross_against(side, inputs) {
        return Some(CloseReason::TrendReversal);
    }

    if strategy.stop_loss_pct > 0.0
        && position.unrealized_return(bar.close) <= -strategy.stop_loss_pct
    {
        return Some(CloseReason::StopLoss);
    }

    if strategy.exit_on_rsi_neutral
        && evaluate_exit(side, inputs.prev_rsi, inputs.rsi) != Signal::None
    {
        return Some(CloseReason::TrendExhaustion);
    }

    None
}

struct Engine<'a> {
    bars: &'a [OhlcvBar],
    strategy: &'a StrategyConfig,
    config: &'a BacktestConfig,
    indicators: &'a IndicatorSet,
    ledger: Ledger,
    state: PositionState,
}

impl Engine<'_> {
    fn step(&mut self, i: usize) {
        let bar = self.bars[i];
        let inputs = inputs_at(self.bars, self.indicators, self.strategy, i);

        if let PositionState::Open(position) = mem::take(&mut self.state) {
            self.state = self.manage_position(position, &bar, &inputs);
        }

        self.state = match mem::take(&mut self.state) {
            PositionState::Flat => self.try_enter(i, &bar, &inputs),
            PositionState::Open(mut position) => {
                self.try_scale_in(&mut position, &bar, &inputs);
                PositionState::Open(position)
            }
        };

        self.ledger.mark_bar();
    }

    fn manage_position(
        &mut self,
        mut position: Position,
        bar: &OhlcvBar,
        inputs: &SignalInputs,
    ) -> PositionState {
        let reason = exit_reason(self.strategy, &position, bar, inputs);

        if let Some(last_partial) = self.take_partial_profits(&mut position, bar) {
            if position.is_empty() {
                self.close_all(&mut position, bar, last_partial);
                return PositionState::Flat;
            }
        }

        match reason {
            Some(reason) => {
                self.close_all(&mut position, bar, reason);
                PositionState::Flat
            }
            None => PositionState::Open(position),
        }
    }

    /// Liquidate every newly due partial-exit slot, oldest tranches first.
    /// Returns the reason of the last slot executed.
    fn take_partial_profits(
        &mut self,
        position: &mut Position,
        bar: &OhlcvBar,
    ) -> Option<CloseReason> {
        let strategy = self.strategy;
        if !strategy.partial_exits_enabled() {
            return None;
        }
        let band = position.band?;

        let progress = band.progress(bar.close);
        if position.holding_time(bar.timestamp) < strategy.start_exit_time
            || progress < strategy.profit_threshold
        {
            return None;
        }

        let due = if strategy.exit_interval > 0 {
            let since_start = (bar.timestamp - position.exit_start_time).max(0);
            (since_start / strategy.exit_interval) as usize + 1
        } else {
            position.exit_count + 1
        };

        let mut last = None;
        while position.exit_count < due && !position.is_empty() {
            let slot = position.exit_count + 1;
            let reason = CloseReason::PartialTakeProfit { slot, progress };
            let liquidation =
                position.liquidate_fifo(position.total_amount() * strategy.exit_percent);

            for tranche in &liquidation.closed {
                self.record(position.side, tranche, bar, reason);
            }
            position.replace_tranches(liquidation.remaining);
            position.exit_count = slot;

            debug!(
                time = bar.timestamp,
                slot,
                progress,
                remaining = position.total_amount(),
                "partial take-profit"
            );
            last = Some(reason);
        }
        last
    }

    fn close_all(&mut self, position: &mut Position, bar: &OhlcvBar, reason: CloseReason) {
        let side = position.side;
        for tranche in position.drain() {
            if tranche.amount > 0.0 {
                self.record(side, &tranche, bar, reason);
            }
        }
        debug!(
            time = bar.timestamp,
            side = %side,
            price = bar.close,
            %reason,
            balance = self.ledger.balance,
            "position closed"
        );
    }

    fn record(
        &mut self,
        side: Side,
        tranche: &Tranche,
        bar: &OhlcvBar,
        reason: CloseReason,
    ) {
        let trade = realize(
            side,
            tranche,
            bar.timestamp,
            bar.close,
            self.config.fee_rate,
            reason,
        );
        self.ledger.record_trade(trade);
    }

    fn try_enter(&mut self, i: usize, bar: &OhlcvBar, inputs: &SignalInputs) -> PositionState {
        let (signal, band) = entry_signal(self.bars, inputs, self.strategy, i);
        let Some(side) = signal.entry_side() else {
            return PositionState::Flat;
        };

        let amount = tranche_amount(self.ledger.balance, self.strategy.first_batch_size, bar.close);
        if amount <= 0.0 {
            return PositionState::Flat;
        }

        self.ledger
            .charge_opening_fee(opening_fee(bar.close, amount, self.config.fee_rate));
        debug!(
            time = bar.timestamp,
            side = %side,
            price = bar.close,
            amount,
            rsi = inputs.rsi,
            "position opened"
        );

        PositionState::Open(Position::open(
            side,
            bar.timestamp,
            bar.close,
            amount,
            band,
            self.strategy.start_exit_time,
        ))
    }

    fn try_scale_in(&mut self, position: &mut Position, bar: &OhlcvBar, inputs: &SignalInputs) {
        let strategy = self.strategy;
        if position.batch_count >= strategy.max_batches {
            return;
        }
        if bar.timestamp - position.last_scale_time < strategy.batch_interval {
            return;
        }
        if !entry_conditions_hold(position.side, inputs, strategy) {
            return;
        }
        if strategy.scale_in_min_profit > 0.0
            && position.unrealized_return(bar.close) < strategy.scale_in_min_profit
        {
            return;
        }

        let amount = tranche_amount(self.ledger.balance, strategy.other_batch_size, bar.close);
        if amount <= 0.0 {
            return;
        }

        self.ledger
            .charge_opening_fee(opening_fee(bar.close, amount, self.config.fee_rate));
        let tranche = position.add_tranche(bar.timestamp, bar.close, amount);
        debug!(
            time = bar.timestamp,
            batch = tranche.batch,
            price = bar.close,
            amount,
            avg_price = position.avg_price(),
            "scaled in"
        );
    }
}
