//! Multi-tranche position tracking.
//!
//! A position is built from one or more tranches on the same side. The
//! total amount always equals the sum of tranche amounts and the average
//! price is volume-weighted over the tranches currently held.

use std::fmt;

/// Residual amount below which a position counts as closed.
pub const DUST_AMOUNT: f64 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1 for long, -1 for short.
    pub fn direction(self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "LONG"),
            Side::Short => write!(f, "SHORT"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tranche {
    pub entry_time: i64,
    pub entry_price: f64,
    pub amount: f64,
    /// 1-based batch ordinal.
    pub batch: usize,
}

/// Price range against which partial-exit progress is measured.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfitBand {
    pub floor: f64,
    pub ceiling: f64,
}

impl ProfitBand {
    /// Fraction of the way from floor to ceiling; may be negative or above 1.
    pub fn progress(&self, price: f64) -> f64 {
        let width = self.ceiling - self.floor;
        if width == 0.0 {
            0.0
        } else {
            (price - self.floor) / width
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub side: Side,
    pub entry_time: i64,
    pub band: Option<ProfitBand>,
    pub last_scale_time: i64,
    pub batch_count: usize,
    pub exit_count: usize,
    /// Time at which scheduled partial exits become eligible.
    pub exit_start_time: i64,
    tranches: Vec<Tranche>,
    total_amount: f64,
    avg_price: f64,
}

/// Outcome of a FIFO liquidation: the tranche list that remains and the
/// slices that were closed.
#[derive(Debug, Clone, PartialEq)]
pub struct Liquidation {
    pub remaining: Vec<Tranche>,
    pub closed: Vec<Tranche>,
}

impl Position {
    pub fn open(
        side: Side,
        time: i64,
        price: f64,
        amount: f64,
        band: Option<ProfitBand>,
        start_exit_time: i64,
    ) -> Self {
        Self {
            side,
            entry_time: time,
            band,
            last_scale_time: time,
            batch_count: 1,
            exit_count: 0,
            exit_start_time: time + start_exit_time,
            tranches: vec![Tranche {
                entry_time: time,
                entry_price: price,
                amount,
                batch: 1,
            }],
            total_amount: amount,
            avg_price: price,
        }
    }

    pub fn tranches(&self) -> &[Tranche] {
        &self.tranches
    }

    pub fn total_amount(&self) -> f64 {
        self.total_amount
    }

    pub fn avg_price(&self) -> f64 {
        self.avg_price
    }

    pub fn is_empty(&self) -> bool {
        self.total_amount < DUST_AMOUNT
    }

    /// Append a scale-in tranche and return it.
    pub fn add_tranche(&mut self, time: i64, price: f64, amount: f64) -> Tranche {
        self.batch_count += 1;
        let tranche = Tranche {
            entry_time: time,
            entry_price: price,
            amount,
            batch: self.batch_count,
        };
        self.tranches.push(tranche);

        let previous = self.total_amount;
        self.total_amount = self.tranches.iter().map(|t| t.amount).sum();
        if self.total_amount > 0.0 {
            self.avg_price = (self.avg_price * previous + price * amount) / self.total_amount;
        }
        self.last_scale_time = time;
        tranche
    }

    /// Split off `amount` from the oldest tranches first without mutating
    /// the position. A tranche straddling the boundary is split in two.
    pub fn liquidate_fifo(&self, amount: f64) -> Liquidation {
        let mut remaining = Vec::with_capacity(self.tranches.len());
        let mut closed = Vec::new();
        let mut left = amount.max(0.0);

        for tranche in &self.tranches {
            if left <= 0.0 || tranche.amount <= 0.0 {
                remaining.push(*tranche);
                continue;
            }

            if tranche.amount <= left {
                closed.push(*tranche);
                left -= tranche.amount;
            } else {
                closed.push(Tranche {
                    amount: left,
                    ..*tranche
                });
                remaining.push(Tranche {
                    amount: tranche.amount - left,
                    ..*tranche
                });
                left = 0.0;
            }
        }

        Liquidation { remaining, closed }
    }

    /// Install a new tranche list, recomputing total and average price.
    pub fn replace_tranches(&mut self, tranches: Vec<Tranche>) {
        self.total_amount = tranches.iter().map(|t| t.amount).sum();
        self.avg_price = if self.total_amount > 0.0 {
            tranches
                .iter()
                .map(|t| t.entry_price * t.amount)
                .sum::<f64>()
                / self.total_amount
        } else {
            0.0
        };
        self.tranches = tranches;
    }

    /// Remove every tranche, returning them oldest first.
    pub fn drain(&mut self) -> Vec<Tranche> {
        self.total_amount = 0.0;
        std::mem::take(&mut self.tranches)
    }

    /// Return relative to the average price, signed by side.
    pub fn unrealized_return(&self, price: f64) -> f64 {
        if self.avg_price == 0.0 {
            return 0.0;
        }
        self.side.direction() * (price - self.avg_price) / self.avg_price
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.tranches
            .iter()
            .map(|t| self.side.direction() * (price - t.entry_price) * t.amount)
            .sum()
    }

    pub fn holding_time(&self, now: i64) -> i64 {
        now - self.entry_time
    }
}

/// Engine position state; at most one position is open at a time.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum PositionState {
    #[default]
    Flat,
    Open(Position),
}

impl PositionState {
    pub fn is_flat(&self) -> bool {
        matches!(self, PositionState::Flat)
    }

    pub fn position(&self) -> Option<&Position> {
        match self {
            PositionState::Open(p) => Some(p),
            PositionState::Flat => None,
        }
    }
}
