//! Stock flow totals over the movement log.

use ledger_store::{Movement, MovementType};

/// IN and OUT volume over one period. `stock_out` is reported as a
/// positive number of units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PeriodTotals {
    pub stock_in: i64,
    pub stock_out: i64,
    pub adjustments: i64,
    /// Movements of every type.
    pub movement_count: usize,
}

impl PeriodTotals {
    /// Folds one movement in. Totals saturate instead of wrapping.
    pub fn add(&mut self, movement: &Movement) {
        match movement.movement_type {
            MovementType::In => self.stock_in = self.stock_in.saturating_add(movement.quantity),
            MovementType::Out => self.stock_out = self.stock_out.saturating_sub(movement.quantity),
            MovementType::Adjust => {
                self.adjustments = self.adjustments.saturating_add(movement.quantity)
            }
        }
        self.movement_count += 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MovementSummary {
    pub today: PeriodTotals,
    pub last_30_days: PeriodTotals,
}
