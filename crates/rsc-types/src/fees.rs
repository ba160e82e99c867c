use crate::amount::RscAmount;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Fractional fee rates applied to gross amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub rh_pct: Decimal,
    pub dao_pct: Decimal,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            rh_pct: Decimal::new(7, 2),
            dao_pct: Decimal::new(2, 2),
        }
    }
}

impl FeeSchedule {
    pub fn zero() -> Self {
        Self {
            rh_pct: Decimal::ZERO,
            dao_pct: Decimal::ZERO,
        }
    }

    pub fn total_pct(&self) -> Decimal {
        self.rh_pct + self.dao_pct
    }

    pub fn is_valid(&self) -> bool {
        self.rh_pct >= Decimal::ZERO && self.dao_pct >= Decimal::ZERO && self.total_pct() < Decimal::ONE
    }
}

/// Fees owed on a gross amount. `total == rh + dao` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub total: RscAmount,
    pub rh: RscAmount,
    pub dao: RscAmount,
}

impl FeeBreakdown {
    pub fn zero() -> Self {
        Self {
            total: RscAmount::ZERO,
            rh: RscAmount::ZERO,
            dao: RscAmount::ZERO,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.total.is_zero()
    }
}
