use crate::tiers::TierTable;
use chrono::NaiveDate;
use rsc_types::{BalanceLot, RscAmount};
use rust_decimal::Decimal;

/// A user's stakeable position on one calendar day.
#[derive(Debug, Clone, PartialEq)]
pub struct StakePosition {
    pub rsc_balance: RscAmount,
    pub weighted_balance: RscAmount,
    /// `weighted / balance`, 1.0 for an empty position.
    pub multiplier: Decimal,
    /// Age of the oldest open lot.
    pub days_held: i64,
}

impl StakePosition {
    pub fn empty() -> Self {
        Self {
            rsc_balance: RscAmount::ZERO,
            weighted_balance: RscAmount::ZERO,
            multiplier: Decimal::ONE,
            days_held: 0,
        }
    }
}

/// Whole calendar days a lot has been held as of `as_of`.
pub fn days_held(lot: &BalanceLot, as_of: NaiveDate) -> i64 {
    (as_of - lot.entry_date.date_naive()).num_days().max(0)
}

/// Weigh every open lot by the tier of its own age.
pub fn weigh_lots(lots: &[BalanceLot], as_of: NaiveDate, tiers: &TierTable) -> StakePosition {
    let mut position = StakePosition::empty();
    for lot in lots.iter().filter(|l| l.is_open()) {
        let days = days_held(lot, as_of);
        position.rsc_balance += lot.remaining_amount;
        position.weighted_balance += lot.remaining_amount.scale(tiers.multiplier_for_days(days));
        position.days_held = position.days_held.max(days);
    }

    if position.rsc_balance.is_positive() {
        position.multiplier =
            position.weighted_balance.as_decimal() / position.rsc_balance.as_decimal();
    }
    position
}
