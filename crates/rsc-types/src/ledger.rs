use crate::amount::RscAmount;
use crate::id::{BalanceEntryId, LotId, UserId};
use crate::source::SourceRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a credited amount is locked and excluded from withdrawable balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockType {
    ReferralBonus,
    RscPurchase,
}

/// Immutable signed ledger row. Rows are never updated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceEntry {
    pub id: BalanceEntryId,
    pub user_id: UserId,
    pub amount: RscAmount,
    pub source: SourceRef,
    pub is_locked: bool,
    pub lock_type: Option<LockType>,
    pub created_at: DateTime<Utc>,
}

impl BalanceEntry {
    pub fn is_credit(&self) -> bool {
        self.amount.is_positive()
    }

    pub fn is_debit(&self) -> bool {
        self.amount.is_negative()
    }

    /// Unlocked positive entries open a FIFO lot.
    pub fn opens_lot(&self) -> bool {
        self.is_credit() && !self.is_locked
    }
}

/// Remaining portion of an unlocked credit, aged from `entry_date`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceLot {
    pub id: LotId,
    pub user_id: UserId,
    pub source_entry_id: BalanceEntryId,
    pub entry_date: DateTime<Utc>,
    pub original_amount: RscAmount,
    pub remaining_amount: RscAmount,
}

impl BalanceLot {
    pub fn from_entry(id: LotId, entry: &BalanceEntry) -> Self {
        Self {
            id,
            user_id: entry.user_id,
            source_entry_id: entry.id,
            entry_date: entry.created_at,
            original_amount: entry.amount,
            remaining_amount: entry.amount,
        }
    }

    pub fn is_open(&self) -> bool {
        self.remaining_amount.is_positive()
    }

    /// Whole days the lot has been held as of `now`, never negative.
    pub fn age_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.entry_date).num_days().max(0)
    }
}

/// One step of a FIFO drain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumedLot {
    pub lot_id: LotId,
    pub entry_date: DateTime<Utc>,
    pub consumed: RscAmount,
    pub remaining_after: RscAmount,
}
