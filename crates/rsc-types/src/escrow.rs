use crate::amount::RscAmount;
use crate::bounty::ContentRef;
use crate::id::{BountyId, EscrowId, UserId};
use crate::payout::{PaidStatus, PaidStatusModel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HoldType {
    Bounty,
    Other,
}

/// Funds withdrawn from a creator's ledger and held for later payout or refund.
///
/// `amount_holding` only ever decreases after funding; it reaches zero once
/// everything has been paid out or refunded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Escrow {
    pub id: EscrowId,
    pub created_by_id: UserId,
    pub hold_type: HoldType,
    pub amount_holding: RscAmount,
    pub amount_funded: RscAmount,
    pub item: ContentRef,
    pub bounty_id: Option<BountyId>,
    pub paid_status: Option<PaidStatus>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Escrow {
    pub fn is_drained(&self) -> bool {
        self.amount_holding.is_zero()
    }
}

impl PaidStatusModel for Escrow {
    fn paid_status(&self) -> Option<PaidStatus> {
        self.paid_status
    }

    fn set_paid_status(&mut self, status: Option<PaidStatus>) {
        self.paid_status = status;
    }
}
