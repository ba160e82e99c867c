use crate::amount::RscAmount;
use crate::bounty::BountyStatus;
use crate::distribution::DistributionType;
use crate::id::{BountyId, DepositId, DistributionId, EscrowId, UserId, WithdrawalId};
use crate::payout::PaidStatus;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Notification delivered to post-commit hooks once a transaction is durable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    Distributed {
        distribution_id: DistributionId,
        distribution_type: DistributionType,
        recipient_id: UserId,
        amount: RscAmount,
    },
    DistributionRevoked {
        distribution_id: DistributionId,
        recipient_id: UserId,
    },
    EscrowFunded {
        escrow_id: EscrowId,
        amount: RscAmount,
    },
    BountyStatusChanged {
        bounty_id: BountyId,
        status: BountyStatus,
    },
    WithdrawalStatusChanged {
        withdrawal_id: WithdrawalId,
        user_id: UserId,
        status: PaidStatus,
    },
    DepositCredited {
        deposit_id: DepositId,
        user_id: UserId,
        amount: RscAmount,
    },
    StakingCycleCompleted {
        distribution_date: NaiveDate,
        users_rewarded: u32,
    },
}
