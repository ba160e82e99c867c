use crate::amount::RscAmount;
use crate::id::{DistributionId, UserId};
use crate::payout::{PaidStatus, PaidStatusModel};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DistributionType {
    Reward,
    Referral,
    BountyCreated,
    BountySolution,
    BountyRefund,
    FeeRh,
    FeeDao,
    WithdrawalFee,
    WithdrawalRefund,
    PurchaseReward,
    Revocation,
}

impl DistributionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistributionType::Reward => "REWARD",
            DistributionType::Referral => "REFERRAL",
            DistributionType::BountyCreated => "BOUNTY_CREATED",
            DistributionType::BountySolution => "BOUNTY_SOLUTION",
            DistributionType::BountyRefund => "BOUNTY_REFUND",
            DistributionType::FeeRh => "FEE_RH",
            DistributionType::FeeDao => "FEE_DAO",
            DistributionType::WithdrawalFee => "WITHDRAWAL_FEE",
            DistributionType::WithdrawalRefund => "WITHDRAWAL_REFUND",
            DistributionType::PurchaseReward => "PURCHASE_REWARD",
            DistributionType::Revocation => "REVOCATION",
        }
    }

    /// Marker distributions that record an event without moving funds.
    pub fn allows_zero(&self) -> bool {
        matches!(self, DistributionType::BountyCreated)
    }

    /// Offsetting entries are the only distributions that debit the recipient.
    pub fn allows_negative(&self) -> bool {
        matches!(self, DistributionType::Revocation)
    }
}

impl fmt::Display for DistributionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DistributedStatus {
    Pending,
    Distributed,
    Failed,
}

/// Point-in-time evidence for a distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proof {
    pub timestamp: DateTime<Utc>,
    pub table: String,
    pub record: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    pub id: DistributionId,
    pub distribution_type: DistributionType,
    pub recipient_id: UserId,
    pub giver_id: Option<UserId>,
    pub amount: RscAmount,
    pub reputation_amount: Decimal,
    pub proof: Proof,
    pub source_key: String,
    pub distributed_status: DistributedStatus,
    pub distributed_at: Option<DateTime<Utc>>,
    pub paid_status: Option<PaidStatus>,
    pub is_removed: bool,
    pub created_at: DateTime<Utc>,
}

impl Distribution {
    pub fn is_distributed(&self) -> bool {
        self.distributed_status == DistributedStatus::Distributed
    }
}

impl PaidStatusModel for Distribution {
    fn paid_status(&self) -> Option<PaidStatus> {
        self.paid_status
    }

    fn set_paid_status(&mut self, status: Option<PaidStatus>) {
        self.paid_status = status;
    }
}
