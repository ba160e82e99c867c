use crate::amount::RscAmount;
use crate::id::{FundingCreditId, PurchaseId, SnapshotId, StakingCycleId, UserId};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Daily per-user staking record, unique per (user, date).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StakingSnapshot {
    pub id: SnapshotId,
    pub user_id: UserId,
    pub snapshot_date: NaiveDate,
    pub rsc_balance: RscAmount,
    pub multiplier: Decimal,
    pub weighted_balance: RscAmount,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StakingCycleStatus {
    Pending,
    Completed,
    Failed,
}

impl StakingCycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StakingCycleStatus::Pending => "PENDING",
            StakingCycleStatus::Completed => "COMPLETED",
            StakingCycleStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for StakingCycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Weekly distribution cycle, unique per `distribution_date`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StakingDistributionRecord {
    pub id: StakingCycleId,
    pub distribution_date: NaiveDate,
    pub total_pool_amount: RscAmount,
    pub total_weighted_balance: RscAmount,
    pub users_rewarded: u32,
    pub status: StakingCycleStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl StakingDistributionRecord {
    pub fn is_completed(&self) -> bool {
        self.status == StakingCycleStatus::Completed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CreditType {
    StakingReward,
    FundraiseContribution,
    Adjustment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum CreditSource {
    StakingCycle(NaiveDate),
    Fundraise(PurchaseId),
}

/// Non-withdrawable credit row. A user's balance is the sum of their rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingCredit {
    pub id: FundingCreditId,
    pub user_id: UserId,
    pub amount: RscAmount,
    pub credit_type: CreditType,
    pub source: Option<CreditSource>,
    pub created_at: DateTime<Utc>,
}
