use crate::amount::RscAmount;
use crate::bounty::{Bounty, BountySolution, ContentRef};
use crate::distribution::Distribution;
use crate::escrow::Escrow;
use crate::fees::FeeSchedule;
use crate::id::{
    BountyId, DepositId, DistributionId, EscrowId, PurchaseId, UserId, WithdrawalId,
};
use crate::payout::{Deposit, Withdrawal};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Typed back-reference from a balance entry to the record that caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum SourceRef {
    Distribution(DistributionId),
    EscrowFunding(EscrowId),
    BountyFee(BountyId),
    Withdrawal(WithdrawalId),
    Deposit(DepositId),
    Purchase(PurchaseId),
}

/// Snapshot of the record that justifies a distribution, embedded in its proof.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "table", content = "record", rename_all = "snake_case")]
pub enum SourceRecord {
    User {
        user_id: UserId,
    },
    Vote {
        vote_id: u64,
        voter_id: UserId,
        item: ContentRef,
    },
    Purchase {
        purchase_id: PurchaseId,
        buyer_id: UserId,
        amount: RscAmount,
    },
    Bounty(Box<Bounty>),
    BountySolution(Box<BountySolution>),
    Escrow(Box<Escrow>),
    FeeCharge {
        payer_id: UserId,
        schedule: FeeSchedule,
        charged_for: SourceRef,
    },
    Withdrawal(Box<Withdrawal>),
    Deposit(Box<Deposit>),
    Distribution(Box<Distribution>),
    StakingCycle {
        distribution_date: NaiveDate,
    },
}

impl SourceRecord {
    pub fn table_name(&self) -> &'static str {
        match self {
            SourceRecord::User { .. } => "user",
            SourceRecord::Vote { .. } => "vote",
            SourceRecord::Purchase { .. } => "purchase",
            SourceRecord::Bounty(_) => "bounty",
            SourceRecord::BountySolution(_) => "bounty_solution",
            SourceRecord::Escrow(_) => "escrow",
            SourceRecord::FeeCharge { .. } => "fee_charge",
            SourceRecord::Withdrawal(_) => "withdrawal",
            SourceRecord::Deposit(_) => "deposit",
            SourceRecord::Distribution(_) => "distribution",
            SourceRecord::StakingCycle { .. } => "staking_cycle",
        }
    }

    /// Stable `table:id` key used for dedup of distributions.
    pub fn source_key(&self) -> String {
        let id = match self {
            SourceRecord::User { user_id } => user_id.get().to_string(),
            SourceRecord::Vote { vote_id, .. } => vote_id.to_string(),
            SourceRecord::Purchase { purchase_id, .. } => purchase_id.get().to_string(),
            SourceRecord::Bounty(bounty) => bounty.id.get().to_string(),
            SourceRecord::BountySolution(solution) => solution.id.get().to_string(),
            SourceRecord::Escrow(escrow) => escrow.id.get().to_string(),
            SourceRecord::FeeCharge {
                payer_id,
                charged_for,
                ..
            } => format!("{}/{:?}", payer_id.get(), charged_for),
            SourceRecord::Withdrawal(withdrawal) => withdrawal.id.get().to_string(),
            SourceRecord::Deposit(deposit) => deposit.id.get().to_string(),
            SourceRecord::Distribution(distribution) => distribution.id.get().to_string(),
            SourceRecord::StakingCycle { distribution_date } => distribution_date.to_string(),
        };
        format!("{}:{}", self.table_name(), id)
    }

    /// Full serialized snapshot of the record body.
    pub fn snapshot(&self) -> serde_json::Result<serde_json::Value> {
        let mut value = serde_json::to_value(self)?;
        Ok(value
            .get_mut("record")
            .map(serde_json::Value::take)
            .unwrap_or(serde_json::Value::Null))
    }
}
