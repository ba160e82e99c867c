use crate::batch::WriteBatch;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rsc_types::{
    BalanceEntry, BalanceLot, Bounty, BountyId, BountySolution, CreditSource, Deposit,
    Distribution, DistributionId, DistributionType, Escrow, EscrowId, FundingCredit, SolutionId,
    StakingDistributionRecord, StakingSnapshot, UserId, Withdrawal, WithdrawalId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Unique constraint violated on {table}: {key}")]
    UniqueViolation { table: &'static str, key: String },

    #[error("Constraint violated: {0}")]
    ConstraintViolation(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::SerializationError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Id sequences, one per table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    BalanceEntries,
    Lots,
    Distributions,
    Escrows,
    Bounties,
    Solutions,
    Withdrawals,
    Deposits,
    FundingCredits,
    Snapshots,
    StakingCycles,
}

/// Transactional store behind every ledger component.
///
/// Reads observe committed state only. All writes go through [`LedgerStore::commit`],
/// which applies a [`WriteBatch`] entirely or not at all.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn next_id(&self, table: Table) -> Result<u64>;

    async fn commit(&self, batch: WriteBatch) -> Result<()>;

    async fn entries_for_user(&self, user_id: UserId) -> Result<Vec<BalanceEntry>>;

    async fn all_entries(&self) -> Result<Vec<BalanceEntry>>;

    /// Lots in FIFO order: oldest `entry_date` first, ties broken by id.
    async fn lots_for_user(&self, user_id: UserId) -> Result<Vec<BalanceLot>>;

    async fn users_with_open_lots(&self) -> Result<Vec<UserId>>;

    async fn get_distribution(&self, id: DistributionId) -> Result<Option<Distribution>>;

    async fn distributions_for_recipient(&self, user_id: UserId) -> Result<Vec<Distribution>>;

    /// Non-removed distribution matching (type, source, recipient), if any.
    async fn find_active_distribution(
        &self,
        distribution_type: DistributionType,
        source_key: &str,
        recipient_id: UserId,
    ) -> Result<Option<Distribution>>;

    async fn get_escrow(&self, id: EscrowId) -> Result<Option<Escrow>>;

    async fn get_bounty(&self, id: BountyId) -> Result<Option<Bounty>>;

    async fn open_bounties_expiring_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Bounty>>;

    async fn get_solution(&self, id: SolutionId) -> Result<Option<BountySolution>>;

    async fn solutions_for_bounty(&self, bounty_id: BountyId) -> Result<Vec<BountySolution>>;

    async fn get_withdrawal(&self, id: WithdrawalId) -> Result<Option<Withdrawal>>;

    /// Newest first.
    async fn withdrawals_for_user(&self, user_id: UserId) -> Result<Vec<Withdrawal>>;

    /// Withdrawals still awaiting a bridge outcome, oldest first.
    async fn pending_withdrawals(&self) -> Result<Vec<Withdrawal>>;

    async fn deposit_by_tx_hash(&self, transaction_hash: &str) -> Result<Option<Deposit>>;

    /// Newest first.
    async fn funding_credits_for_user(&self, user_id: UserId) -> Result<Vec<FundingCredit>>;

    async fn funding_credits_for_source(&self, source: CreditSource) -> Result<Vec<FundingCredit>>;

    async fn get_snapshot(
        &self,
        user_id: UserId,
        date: NaiveDate,
    ) -> Result<Option<StakingSnapshot>>;

    /// Each user's most recent snapshot dated within `[from, to]`.
    async fn latest_snapshots_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<StakingSnapshot>>;

    async fn get_staking_cycle(&self, date: NaiveDate) -> Result<Option<StakingDistributionRecord>>;

    async fn latest_completed_staking_cycle(&self) -> Result<Option<StakingDistributionRecord>>;

    async fn reputation(&self, user_id: UserId) -> Result<Decimal>;
}
