use chrono::NaiveDate;
use rsc_economics::LedgerError;
use rsc_storage::StorageError;
use rsc_types::StakingCycleStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StakingError {
    #[error("Staking distribution for {0} has already completed")]
    DistributionCycleAlreadyRun(NaiveDate),

    #[error("Invalid staking configuration: {0}")]
    InvalidConfig(String),

    #[error("Staking cycle for {0} not found")]
    CycleNotFound(NaiveDate),

    #[error("Staking cycle for {date} is {status}, expected COMPLETED")]
    CycleNotCompleted {
        date: NaiveDate,
        status: StakingCycleStatus,
    },

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type Result<T> = std::result::Result<T, StakingError>;
