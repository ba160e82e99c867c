use rsc_storage::StorageError;
use rsc_types::{DistributionId, DistributionType, PaidStatus, RscAmount, RscTypeError, UserId, WithdrawalId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Insufficient balance for {user_id}: requested {requested}, available {available}")]
    InsufficientBalance {
        user_id: UserId,
        requested: RscAmount,
        available: RscAmount,
    },

    #[error("Insufficient funding credit balance for {user_id}: requested {requested}, available {available}")]
    InsufficientCreditBalance {
        user_id: UserId,
        requested: RscAmount,
        available: RscAmount,
    },

    #[error("Insufficient permission: {0}")]
    InsufficientPermission(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Duplicate {distribution_type} distribution to {recipient_id} from {source_key}")]
    DuplicateDistribution {
        distribution_type: DistributionType,
        source_key: String,
        recipient_id: UserId,
    },

    #[error("Deposit already credited: {0}")]
    DuplicateDeposit(String),

    #[error("Distribution not found: {0}")]
    DistributionNotFound(DistributionId),

    #[error("Distribution {0} already revoked")]
    AlreadyRevoked(DistributionId),

    #[error("Withdrawal not found: {0}")]
    WithdrawalNotFound(WithdrawalId),

    #[error("Withdrawal {withdrawal_id} is {status}, not PENDING")]
    WithdrawalNotPending {
        withdrawal_id: WithdrawalId,
        status: PaidStatus,
    },

    #[error("Withdrawal rejected: {0}")]
    WithdrawalRejected(String),

    #[error("Fee deduction failed: {0}")]
    FeeDeductionFailed(String),

    #[error("External bridge failure for {withdrawal_id}: {reason}")]
    ExternalBridge {
        withdrawal_id: WithdrawalId,
        reason: String,
    },

    #[error("Price oracle error: {0}")]
    PriceOracle(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] StorageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<RscTypeError> for LedgerError {
    fn from(e: RscTypeError) -> Self {
        match e {
            RscTypeError::Serialization(e) => LedgerError::Serialization(e),
            other => LedgerError::InvalidAmount(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
