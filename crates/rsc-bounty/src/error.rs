use rsc_economics::LedgerError;
use rsc_storage::StorageError;
use rsc_types::{BountyId, BountyStatus, EscrowId, RscAmount, SolutionId, SolutionStatus};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BountyError {
    #[error("Bounty not found: {0}")]
    BountyNotFound(BountyId),

    #[error("Solution not found: {0}")]
    SolutionNotFound(SolutionId),

    #[error("Escrow not found: {0}")]
    EscrowNotFound(EscrowId),

    #[error("Insufficient escrow in {escrow_id}: requested {requested}, holding {holding}")]
    InsufficientEscrow {
        escrow_id: EscrowId,
        requested: RscAmount,
        holding: RscAmount,
    },

    #[error("Cannot {operation} {bounty_id} in state {status}")]
    InvalidBountyState {
        bounty_id: BountyId,
        status: BountyStatus,
        operation: &'static str,
    },

    #[error("Solution {solution_id} is {status}, expected SUBMITTED")]
    InvalidSolutionState {
        solution_id: SolutionId,
        status: SolutionStatus,
    },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Insufficient permission: {0}")]
    InsufficientPermission(String),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl BountyError {
    pub fn is_insufficient_balance(&self) -> bool {
        matches!(
            self,
            BountyError::Ledger(LedgerError::InsufficientBalance { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, BountyError>;
