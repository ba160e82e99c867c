pub mod amount;
pub mod bounty;
pub mod distribution;
pub mod error;
pub mod escrow;
pub mod events;
pub mod fees;
pub mod id;
pub mod ledger;
pub mod payout;
pub mod source;
pub mod staking;

pub use amount::RscAmount;
pub use bounty::{Bounty, BountySolution, BountyStatus, ContentKind, ContentRef, SolutionStatus};
pub use distribution::{DistributedStatus, Distribution, DistributionType, Proof};
pub use error::{RscTypeError, Result};
pub use escrow::{Escrow, HoldType};
pub use events::LedgerEvent;
pub use fees::{FeeBreakdown, FeeSchedule};
pub use id::{
    BalanceEntryId, BountyId, DepositId, DistributionId, DocumentId, EscrowId, FundingCreditId,
    LotId, PurchaseId, SnapshotId, SolutionId, StakingCycleId, UserId, WithdrawalId,
};
pub use ledger::{BalanceEntry, BalanceLot, ConsumedLot, LockType};
pub use payout::{Deposit, PaidStatus, PaidStatusModel, Withdrawal};
pub use source::{SourceRecord, SourceRef};
pub use staking::{
    CreditSource, CreditType, FundingCredit, StakingCycleStatus, StakingDistributionRecord,
    StakingSnapshot,
};
