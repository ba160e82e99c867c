use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            pub fn get(&self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "#{}"), self.0)
            }
        }
    };
}

define_id!(
    /// Account holder, including system accounts (revenue, DAO).
    UserId,
    "user"
);
define_id!(BalanceEntryId, "entry");
define_id!(LotId, "lot");
define_id!(DistributionId, "distribution");
define_id!(EscrowId, "escrow");
define_id!(BountyId, "bounty");
define_id!(SolutionId, "solution");
define_id!(WithdrawalId, "withdrawal");
define_id!(DepositId, "deposit");
define_id!(FundingCreditId, "funding_credit");
define_id!(SnapshotId, "snapshot");
define_id!(StakingCycleId, "staking_cycle");
define_id!(PurchaseId, "purchase");
define_id!(
    /// Unified document a bounty is attached to.
    DocumentId,
    "document"
);
