pub mod engine;
pub mod error;
pub mod summary;
pub mod tiers;
pub mod weighting;

pub use engine::{ReconcileReport, SnapshotRun, StakingConfig, StakingEngine};
pub use error::{Result, StakingError};
pub use summary::StakingSummary;
pub use tiers::{MultiplierTier, TierTable};
pub use weighting::{days_held, weigh_lots, StakePosition};
