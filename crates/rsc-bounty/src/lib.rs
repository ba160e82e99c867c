pub mod error;
pub mod escrow;
pub mod manager;

pub use error::{BountyError, Result};
pub use escrow::EscrowManager;
pub use manager::{BountyConfig, BountyManager, ExpirySweep};
