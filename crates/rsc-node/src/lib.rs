pub mod config;
pub mod dev;
pub mod engine;
pub mod logging;
pub mod scheduler;

pub use config::{NodeConfig, NodeSettings, OracleConfig, SchedulerConfig};
pub use dev::{LoggingBridge, StaticPriceOracle};
pub use engine::{LotMismatch, RscEngine};
pub use logging::{init_logging, LoggingConfig};
pub use scheduler::{JobState, Scheduler, TickReport};
