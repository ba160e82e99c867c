use crate::logging::LoggingConfig;
use anyhow::{Context, Result};
use rsc_bounty::BountyConfig;
use rsc_economics::{EconomicsConfig, SystemAccounts, WithdrawalConfig};
use rsc_staking::StakingConfig;
use rsc_types::{FeeSchedule, RscAmount};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub node: NodeSettings,
    pub accounts: SystemAccounts,
    pub fees: FeeSchedule,
    pub bounty: BountyConfig,
    pub withdrawal: WithdrawalConfig,
    pub staking: StakingConfig,
    pub scheduler: SchedulerConfig,
    pub oracle: OracleConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSettings {
    pub data_dir: PathBuf,
    /// Ledger snapshot file, relative to `data_dir`.
    pub ledger_file: String,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            ledger_file: "ledger.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub tick_secs: u64,
    pub expiry_sweep_secs: u64,
    /// Weekday the staking distribution runs on, e.g. "Mon".
    pub distribution_weekday: String,
    /// Persist the ledger after every job run.
    pub persist_after_jobs: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_secs: 60,
            expiry_sweep_secs: 300,
            distribution_weekday: "Mon".to_string(),
            persist_after_jobs: true,
        }
    }
}

/// Fixed display rate used by the built-in price oracle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub rsc_usd_rate: Decimal,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            rsc_usd_rate: Decimal::new(50, 2),
        }
    }
}

impl NodeConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = toml::from_str(&content)?;
        // env overrides are applied by the caller so it controls precedence
        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.node.data_dir.join(&self.node.ledger_file)
    }

    pub fn economics(&self) -> EconomicsConfig {
        EconomicsConfig {
            accounts: self.accounts,
            fees: self.fees,
            withdrawal: self.withdrawal.clone(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.fees.is_valid() {
            anyhow::bail!(
                "fee rates must be non-negative and below 100%, got rh={} dao={}",
                self.fees.rh_pct,
                self.fees.dao_pct
            );
        }
        if self.accounts.revenue == self.accounts.dao {
            anyhow::bail!("revenue and DAO accounts must differ");
        }
        if self.bounty.min_amount > self.bounty.max_amount {
            anyhow::bail!(
                "bounty minimum {} exceeds maximum {}",
                self.bounty.min_amount,
                self.bounty.max_amount
            );
        }
        self.staking.tiers.validate()?;
        self.distribution_weekday()?;
        Ok(())
    }

    pub fn distribution_weekday(&self) -> Result<chrono::Weekday> {
        self.scheduler
            .distribution_weekday
            .parse()
            .map_err(|_| {
                anyhow::anyhow!(
                    "invalid distribution weekday {:?}",
                    self.scheduler.distribution_weekday
                )
            })
    }

    /// Apply `RSC_*` environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(data_dir) = env::var("RSC_DATA_DIR") {
            self.node.data_dir = PathBuf::from(data_dir);
        }

        // Fees
        if let Some(v) = env_parse::<Decimal>("RSC_FEE_RH_PCT") {
            self.fees.rh_pct = v;
        }
        if let Some(v) = env_parse::<Decimal>("RSC_FEE_DAO_PCT") {
            self.fees.dao_pct = v;
        }

        // Withdrawals
        if let Some(v) = env_parse::<RscAmount>("RSC_WITHDRAWAL_MINIMUM") {
            self.withdrawal.minimum_amount = v;
        }
        if let Some(v) = env_parse::<RscAmount>("RSC_WITHDRAWAL_FEE") {
            self.withdrawal.fee = v;
        }

        // Staking
        if let Some(v) = env_parse::<RscAmount>("RSC_WEEKLY_POOL") {
            self.staking.weekly_pool = v;
        }
        if let Some(v) = env_parse::<RscAmount>("RSC_STAKING_MINIMUM") {
            self.staking.minimum_balance = v;
        }

        if let Ok(enabled) = env::var("RSC_SCHEDULER_ENABLED") {
            self.scheduler.enabled = matches!(enabled.as_str(), "1" | "true" | "yes");
        }
        if let Some(v) = env_parse::<Decimal>("RSC_USD_RATE") {
            self.oracle.rsc_usd_rate = v;
        }

        if let Ok(level) = env::var("RSC_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = env::var("RSC_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
