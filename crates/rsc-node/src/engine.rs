use crate::config::NodeConfig;
use crate::dev::{LoggingBridge, StaticPriceOracle};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use rsc_bounty::{BountyError, BountyManager, ExpirySweep};
use rsc_economics::{
    ChainBridge, Clock, DistributionSpec, EconomicsEngine, LedgerError, PendingResolution,
    PriceOracle, SystemClock,
};
use rsc_staking::{ReconcileReport, SnapshotRun, StakingEngine, StakingError, StakingSummary};
use rsc_storage::{LedgerSnapshot, LedgerStore, MemoryBackend};
use rsc_types::{
    Bounty, BountyId, BountySolution, ContentRef, Deposit, Distribution, DistributionType,
    DocumentId, RscAmount, SolutionId, SourceRecord, StakingDistributionRecord, UserId,
    Withdrawal, WithdrawalId,
};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// A user whose lot total drifted from their unlocked balance.
#[derive(Debug, Clone, PartialEq)]
pub struct LotMismatch {
    pub user_id: UserId,
    pub unlocked_balance: RscAmount,
    pub lot_total: RscAmount,
}

/// Node-level entry point: every operation the API and CLI expose.
pub struct RscEngine {
    backend: Arc<MemoryBackend>,
    pub economics: Arc<EconomicsEngine>,
    pub bounties: BountyManager,
    pub staking: StakingEngine,
    oracle: Arc<dyn PriceOracle>,
}

impl RscEngine {
    pub fn new(
        config: &NodeConfig,
        backend: Arc<MemoryBackend>,
        bridge: Arc<dyn ChainBridge>,
        oracle: Arc<dyn PriceOracle>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let economics = Arc::new(EconomicsEngine::new(
            backend.clone(),
            config.economics(),
            bridge,
            clock,
        ));
        let bounties = BountyManager::new(economics.clone(), config.bounty.clone());
        let staking = StakingEngine::new(economics.clone(), config.staking.clone())?;
        Ok(Self {
            backend,
            economics,
            bounties,
            staking,
            oracle,
        })
    }

    /// Engine over `backend` with the local bridge, the configured static
    /// price and the system clock.
    pub fn with_dev_collaborators(config: &NodeConfig, backend: Arc<MemoryBackend>) -> Result<Self> {
        Self::new(
            config,
            backend,
            Arc::new(LoggingBridge),
            Arc::new(StaticPriceOracle::new(config.oracle.rsc_usd_rate)),
            Arc::new(SystemClock),
        )
    }

    /// Load the persisted ledger if one exists, otherwise start empty.
    pub async fn open(config: &NodeConfig) -> Result<Self> {
        let path = config.ledger_path();
        let backend = if path.exists() {
            let snapshot = LedgerSnapshot::load_from_file(&path)
                .await
                .with_context(|| format!("loading ledger {}", path.display()))?;
            info!(
                path = %path.display(),
                entries = snapshot.metadata.entry_count,
                lots = snapshot.metadata.lot_count,
                "📂 Ledger loaded"
            );
            snapshot.restore()
        } else {
            info!(path = %path.display(), "✨ Starting with an empty ledger");
            MemoryBackend::new()
        };
        Self::with_dev_collaborators(config, Arc::new(backend))
    }

    pub async fn persist(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let snapshot = LedgerSnapshot::capture(&self.backend).await?;
        snapshot.save_to_file(path).await?;
        Ok(())
    }

    pub fn backend(&self) -> &Arc<MemoryBackend> {
        &self.backend
    }

    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.economics.clock.now()
    }

    pub async fn get_balance(&self, user_id: UserId) -> Result<RscAmount, LedgerError> {
        self.economics.get_balance(user_id).await
    }

    pub async fn get_withdrawable_balance(&self, user_id: UserId) -> Result<RscAmount, LedgerError> {
        self.economics.balances.get_withdrawable_balance(user_id).await
    }

    pub async fn get_balance_usd(&self, user_id: UserId) -> Result<Decimal, LedgerError> {
        self.economics
            .get_balance_usd(user_id, self.oracle.as_ref())
            .await
    }

    /// Operator grant of a plain reward.
    pub async fn grant_reward(
        &self,
        user_id: UserId,
        amount: RscAmount,
    ) -> Result<Distribution, LedgerError> {
        self.economics
            .distributor
            .distribute(
                DistributionSpec::new(DistributionType::Reward, amount),
                user_id,
                &SourceRecord::User { user_id },
                self.now(),
                None,
            )
            .await
    }

    pub async fn create_bounty(
        &self,
        user_id: UserId,
        amount: RscAmount,
        item: ContentRef,
        unified_document_id: DocumentId,
    ) -> Result<Bounty, BountyError> {
        self.bounties
            .create_bounty(user_id, amount, item, unified_document_id, None)
            .await
    }

    pub async fn submit_solution(
        &self,
        bounty_id: BountyId,
        user_id: UserId,
        item: ContentRef,
    ) -> Result<BountySolution, BountyError> {
        self.bounties.submit_solution(bounty_id, user_id, item).await
    }

    pub async fn award_bounty_solution(
        &self,
        bounty_id: BountyId,
        solution_id: SolutionId,
        amount: RscAmount,
        actor: UserId,
    ) -> Result<BountySolution, BountyError> {
        self.bounties
            .award_bounty_solution(bounty_id, solution_id, amount, actor)
            .await
    }

    pub async fn close_bounty(&self, bounty_id: BountyId, actor: UserId) -> Result<Bounty, BountyError> {
        self.bounties.close_bounty(bounty_id, actor).await
    }

    pub async fn expire_bounties(&self) -> Result<ExpirySweep, BountyError> {
        self.bounties.expire_bounties().await
    }

    pub async fn request_withdrawal(
        &self,
        user_id: UserId,
        amount: RscAmount,
        to_address: &str,
    ) -> Result<Withdrawal, LedgerError> {
        self.economics
            .withdrawals
            .request_withdrawal(user_id, amount, to_address, None)
            .await
    }

    pub async fn pending_withdrawals(&self) -> Result<Vec<Withdrawal>, LedgerError> {
        self.economics.withdrawals.pending_withdrawals().await
    }

    pub async fn reconcile_withdrawal(
        &self,
        id: WithdrawalId,
        resolution: PendingResolution,
    ) -> Result<Withdrawal, LedgerError> {
        self.economics
            .withdrawals
            .reconcile_pending(id, resolution)
            .await
    }

    pub async fn record_deposit(
        &self,
        user_id: UserId,
        amount: RscAmount,
        transaction_hash: &str,
        from_address: &str,
    ) -> Result<Deposit, LedgerError> {
        let network = self.economics.withdrawals.config().default_network.clone();
        self.economics
            .withdrawals
            .record_deposit(user_id, amount, transaction_hash, from_address, &network)
            .await
    }

    pub async fn get_staking_summary(&self, user_id: UserId) -> Result<StakingSummary, StakingError> {
        self.staking.get_staking_summary(user_id).await
    }

    pub async fn run_daily_snapshot(&self, date: NaiveDate) -> Result<SnapshotRun, StakingError> {
        self.staking.run_daily_snapshot(date).await
    }

    pub async fn run_weekly_distribution(
        &self,
        date: NaiveDate,
    ) -> Result<StakingDistributionRecord, StakingError> {
        self.staking.run_weekly_distribution(date).await
    }

    pub async fn reconcile_staking_cycle(&self, date: NaiveDate) -> Result<ReconcileReport, StakingError> {
        self.staking.reconcile_cycle(date).await
    }

    /// Users whose open lots do not add up to their unlocked balance.
    pub async fn audit_lots(&self) -> Result<Vec<LotMismatch>, LedgerError> {
        let mut users: BTreeMap<UserId, RscAmount> = BTreeMap::new();
        for entry in self.backend.all_entries().await? {
            if !entry.is_locked {
                *users.entry(entry.user_id).or_insert(RscAmount::ZERO) += entry.amount;
            }
        }

        let mut mismatches = Vec::new();
        for (user_id, unlocked_balance) in users {
            let lot_total = self.get_withdrawable_balance(user_id).await?;
            if lot_total != unlocked_balance {
                warn!(user = %user_id, unlocked = %unlocked_balance, lots = %lot_total, "Lot total drifted from balance");
                mismatches.push(LotMismatch {
                    user_id,
                    unlocked_balance,
                    lot_total,
                });
            }
        }
        Ok(mismatches)
    }
}
