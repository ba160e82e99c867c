use crate::error::{Result, StakingError};
use crate::tiers::TierTable;
use crate::weighting::{weigh_lots, StakePosition};
use chrono::{Duration, NaiveDate};
use rsc_economics::{Clock, EconomicsEngine};
use rsc_storage::{LedgerStore, StorageError, Table, WriteBatch, WriteOp};
use rsc_types::{
    CreditSource, CreditType, LedgerEvent, RscAmount, SnapshotId, StakingCycleId,
    StakingCycleStatus, StakingDistributionRecord, StakingSnapshot, UserId,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StakingConfig {
    /// Stakeable balance required to be snapshotted.
    pub minimum_balance: RscAmount,
    pub weekly_pool: RscAmount,
    /// How far before a distribution date to look for snapshots.
    pub snapshot_lookback_days: i64,
    pub tiers: TierTable,
}

impl Default for StakingConfig {
    fn default() -> Self {
        Self {
            minimum_balance: RscAmount::from_rsc(100),
            weekly_pool: RscAmount::from_rsc(10_000),
            snapshot_lookback_days: 7,
            tiers: TierTable::default(),
        }
    }
}

/// Result of one daily snapshot run.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SnapshotRun {
    pub snapshot_date: Option<NaiveDate>,
    pub created: usize,
    pub already_present: usize,
    pub below_minimum: usize,
    pub failed: usize,
}

/// Users found missing from a completed cycle and the credits written for them.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReconcileReport {
    pub distribution_date: Option<NaiveDate>,
    pub eligible: usize,
    pub topped_up: Vec<(UserId, RscAmount)>,
}

/// Daily snapshot and weekly distribution jobs.
///
/// Both entry points are idempotent per date, so the scheduler can fire
/// them again after a crash or a manual run.
pub struct StakingEngine {
    pub(crate) economics: Arc<EconomicsEngine>,
    pub(crate) config: StakingConfig,
    cycle_lock: Mutex<()>,
}

impl StakingEngine {
    pub fn new(economics: Arc<EconomicsEngine>, config: StakingConfig) -> Result<Self> {
        config.tiers.validate()?;
        if config.snapshot_lookback_days < 1 {
            return Err(StakingError::InvalidConfig(format!(
                "snapshot_lookback_days must be at least 1, got {}",
                config.snapshot_lookback_days
            )));
        }
        Ok(Self {
            economics,
            config,
            cycle_lock: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &StakingConfig {
        &self.config
    }

    fn store(&self) -> &dyn LedgerStore {
        self.economics.store.as_ref()
    }

    /// Current stakeable position of one user as of `as_of`.
    pub async fn position(&self, user_id: UserId, as_of: NaiveDate) -> Result<StakePosition> {
        let lots = self.store().lots_for_user(user_id).await?;
        Ok(weigh_lots(&lots, as_of, &self.config.tiers))
    }

    /// Record one snapshot per eligible user for `snapshot_date`.
    ///
    /// Existing rows are left untouched, so re-running a day is a no-op.
    pub async fn run_daily_snapshot(&self, snapshot_date: NaiveDate) -> Result<SnapshotRun> {
        let started = Instant::now();
        let mut run = SnapshotRun {
            snapshot_date: Some(snapshot_date),
            ..Default::default()
        };

        for user_id in self.store().users_with_open_lots().await? {
            match self.snapshot_user(user_id, snapshot_date).await {
                Ok(SnapshotOutcome::Created) => run.created += 1,
                Ok(SnapshotOutcome::AlreadyPresent) => run.already_present += 1,
                Ok(SnapshotOutcome::BelowMinimum) => run.below_minimum += 1,
                Err(e) => {
                    error!(user = %user_id, date = %snapshot_date, error = %e, "Failed to snapshot staking position");
                    run.failed += 1;
                }
            }
        }

        info!(
            date = %snapshot_date,
            created = run.created,
            existing = run.already_present,
            below_minimum = run.below_minimum,
            failed = run.failed,
            duration_ms = started.elapsed().as_millis() as u64,
            "📸 Daily staking snapshot complete"
        );
        Ok(run)
    }

    async fn snapshot_user(&self, user_id: UserId, date: NaiveDate) -> Result<SnapshotOutcome> {
        if self.store().get_snapshot(user_id, date).await?.is_some() {
            return Ok(SnapshotOutcome::AlreadyPresent);
        }

        let position = self.position(user_id, date).await?;
        if position.rsc_balance < self.config.minimum_balance {
            debug!(user = %user_id, balance = %position.rsc_balance, "Below staking minimum");
            return Ok(SnapshotOutcome::BelowMinimum);
        }

        let snapshot = StakingSnapshot {
            id: SnapshotId(self.store().next_id(Table::Snapshots).await?),
            user_id,
            snapshot_date: date,
            rsc_balance: position.rsc_balance,
            multiplier: position.multiplier,
            weighted_balance: position.weighted_balance,
            created_at: self.economics.clock.now(),
        };
        let mut batch = WriteBatch::new();
        batch.push(WriteOp::InsertSnapshot(snapshot));
        match self.economics.hooks.commit(self.store(), batch).await {
            Ok(()) => Ok(SnapshotOutcome::Created),
            // a concurrent run got there first
            Err(rsc_economics::LedgerError::Persistence(StorageError::UniqueViolation { .. })) => {
                Ok(SnapshotOutcome::AlreadyPresent)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Credit the weekly pool to stakers in proportion to their weighted
    /// balance.
    ///
    /// A completed cycle for the date is returned unchanged. A pending or
    /// failed one is resumed: users already credited for it are skipped.
    pub async fn run_weekly_distribution(
        &self,
        distribution_date: NaiveDate,
    ) -> Result<StakingDistributionRecord> {
        match self.distribute_cycle(distribution_date).await {
            Err(StakingError::DistributionCycleAlreadyRun(date)) => {
                warn!(date = %date, "Staking distribution already completed");
                self.store()
                    .get_staking_cycle(date)
                    .await?
                    .ok_or(StakingError::CycleNotFound(date))
            }
            other => other,
        }
    }

    async fn distribute_cycle(
        &self,
        distribution_date: NaiveDate,
    ) -> Result<StakingDistributionRecord> {
        let _cycle = self.cycle_lock.lock().await;
        let record = self.open_cycle(distribution_date).await?;

        match self.credit_cycle(record.clone()).await {
            Ok(completed) => Ok(completed),
            Err(e) => {
                error!(date = %distribution_date, error = %e, "❌ Staking distribution failed");
                let mut failed = record;
                failed.status = StakingCycleStatus::Failed;
                failed.error_message = Some(e.to_string());
                let mut batch = WriteBatch::new();
                batch.push(WriteOp::UpdateStakingCycle(failed));
                if let Err(mark_err) = self.store().commit(batch).await {
                    error!(date = %distribution_date, error = %mark_err, "Could not mark staking cycle failed");
                }
                Err(e)
            }
        }
    }

    /// Existing non-completed record for the date, or a fresh PENDING one.
    async fn open_cycle(&self, distribution_date: NaiveDate) -> Result<StakingDistributionRecord> {
        if let Some(existing) = self.store().get_staking_cycle(distribution_date).await? {
            if existing.is_completed() {
                return Err(StakingError::DistributionCycleAlreadyRun(distribution_date));
            }
            info!(date = %distribution_date, status = %existing.status, "Resuming staking distribution");
            return Ok(existing);
        }

        let record = StakingDistributionRecord {
            id: StakingCycleId(self.store().next_id(Table::StakingCycles).await?),
            distribution_date,
            total_pool_amount: self.config.weekly_pool,
            total_weighted_balance: RscAmount::ZERO,
            users_rewarded: 0,
            status: StakingCycleStatus::Pending,
            error_message: None,
            created_at: self.economics.clock.now(),
            completed_at: None,
        };
        let mut batch = WriteBatch::new();
        batch.push(WriteOp::InsertStakingCycle(record.clone()));
        self.store().commit(batch).await?;
        Ok(record)
    }

    /// Snapshots feeding a cycle: each user's latest snapshot inside the
    /// lookback window that ends the day before `distribution_date`.
    pub async fn cycle_snapshots(&self, distribution_date: NaiveDate) -> Result<Vec<StakingSnapshot>> {
        let to = distribution_date - Duration::days(1);
        let from = distribution_date - Duration::days(self.config.snapshot_lookback_days);
        let mut snapshots = self.store().latest_snapshots_between(from, to).await?;
        snapshots.retain(|s| s.weighted_balance.is_positive());
        snapshots.sort_by_key(|s| s.user_id);
        Ok(snapshots)
    }

    fn share_of_pool(&self, weighted: RscAmount, total_weighted: RscAmount) -> RscAmount {
        if !total_weighted.is_positive() {
            return RscAmount::ZERO;
        }
        self.config
            .weekly_pool
            .scale(weighted.as_decimal() / total_weighted.as_decimal())
    }

    async fn credit_cycle(
        &self,
        mut record: StakingDistributionRecord,
    ) -> Result<StakingDistributionRecord> {
        let started = Instant::now();
        let date = record.distribution_date;
        let now = self.economics.clock.now();
        let snapshots = self.cycle_snapshots(date).await?;
        let total_weighted: RscAmount = snapshots.iter().map(|s| s.weighted_balance).sum();

        let source = CreditSource::StakingCycle(date);
        let already_credited: HashSet<UserId> = self
            .store()
            .funding_credits_for_source(source)
            .await?
            .into_iter()
            .map(|c| c.user_id)
            .collect();

        let mut batch = WriteBatch::new();
        let mut newly_credited = 0u32;
        let mut distributed = RscAmount::ZERO;
        for snapshot in &snapshots {
            if already_credited.contains(&snapshot.user_id) {
                continue;
            }
            let reward = self.share_of_pool(snapshot.weighted_balance, total_weighted);
            if !reward.is_positive() {
                continue;
            }
            self.economics
                .credits
                .stage_credit(
                    &mut batch,
                    snapshot.user_id,
                    reward,
                    CreditType::StakingReward,
                    Some(source),
                    now,
                )
                .await?;
            newly_credited += 1;
            distributed += reward;
        }

        record.total_pool_amount = self.config.weekly_pool;
        record.total_weighted_balance = total_weighted;
        record.users_rewarded = already_credited.len() as u32 + newly_credited;
        record.status = StakingCycleStatus::Completed;
        record.error_message = None;
        record.completed_at = Some(now);
        batch.push(WriteOp::UpdateStakingCycle(record.clone()));
        batch.emit(LedgerEvent::StakingCycleCompleted {
            distribution_date: date,
            users_rewarded: record.users_rewarded,
        });
        self.economics.hooks.commit(self.store(), batch).await?;

        if total_weighted.is_zero() {
            info!(date = %date, "No stakers to distribute to");
        }
        info!(
            date = %date,
            pool = %self.config.weekly_pool,
            distributed = %distributed,
            total_weighted = %total_weighted,
            users_rewarded = record.users_rewarded,
            resumed_users = already_credited.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "🥩 Weekly staking distribution complete"
        );
        Ok(record)
    }

    /// Compare a completed cycle against its snapshots and credit any
    /// eligible user that has no credit for it.
    pub async fn reconcile_cycle(&self, distribution_date: NaiveDate) -> Result<ReconcileReport> {
        let _cycle = self.cycle_lock.lock().await;
        let mut record = self
            .store()
            .get_staking_cycle(distribution_date)
            .await?
            .ok_or(StakingError::CycleNotFound(distribution_date))?;
        if !record.is_completed() {
            return Err(StakingError::CycleNotCompleted {
                date: distribution_date,
                status: record.status,
            });
        }

        let snapshots = self.cycle_snapshots(distribution_date).await?;
        let source = CreditSource::StakingCycle(distribution_date);
        let credited: HashSet<UserId> = self
            .store()
            .funding_credits_for_source(source)
            .await?
            .into_iter()
            .map(|c| c.user_id)
            .collect();

        let mut report = ReconcileReport {
            distribution_date: Some(distribution_date),
            eligible: snapshots.len(),
            topped_up: Vec::new(),
        };
        let now = self.economics.clock.now();
        let mut batch = WriteBatch::new();
        for snapshot in snapshots.iter().filter(|s| !credited.contains(&s.user_id)) {
            let reward = self.share_of_pool(snapshot.weighted_balance, record.total_weighted_balance);
            if !reward.is_positive() {
                continue;
            }
            self.economics
                .credits
                .stage_credit(
                    &mut batch,
                    snapshot.user_id,
                    reward,
                    CreditType::StakingReward,
                    Some(source),
                    now,
                )
                .await?;
            report.topped_up.push((snapshot.user_id, reward));
        }

        if report.topped_up.is_empty() {
            debug!(date = %distribution_date, eligible = report.eligible, "Staking cycle reconciled, nothing missing");
            return Ok(report);
        }

        record.users_rewarded = (credited.len() + report.topped_up.len()) as u32;
        batch.push(WriteOp::UpdateStakingCycle(record));
        self.economics.hooks.commit(self.store(), batch).await?;
        warn!(
            date = %distribution_date,
            topped_up = report.topped_up.len(),
            "Staking cycle reconciled with missing credits"
        );
        Ok(report)
    }
}

enum SnapshotOutcome {
    Created,
    AlreadyPresent,
    BelowMinimum,
}
