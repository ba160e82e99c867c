use crate::distributor::{DistributionSpec, Distributor};
use crate::error::{LedgerError, Result};
use crate::ledger::BalanceManager;
use chrono::{DateTime, Utc};
use rsc_storage::{LockKey, WriteBatch};
use rsc_types::{
    Distribution, DistributionType, FeeBreakdown, FeeSchedule, RscAmount, SourceRecord, SourceRef,
    UserId,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Platform-owned ledger accounts that receive fees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemAccounts {
    pub revenue: UserId,
    pub dao: UserId,
}

impl Default for SystemAccounts {
    fn default() -> Self {
        Self {
            revenue: UserId(1),
            dao: UserId(2),
        }
    }
}

pub fn calculate_fees(gross: RscAmount, schedule: &FeeSchedule) -> FeeBreakdown {
    let rh = gross.scale(schedule.rh_pct);
    let dao = gross.scale(schedule.dao_pct);
    FeeBreakdown {
        total: rh + dao,
        rh,
        dao,
    }
}

pub struct FeeManager {
    balances: Arc<BalanceManager>,
    distributor: Arc<Distributor>,
    accounts: SystemAccounts,
    schedule: RwLock<FeeSchedule>,
}

impl FeeManager {
    pub fn new(
        balances: Arc<BalanceManager>,
        distributor: Arc<Distributor>,
        accounts: SystemAccounts,
        schedule: FeeSchedule,
    ) -> Self {
        Self {
            balances,
            distributor,
            accounts,
            schedule: RwLock::new(schedule),
        }
    }

    pub fn accounts(&self) -> SystemAccounts {
        self.accounts
    }

    pub async fn active_schedule(&self) -> FeeSchedule {
        *self.schedule.read().await
    }

    pub async fn set_schedule(&self, schedule: FeeSchedule) -> Result<()> {
        if !schedule.is_valid() {
            return Err(LedgerError::InvalidAmount(format!(
                "fee rates {} + {} must be non-negative and below 1",
                schedule.rh_pct, schedule.dao_pct
            )));
        }
        *self.schedule.write().await = schedule;
        info!(rh_pct = %schedule.rh_pct, dao_pct = %schedule.dao_pct, "⚙️ Fee schedule updated");
        Ok(())
    }

    /// Stage the payer's fee debit and the revenue and DAO distributions.
    ///
    /// The caller must hold the payer's row lock. Fee accounts only receive
    /// credits and are not locked.
    /// A zero fee stages nothing; a zero part skips its distribution.
    pub async fn stage_fee_deduction(
        &self,
        batch: &mut WriteBatch,
        payer_id: UserId,
        fees: &FeeBreakdown,
        schedule: &FeeSchedule,
        charged_for: SourceRef,
        at: DateTime<Utc>,
    ) -> Result<Vec<Distribution>> {
        if fees.is_zero() {
            return Ok(Vec::new());
        }
        if fees.total != fees.rh + fees.dao {
            return Err(LedgerError::FeeDeductionFailed(format!(
                "fee parts {} + {} do not sum to {}",
                fees.rh, fees.dao, fees.total
            )));
        }

        self.balances
            .stage_debit(batch, payer_id, fees.total, charged_for, None, at)
            .await?;

        let source = SourceRecord::FeeCharge {
            payer_id,
            schedule: *schedule,
            charged_for,
        };
        let mut paid = Vec::with_capacity(2);
        for (kind, amount, account) in [
            (DistributionType::FeeRh, fees.rh, self.accounts.revenue),
            (DistributionType::FeeDao, fees.dao, self.accounts.dao),
        ] {
            if amount.is_zero() {
                continue;
            }
            let distribution = self
                .distributor
                .stage(
                    batch,
                    DistributionSpec::new(kind, amount),
                    account,
                    &source,
                    at,
                    Some(payer_id),
                )
                .await
                .map_err(|e| LedgerError::FeeDeductionFailed(e.to_string()))?;
            paid.push(distribution);
        }
        Ok(paid)
    }

    pub async fn deduct_fees(
        &self,
        payer_id: UserId,
        fees: &FeeBreakdown,
        charged_for: SourceRef,
        at: DateTime<Utc>,
    ) -> Result<Vec<Distribution>> {
        let schedule = self.active_schedule().await;
        let _guard = self.balances.locks().acquire(LockKey::User(payer_id)).await;

        let mut batch = WriteBatch::new();
        let paid = self
            .stage_fee_deduction(&mut batch, payer_id, fees, &schedule, charged_for, at)
            .await?;
        self.balances
            .hooks()
            .commit(self.balances.store().as_ref(), batch)
            .await?;

        info!(
            payer = %payer_id,
            total = %fees.total,
            rh = %fees.rh,
            dao = %fees.dao,
            "🧾 Fees deducted"
        );
        Ok(paid)
    }
}
