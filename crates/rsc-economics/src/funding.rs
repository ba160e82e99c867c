use crate::error::{LedgerError, Result};
use crate::hooks::HookRegistry;
use chrono::{DateTime, Utc};
use rsc_storage::{LedgerStore, LockKey, RowLocks, Table, WriteBatch, WriteOp};
use rsc_types::{CreditSource, CreditType, FundingCredit, FundingCreditId, RscAmount, UserId};
use std::sync::Arc;
use tracing::info;

/// Non-withdrawable credits earned through staking and spent on fundraises.
pub struct FundingCreditManager {
    store: Arc<dyn LedgerStore>,
    locks: Arc<RowLocks>,
    hooks: Arc<HookRegistry>,
}

impl FundingCreditManager {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        locks: Arc<RowLocks>,
        hooks: Arc<HookRegistry>,
    ) -> Self {
        Self {
            store,
            locks,
            hooks,
        }
    }

    pub async fn get_balance(&self, user_id: UserId) -> Result<RscAmount> {
        let credits = self.store.funding_credits_for_user(user_id).await?;
        Ok(credits.iter().map(|c| c.amount).sum())
    }

    pub async fn recent_transactions(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<FundingCredit>> {
        let mut credits = self.store.funding_credits_for_user(user_id).await?;
        credits.truncate(limit);
        Ok(credits)
    }

    /// Stage one credit row into a caller-owned transaction.
    ///
    /// The sign must match `credit_type`: rewards are positive, fundraise
    /// contributions are negative spends, adjustments are non-zero.
    pub async fn stage_credit(
        &self,
        batch: &mut WriteBatch,
        user_id: UserId,
        amount: RscAmount,
        credit_type: CreditType,
        source: Option<CreditSource>,
        at: DateTime<Utc>,
    ) -> Result<FundingCredit> {
        let sign_ok = match credit_type {
            CreditType::StakingReward => amount.is_positive(),
            CreditType::FundraiseContribution => amount.is_negative(),
            CreditType::Adjustment => !amount.is_zero(),
        };
        if !sign_ok {
            return Err(LedgerError::InvalidAmount(format!(
                "{:?} credit cannot be {}",
                credit_type, amount
            )));
        }

        let credit = FundingCredit {
            id: FundingCreditId(self.store.next_id(Table::FundingCredits).await?),
            user_id,
            amount,
            credit_type,
            source,
            created_at: at,
        };
        batch.push(WriteOp::InsertFundingCredit(credit.clone()));
        Ok(credit)
    }

    pub async fn add_credits(
        &self,
        user_id: UserId,
        amount: RscAmount,
        credit_type: CreditType,
        source: Option<CreditSource>,
        at: DateTime<Utc>,
    ) -> Result<FundingCredit> {
        if !amount.is_positive() {
            return Err(LedgerError::InvalidAmount(
                "Credit amount must be positive".to_string(),
            ));
        }

        let mut batch = WriteBatch::new();
        let credit = self
            .stage_credit(&mut batch, user_id, amount, credit_type, source, at)
            .await?;
        self.hooks.commit(self.store.as_ref(), batch).await?;

        info!(user = %user_id, amount = %amount, kind = ?credit_type, "🪙 Funding credits added");
        Ok(credit)
    }

    /// Spend credits on a fundraise contribution, as a negative row.
    pub async fn spend_credits(
        &self,
        user_id: UserId,
        amount: RscAmount,
        source: Option<CreditSource>,
        at: DateTime<Utc>,
    ) -> Result<FundingCredit> {
        if !amount.is_positive() {
            return Err(LedgerError::InvalidAmount(
                "Spend amount must be positive".to_string(),
            ));
        }

        let _guard = self.locks.acquire(LockKey::User(user_id)).await;
        let available = self.get_balance(user_id).await?;
        if amount > available {
            return Err(LedgerError::InsufficientCreditBalance {
                user_id,
                requested: amount,
                available,
            });
        }

        let mut batch = WriteBatch::new();
        let credit = self
            .stage_credit(
                &mut batch,
                user_id,
                -amount,
                CreditType::FundraiseContribution,
                source,
                at,
            )
            .await?;
        self.hooks.commit(self.store.as_ref(), batch).await?;

        info!(
            user = %user_id,
            amount = %amount,
            remaining = %(available - amount),
            "🪙 Funding credits spent"
        );
        Ok(credit)
    }
}
