use crate::error::{LedgerError, Result};
use crate::hooks::HookRegistry;
use crate::lots::LotAccountant;
use chrono::{DateTime, Utc};
use rsc_storage::{LedgerStore, LockKey, RowLocks, Table, WriteBatch, WriteOp};
use rsc_types::{
    BalanceEntry, BalanceEntryId, BalanceLot, ConsumedLot, LockType, LotId, RscAmount, SourceRef,
    UserId,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info};

/// Append-only RSC ledger.
///
/// Balances are never stored; they are the sum of a user's entries. Every
/// unlocked credit opens a lot and every unlocked debit drains lots in FIFO
/// order, so the open lots always sum to the unlocked balance.
pub struct BalanceManager {
    store: Arc<dyn LedgerStore>,
    locks: Arc<RowLocks>,
    hooks: Arc<HookRegistry>,
}

impl BalanceManager {
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

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    pub fn locks(&self) -> &Arc<RowLocks> {
        &self.locks
    }

    pub fn hooks(&self) -> &Arc<HookRegistry> {
        &self.hooks
    }

    pub async fn get_balance(&self, user_id: UserId) -> Result<RscAmount> {
        let entries = self.store.entries_for_user(user_id).await?;
        Ok(entries.iter().map(|e| e.amount).sum())
    }

    pub async fn get_unlocked_balance(&self, user_id: UserId) -> Result<RscAmount> {
        let entries = self.store.entries_for_user(user_id).await?;
        Ok(entries
            .iter()
            .filter(|e| !e.is_locked)
            .map(|e| e.amount)
            .sum())
    }

    pub async fn get_locked_balance(&self, user_id: UserId) -> Result<RscAmount> {
        let entries = self.store.entries_for_user(user_id).await?;
        Ok(entries
            .iter()
            .filter(|e| e.is_locked)
            .map(|e| e.amount)
            .sum())
    }

    /// Sum of open lots; equals the unlocked balance.
    pub async fn get_withdrawable_balance(&self, user_id: UserId) -> Result<RscAmount> {
        let lots = self.store.lots_for_user(user_id).await?;
        Ok(LotAccountant::available(&lots))
    }

    pub async fn entries(&self, user_id: UserId) -> Result<Vec<BalanceEntry>> {
        Ok(self.store.entries_for_user(user_id).await?)
    }

    pub async fn lots(&self, user_id: UserId) -> Result<Vec<BalanceLot>> {
        Ok(self.store.lots_for_user(user_id).await?)
    }

    pub async fn get_reputation(&self, user_id: UserId) -> Result<Decimal> {
        Ok(self.store.reputation(user_id).await?)
    }

    /// Stage a non-negative entry; unlocked positive credits also open a lot.
    ///
    /// Ledger credits are owned by the distributor and the deposit pipeline.
    pub async fn stage_credit(
        &self,
        batch: &mut WriteBatch,
        user_id: UserId,
        amount: RscAmount,
        source: SourceRef,
        lock_type: Option<LockType>,
        at: DateTime<Utc>,
    ) -> Result<BalanceEntry> {
        if amount.is_negative() {
            return Err(LedgerError::InvalidAmount(format!(
                "credit of {} to {} is negative",
                amount, user_id
            )));
        }

        let entry = BalanceEntry {
            id: BalanceEntryId(self.store.next_id(Table::BalanceEntries).await?),
            user_id,
            amount,
            source,
            is_locked: lock_type.is_some(),
            lock_type,
            created_at: at,
        };
        batch.push(WriteOp::InsertEntry(entry.clone()));

        if entry.opens_lot() {
            let lot_id = LotId(self.store.next_id(Table::Lots).await?);
            batch.push(WriteOp::InsertLot(BalanceLot::from_entry(lot_id, &entry)));
        }

        debug!(
            user = %user_id,
            amount = %amount,
            locked = entry.is_locked,
            source = ?source,
            "Staged credit"
        );
        Ok(entry)
    }

    /// Stage a debit of `amount` (positive). Unlocked debits drain lots FIFO;
    /// locked debits draw against the locked balance only.
    ///
    /// The caller must hold the user's row lock.
    pub async fn stage_debit(
        &self,
        batch: &mut WriteBatch,
        user_id: UserId,
        amount: RscAmount,
        source: SourceRef,
        lock_type: Option<LockType>,
        at: DateTime<Utc>,
    ) -> Result<(BalanceEntry, Vec<ConsumedLot>)> {
        if !amount.is_positive() {
            return Err(LedgerError::InvalidAmount(format!(
                "debit amount must be positive, got {}",
                amount
            )));
        }

        let consumed = match lock_type {
            None => {
                let committed = self.store.lots_for_user(user_id).await?;
                let lots = batch.overlay_lots(user_id, committed);
                let plan = LotAccountant::plan_consumption(&lots, amount).map_err(|s| {
                    LedgerError::InsufficientBalance {
                        user_id,
                        requested: s.requested,
                        available: s.available,
                    }
                })?;
                for step in &plan {
                    batch.push(WriteOp::UpdateLot {
                        lot_id: step.lot_id,
                        remaining: step.remaining_after,
                    });
                }
                plan
            }
            Some(_) => {
                let locked = self.get_locked_balance(user_id).await?;
                let pending: RscAmount = batch
                    .ops()
                    .iter()
                    .filter_map(|op| match op {
                        WriteOp::InsertEntry(e) if e.user_id == user_id && e.is_locked => {
                            Some(e.amount)
                        }
                        _ => None,
                    })
                    .sum();
                let available = locked + pending;
                if amount > available {
                    return Err(LedgerError::InsufficientBalance {
                        user_id,
                        requested: amount,
                        available,
                    });
                }
                Vec::new()
            }
        };

        let entry = BalanceEntry {
            id: BalanceEntryId(self.store.next_id(Table::BalanceEntries).await?),
            user_id,
            amount: -amount,
            source,
            is_locked: lock_type.is_some(),
            lock_type,
            created_at: at,
        };
        batch.push(WriteOp::InsertEntry(entry.clone()));

        debug!(
            user = %user_id,
            amount = %amount,
            lots_touched = consumed.len(),
            source = ?source,
            "Staged debit"
        );
        Ok((entry, consumed))
    }

    /// Debit `amount` from the user's unlocked balance as one transaction,
    /// returning the lots consumed oldest first.
    pub async fn withdraw(
        &self,
        user_id: UserId,
        amount: RscAmount,
        source: SourceRef,
        at: DateTime<Utc>,
    ) -> Result<Vec<ConsumedLot>> {
        let _guard = self.locks.acquire(LockKey::User(user_id)).await;
        let balance_before = self.get_balance(user_id).await?;

        let mut batch = WriteBatch::new();
        let (_, consumed) = self
            .stage_debit(&mut batch, user_id, amount, source, None, at)
            .await?;
        self.hooks.commit(self.store.as_ref(), batch).await?;

        info!(
            user = %user_id,
            amount = %amount,
            balance_before = %balance_before,
            balance_after = %(balance_before - amount),
            lots_consumed = consumed.len(),
            "💸 Balance debited"
        );
        Ok(consumed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rsc_storage::MemoryBackend;
    use rsc_types::{DepositId, WithdrawalId};

    fn manager() -> BalanceManager {
        BalanceManager::new(
            Arc::new(MemoryBackend::new()),
            Arc::new(RowLocks::new()),
            Arc::new(HookRegistry::new()),
        )
    }

    async fn credit(manager: &BalanceManager, user: UserId, amount: i64, at: DateTime<Utc>) {
        let mut batch = WriteBatch::new();
        manager
            .stage_credit(
                &mut batch,
                user,
                RscAmount::from_rsc(amount),
                SourceRef::Deposit(DepositId(amount as u64)),
                None,
                at,
            )
            .await
            .unwrap();
        manager.store().commit(batch).await.unwrap();
    }

    #[tokio::test]
    async fn test_fifo_withdrawal_leaves_newest_lot() {
        let manager = manager();
        let user = UserId(10);
        let now = Utc::now();
        credit(&manager, user, 50, now - Duration::days(10)).await;
        credit(&manager, user, 30, now - Duration::days(5)).await;

        let consumed = manager
            .withdraw(user, RscAmount::from_rsc(60), SourceRef::Withdrawal(WithdrawalId(1)), now)
            .await
            .unwrap();

        assert_eq!(consumed.len(), 2);
        let lots = manager.lots(user).await.unwrap();
        assert_eq!(lots[0].remaining_amount, RscAmount::ZERO);
        assert_eq!(lots[1].remaining_amount, RscAmount::from_rsc(20));
        assert_eq!(manager.get_balance(user).await.unwrap(), RscAmount::from_rsc(20));
        assert_eq!(
            manager.get_withdrawable_balance(user).await.unwrap(),
            manager.get_unlocked_balance(user).await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_overdraw_writes_nothing() {
        let manager = manager();
        let user = UserId(11);
        credit(&manager, user, 10, Utc::now()).await;

        let result = manager
            .withdraw(user, RscAmount::from_rsc(11), SourceRef::Withdrawal(WithdrawalId(1)), Utc::now())
            .await;

        assert!(matches!(
            result,
            Err(LedgerError::InsufficientBalance { available, .. }) if available == RscAmount::from_rsc(10)
        ));
        assert_eq!(manager.entries(user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_locked_credit_opens_no_lot() {
        let manager = manager();
        let user = UserId(12);
        let mut batch = WriteBatch::new();
        manager
            .stage_credit(
                &mut batch,
                user,
                RscAmount::from_rsc(25),
                SourceRef::Deposit(DepositId(1)),
                Some(LockType::ReferralBonus),
                Utc::now(),
            )
            .await
            .unwrap();
        manager.store().commit(batch).await.unwrap();

        assert_eq!(manager.get_balance(user).await.unwrap(), RscAmount::from_rsc(25));
        assert_eq!(manager.get_locked_balance(user).await.unwrap(), RscAmount::from_rsc(25));
        assert_eq!(manager.get_withdrawable_balance(user).await.unwrap(), RscAmount::ZERO);
        assert!(manager.lots(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_two_debits_in_one_batch_see_each_other() {
        let manager = manager();
        let user = UserId(13);
        credit(&manager, user, 100, Utc::now()).await;

        let mut batch = WriteBatch::new();
        let source = SourceRef::Withdrawal(WithdrawalId(1));
        manager
            .stage_debit(&mut batch, user, RscAmount::from_rsc(70), source, None, Utc::now())
            .await
            .unwrap();
        let second = manager
            .stage_debit(&mut batch, user, RscAmount::from_rsc(40), source, None, Utc::now())
            .await;

        assert!(matches!(second, Err(LedgerError::InsufficientBalance { .. })));
    }
}
