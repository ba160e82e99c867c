use crate::backend::{LedgerStore, Result, StorageError, Table};
use crate::batch::{WriteBatch, WriteOp};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rsc_types::{
    BalanceEntry, BalanceEntryId, BalanceLot, Bounty, BountyId, BountySolution, CreditSource,
    Deposit, DepositId, Distribution, DistributionId, DistributionType, Escrow, EscrowId,
    FundingCredit, FundingCreditId, LotId, PaidStatus, SolutionId, StakingDistributionRecord,
    StakingSnapshot, UserId, Withdrawal, WithdrawalId,
};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

#[derive(Debug, Clone, Default)]
pub(crate) struct Tables {
    pub(crate) entries: BTreeMap<BalanceEntryId, BalanceEntry>,
    pub(crate) lots: BTreeMap<LotId, BalanceLot>,
    pub(crate) distributions: BTreeMap<DistributionId, Distribution>,
    pub(crate) escrows: BTreeMap<EscrowId, Escrow>,
    pub(crate) bounties: BTreeMap<BountyId, Bounty>,
    pub(crate) solutions: BTreeMap<SolutionId, BountySolution>,
    pub(crate) withdrawals: BTreeMap<WithdrawalId, Withdrawal>,
    pub(crate) deposits: BTreeMap<DepositId, Deposit>,
    pub(crate) funding_credits: BTreeMap<FundingCreditId, FundingCredit>,
    pub(crate) snapshots: BTreeMap<(UserId, NaiveDate), StakingSnapshot>,
    pub(crate) staking_cycles: BTreeMap<NaiveDate, StakingDistributionRecord>,
    pub(crate) reputation: HashMap<UserId, Decimal>,
}

impl Tables {
    fn apply(&mut self, op: WriteOp) -> Result<()> {
        match op {
            WriteOp::InsertEntry(entry) => {
                if self.entries.contains_key(&entry.id) {
                    return Err(unique("balance_entries", entry.id));
                }
                if entry.is_locked != entry.lock_type.is_some() {
                    return Err(StorageError::ConstraintViolation(format!(
                        "{} lock flag disagrees with lock type",
                        entry.id
                    )));
                }
                self.entries.insert(entry.id, entry);
            }
            WriteOp::InsertLot(lot) => {
                if self.lots.contains_key(&lot.id) {
                    return Err(unique("lots", lot.id));
                }
                check_lot_bounds(&lot)?;
                self.lots.insert(lot.id, lot);
            }
            WriteOp::UpdateLot { lot_id, remaining } => {
                let lot = self
                    .lots
                    .get_mut(&lot_id)
                    .ok_or_else(|| StorageError::NotFound(lot_id.to_string()))?;
                lot.remaining_amount = remaining;
                check_lot_bounds(lot)?;
            }
            WriteOp::InsertDistribution(distribution) => {
                if self.distributions.contains_key(&distribution.id) {
                    return Err(unique("distributions", distribution.id));
                }
                self.distributions.insert(distribution.id, distribution);
            }
            WriteOp::UpdateDistribution(distribution) => {
                if !self.distributions.contains_key(&distribution.id) {
                    return Err(StorageError::NotFound(distribution.id.to_string()));
                }
                self.distributions.insert(distribution.id, distribution);
            }
            WriteOp::PutEscrow(escrow) => {
                if escrow.amount_holding.is_negative()
                    || escrow.amount_holding > escrow.amount_funded
                {
                    return Err(StorageError::ConstraintViolation(format!(
                        "{} holding {} outside [0, {}]",
                        escrow.id, escrow.amount_holding, escrow.amount_funded
                    )));
                }
                if let Some(existing) = self.escrows.get(&escrow.id) {
                    if escrow.amount_holding > existing.amount_holding {
                        return Err(StorageError::ConstraintViolation(format!(
                            "{} holding may not increase",
                            escrow.id
                        )));
                    }
                }
                self.escrows.insert(escrow.id, escrow);
            }
            WriteOp::PutBounty(bounty) => {
                self.bounties.insert(bounty.id, bounty);
            }
            WriteOp::PutSolution(solution) => {
                self.solutions.insert(solution.id, solution);
            }
            WriteOp::PutWithdrawal(withdrawal) => {
                self.withdrawals.insert(withdrawal.id, withdrawal);
            }
            WriteOp::InsertDeposit(deposit) => {
                if self
                    .deposits
                    .values()
                    .any(|d| d.transaction_hash == deposit.transaction_hash)
                {
                    return Err(StorageError::UniqueViolation {
                        table: "deposits",
                        key: deposit.transaction_hash,
                    });
                }
                self.deposits.insert(deposit.id, deposit);
            }
            WriteOp::InsertFundingCredit(credit) => {
                if self.funding_credits.contains_key(&credit.id) {
                    return Err(unique("funding_credits", credit.id));
                }
                self.funding_credits.insert(credit.id, credit);
            }
            WriteOp::InsertSnapshot(snapshot) => {
                let key = (snapshot.user_id, snapshot.snapshot_date);
                if self.snapshots.contains_key(&key) {
                    return Err(StorageError::UniqueViolation {
                        table: "staking_snapshots",
                        key: format!("{}@{}", snapshot.user_id, snapshot.snapshot_date),
                    });
                }
                self.snapshots.insert(key, snapshot);
            }
            WriteOp::InsertStakingCycle(cycle) => {
                if self.staking_cycles.contains_key(&cycle.distribution_date) {
                    return Err(unique("staking_cycles", cycle.distribution_date));
                }
                self.staking_cycles.insert(cycle.distribution_date, cycle);
            }
            WriteOp::UpdateStakingCycle(cycle) => {
                if !self.staking_cycles.contains_key(&cycle.distribution_date) {
                    return Err(StorageError::NotFound(format!(
                        "staking cycle {}",
                        cycle.distribution_date
                    )));
                }
                self.staking_cycles.insert(cycle.distribution_date, cycle);
            }
            WriteOp::AdjustReputation { user_id, delta } => {
                *self.reputation.entry(user_id).or_insert(Decimal::ZERO) += delta;
            }
        }
        Ok(())
    }
}

fn unique(table: &'static str, key: impl ToString) -> StorageError {
    StorageError::UniqueViolation {
        table,
        key: key.to_string(),
    }
}

fn check_lot_bounds(lot: &BalanceLot) -> Result<()> {
    if lot.remaining_amount.is_negative() || lot.remaining_amount > lot.original_amount {
        return Err(StorageError::ConstraintViolation(format!(
            "{} remaining {} outside [0, {}]",
            lot.id, lot.remaining_amount, lot.original_amount
        )));
    }
    Ok(())
}

/// In-memory ledger store for tests, development, and single-node deployments
/// that persist through [`crate::LedgerSnapshot`].
pub struct MemoryBackend {
    tables: Arc<RwLock<Tables>>,
    sequences: Arc<Mutex<HashMap<Table, u64>>>,
    fail_next_commits: AtomicUsize,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
            sequences: Arc::new(Mutex::new(HashMap::new())),
            fail_next_commits: AtomicUsize::new(0),
        }
    }

    pub(crate) fn from_parts(tables: Tables, sequences: HashMap<Table, u64>) -> Self {
        Self {
            tables: Arc::new(RwLock::new(tables)),
            sequences: Arc::new(Mutex::new(sequences)),
            fail_next_commits: AtomicUsize::new(0),
        }
    }

    pub(crate) async fn export_parts(&self) -> (Tables, HashMap<Table, u64>) {
        let tables = self.tables.read().await.clone();
        let sequences = self.sequences.lock().await.clone();
        (tables, sequences)
    }

    /// Make the next `n` commits fail before touching any table.
    pub fn fail_next_commits(&self, n: usize) {
        self.fail_next_commits.store(n, Ordering::SeqCst);
    }

    fn take_injected_failure(&self) -> bool {
        self.fail_next_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl LedgerStore for MemoryBackend {
    async fn next_id(&self, table: Table) -> Result<u64> {
        let mut sequences = self.sequences.lock().await;
        let next = sequences.entry(table).or_insert(0);
        *next += 1;
        Ok(*next)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<()> {
        if self.take_injected_failure() {
            warn!(ops = batch.len(), "Injected commit failure");
            return Err(StorageError::BackendError(
                "injected commit failure".to_string(),
            ));
        }

        let op_count = batch.len();
        let mut tables = self.tables.write().await;
        let mut staged = tables.clone();
        for op in batch.into_ops() {
            staged.apply(op)?;
        }
        *tables = staged;

        debug!(ops = op_count, "Batch committed");
        Ok(())
    }

    async fn entries_for_user(&self, user_id: UserId) -> Result<Vec<BalanceEntry>> {
        let tables = self.tables.read().await;
        Ok(tables
            .entries
            .values()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn all_entries(&self) -> Result<Vec<BalanceEntry>> {
        let tables = self.tables.read().await;
        Ok(tables.entries.values().cloned().collect())
    }

    async fn lots_for_user(&self, user_id: UserId) -> Result<Vec<BalanceLot>> {
        let tables = self.tables.read().await;
        let mut lots: Vec<BalanceLot> = tables
            .lots
            .values()
            .filter(|l| l.user_id == user_id)
            .cloned()
            .collect();
        lots.sort_by(|a, b| a.entry_date.cmp(&b.entry_date).then(a.id.cmp(&b.id)));
        Ok(lots)
    }

    async fn users_with_open_lots(&self) -> Result<Vec<UserId>> {
        let tables = self.tables.read().await;
        let users: BTreeSet<UserId> = tables
            .lots
            .values()
            .filter(|l| l.is_open())
            .map(|l| l.user_id)
            .collect();
        Ok(users.into_iter().collect())
    }

    async fn get_distribution(&self, id: DistributionId) -> Result<Option<Distribution>> {
        Ok(self.tables.read().await.distributions.get(&id).cloned())
    }

    async fn distributions_for_recipient(&self, user_id: UserId) -> Result<Vec<Distribution>> {
        let tables = self.tables.read().await;
        Ok(tables
            .distributions
            .values()
            .filter(|d| d.recipient_id == user_id)
            .cloned()
            .collect())
    }

    async fn find_active_distribution(
        &self,
        distribution_type: DistributionType,
        source_key: &str,
        recipient_id: UserId,
    ) -> Result<Option<Distribution>> {
        let tables = self.tables.read().await;
        Ok(tables
            .distributions
            .values()
            .find(|d| {
                !d.is_removed
                    && d.distribution_type == distribution_type
                    && d.recipient_id == recipient_id
                    && d.source_key == source_key
            })
            .cloned())
    }

    async fn get_escrow(&self, id: EscrowId) -> Result<Option<Escrow>> {
        Ok(self.tables.read().await.escrows.get(&id).cloned())
    }

    async fn get_bounty(&self, id: BountyId) -> Result<Option<Bounty>> {
        Ok(self.tables.read().await.bounties.get(&id).cloned())
    }

    async fn open_bounties_expiring_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Bounty>> {
        let tables = self.tables.read().await;
        Ok(tables
            .bounties
            .values()
            .filter(|b| b.is_open() && b.is_expired_at(cutoff))
            .cloned()
            .collect())
    }

    async fn get_solution(&self, id: SolutionId) -> Result<Option<BountySolution>> {
        Ok(self.tables.read().await.solutions.get(&id).cloned())
    }

    async fn solutions_for_bounty(&self, bounty_id: BountyId) -> Result<Vec<BountySolution>> {
        let tables = self.tables.read().await;
        Ok(tables
            .solutions
            .values()
            .filter(|s| s.bounty_id == bounty_id)
            .cloned()
            .collect())
    }

    async fn get_withdrawal(&self, id: WithdrawalId) -> Result<Option<Withdrawal>> {
        Ok(self.tables.read().await.withdrawals.get(&id).cloned())
    }

    async fn withdrawals_for_user(&self, user_id: UserId) -> Result<Vec<Withdrawal>> {
        let tables = self.tables.read().await;
        let mut withdrawals: Vec<Withdrawal> = tables
            .withdrawals
            .values()
            .filter(|w| w.user_id == user_id)
            .cloned()
            .collect();
        withdrawals.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(withdrawals)
    }

    async fn pending_withdrawals(&self) -> Result<Vec<Withdrawal>> {
        let tables = self.tables.read().await;
        let mut pending: Vec<Withdrawal> = tables
            .withdrawals
            .values()
            .filter(|w| w.paid_status == PaidStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(pending)
    }

    async fn deposit_by_tx_hash(&self, transaction_hash: &str) -> Result<Option<Deposit>> {
        let tables = self.tables.read().await;
        Ok(tables
            .deposits
            .values()
            .find(|d| d.transaction_hash == transaction_hash)
            .cloned())
    }

    async fn funding_credits_for_user(&self, user_id: UserId) -> Result<Vec<FundingCredit>> {
        let tables = self.tables.read().await;
        let mut credits: Vec<FundingCredit> = tables
            .funding_credits
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        credits.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(credits)
    }

    async fn funding_credits_for_source(&self, source: CreditSource) -> Result<Vec<FundingCredit>> {
        let tables = self.tables.read().await;
        Ok(tables
            .funding_credits
            .values()
            .filter(|c| c.source == Some(source))
            .cloned()
            .collect())
    }

    async fn get_snapshot(
        &self,
        user_id: UserId,
        date: NaiveDate,
    ) -> Result<Option<StakingSnapshot>> {
        Ok(self
            .tables
            .read()
            .await
            .snapshots
            .get(&(user_id, date))
            .cloned())
    }

    async fn latest_snapshots_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<StakingSnapshot>> {
        let tables = self.tables.read().await;
        // keys order by (user, date), so the last hit per user is the newest
        let mut latest: BTreeMap<UserId, StakingSnapshot> = BTreeMap::new();
        for ((user_id, date), snapshot) in &tables.snapshots {
            if *date >= from && *date <= to {
                latest.insert(*user_id, snapshot.clone());
            }
        }
        Ok(latest.into_values().collect())
    }

    async fn get_staking_cycle(&self, date: NaiveDate) -> Result<Option<StakingDistributionRecord>> {
        Ok(self.tables.read().await.staking_cycles.get(&date).cloned())
    }

    async fn latest_completed_staking_cycle(&self) -> Result<Option<StakingDistributionRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .staking_cycles
            .values()
            .rev()
            .find(|c| c.is_completed())
            .cloned())
    }

    async fn reputation(&self, user_id: UserId) -> Result<Decimal> {
        Ok(self
            .tables
            .read()
            .await
            .reputation
            .get(&user_id)
            .copied()
            .unwrap_or(Decimal::ZERO))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsc_types::{RscAmount, SourceRef};

    fn entry(id: u64, user: u64, amount: i64) -> BalanceEntry {
        BalanceEntry {
            id: BalanceEntryId(id),
            user_id: UserId(user),
            amount: RscAmount::from_rsc(amount),
            source: SourceRef::Deposit(DepositId(id)),
            is_locked: false,
            lock_type: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_sequences_are_per_table() {
        let store = MemoryBackend::new();
        assert_eq!(store.next_id(Table::Lots).await.unwrap(), 1);
        assert_eq!(store.next_id(Table::Lots).await.unwrap(), 2);
        assert_eq!(store.next_id(Table::Escrows).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_op_rolls_back_whole_batch() {
        let store = MemoryBackend::new();
        let mut batch = WriteBatch::new();
        batch.push(WriteOp::InsertEntry(entry(1, 1, 10)));
        batch.push(WriteOp::UpdateLot {
            lot_id: LotId(404),
            remaining: RscAmount::ZERO,
        });

        assert!(matches!(
            store.commit(batch).await,
            Err(StorageError::NotFound(_))
        ));
        assert!(store.all_entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_injected_failures_are_counted() {
        let store = MemoryBackend::new();
        store.fail_next_commits(1);

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::InsertEntry(entry(1, 1, 10)));
        assert!(store.commit(batch.clone()).await.is_err());
        assert!(store.commit(batch).await.is_ok());
        assert_eq!(store.entries_for_user(UserId(1)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_lot_remaining_bounds_enforced() {
        let store = MemoryBackend::new();
        let e = entry(1, 1, 50);
        let lot = BalanceLot::from_entry(LotId(1), &e);

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::InsertEntry(e));
        batch.push(WriteOp::InsertLot(lot));
        store.commit(batch).await.unwrap();

        let mut overdraw = WriteBatch::new();
        overdraw.push(WriteOp::UpdateLot {
            lot_id: LotId(1),
            remaining: RscAmount::from_rsc(-1),
        });
        assert!(matches!(
            store.commit(overdraw).await,
            Err(StorageError::ConstraintViolation(_))
        ));

        let mut inflate = WriteBatch::new();
        inflate.push(WriteOp::UpdateLot {
            lot_id: LotId(1),
            remaining: RscAmount::from_rsc(51),
        });
        assert!(store.commit(inflate).await.is_err());

        let lots = store.lots_for_user(UserId(1)).await.unwrap();
        assert_eq!(lots[0].remaining_amount, RscAmount::from_rsc(50));
    }

    #[tokio::test]
    async fn test_latest_snapshot_per_user_within_window() {
        let store = MemoryBackend::new();
        let day = |d: u32| NaiveDate::from_ymd_opt(2024, 6, d).unwrap();
        let snap = |id: u64, user: u64, date: NaiveDate, weighted: i64| StakingSnapshot {
            id: rsc_types::SnapshotId(id),
            user_id: UserId(user),
            snapshot_date: date,
            rsc_balance: RscAmount::from_rsc(weighted),
            multiplier: Decimal::ONE,
            weighted_balance: RscAmount::from_rsc(weighted),
            created_at: Utc::now(),
        };

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::InsertSnapshot(snap(1, 1, day(8), 100)));
        batch.push(WriteOp::InsertSnapshot(snap(2, 2, day(8), 200)));
        batch.push(WriteOp::InsertSnapshot(snap(3, 2, day(9), 250)));
        batch.push(WriteOp::InsertSnapshot(snap(4, 1, day(10), 999)));
        batch.push(WriteOp::InsertSnapshot(snap(5, 3, day(1), 50)));
        store.commit(batch).await.unwrap();

        let latest = store.latest_snapshots_between(day(3), day(9)).await.unwrap();
        let picked: Vec<(UserId, NaiveDate)> =
            latest.iter().map(|s| (s.user_id, s.snapshot_date)).collect();
        assert_eq!(picked, vec![(UserId(1), day(8)), (UserId(2), day(9))]);
    }

    #[tokio::test]
    async fn test_reputation_adjustments_accumulate() {
        let store = MemoryBackend::new();
        let mut batch = WriteBatch::new();
        batch.push(WriteOp::AdjustReputation {
            user_id: UserId(7),
            delta: Decimal::from(5),
        });
        batch.push(WriteOp::AdjustReputation {
            user_id: UserId(7),
            delta: Decimal::from(-2),
        });
        store.commit(batch).await.unwrap();
        assert_eq!(store.reputation(UserId(7)).await.unwrap(), Decimal::from(3));
    }
}
