use rsc_types::{
    BalanceEntry, BalanceLot, Bounty, BountySolution, Deposit, Distribution, Escrow, FundingCredit,
    LedgerEvent, LotId, RscAmount, StakingDistributionRecord, StakingSnapshot, UserId, Withdrawal,
};
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub enum WriteOp {
    InsertEntry(BalanceEntry),
    InsertLot(BalanceLot),
    UpdateLot { lot_id: LotId, remaining: RscAmount },
    InsertDistribution(Distribution),
    UpdateDistribution(Distribution),
    PutEscrow(Escrow),
    PutBounty(Bounty),
    PutSolution(BountySolution),
    PutWithdrawal(Withdrawal),
    InsertDeposit(Deposit),
    InsertFundingCredit(FundingCredit),
    InsertSnapshot(StakingSnapshot),
    InsertStakingCycle(StakingDistributionRecord),
    UpdateStakingCycle(StakingDistributionRecord),
    AdjustReputation { user_id: UserId, delta: Decimal },
}

/// Ordered set of writes committed as one transaction.
///
/// Events queued with [`WriteBatch::emit`] are handed to post-commit hooks
/// by the caller once the batch is durable; they are never delivered for a
/// batch that fails to commit.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
    events: Vec<LedgerEvent>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: WriteOp) {
        self.ops.push(op);
    }

    pub fn emit(&mut self, event: LedgerEvent) {
        self.events.push(event);
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }

    pub fn take_events(&mut self) -> Vec<LedgerEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Committed lots of `user_id` with this batch's pending inserts and
    /// updates applied, in FIFO order.
    pub fn overlay_lots(&self, user_id: UserId, committed: Vec<BalanceLot>) -> Vec<BalanceLot> {
        let mut lots = committed;
        for op in &self.ops {
            match op {
                WriteOp::InsertLot(lot) if lot.user_id == user_id => lots.push(lot.clone()),
                WriteOp::UpdateLot { lot_id, remaining } => {
                    if let Some(lot) = lots.iter_mut().find(|l| l.id == *lot_id) {
                        lot.remaining_amount = *remaining;
                    }
                }
                _ => {}
            }
        }
        lots.sort_by(|a, b| a.entry_date.cmp(&b.entry_date).then(a.id.cmp(&b.id)));
        lots
    }

    /// Net amount this batch adds to `user_id`'s ledger.
    pub fn pending_delta(&self, user_id: UserId) -> RscAmount {
        self.ops
            .iter()
            .filter_map(|op| match op {
                WriteOp::InsertEntry(entry) if entry.user_id == user_id => Some(entry.amount),
                _ => None,
            })
            .sum()
    }
}
