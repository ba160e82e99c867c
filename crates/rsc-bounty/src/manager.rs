use crate::error::{BountyError, Result};
use crate::escrow::EscrowManager;
use chrono::{DateTime, Duration, Utc};
use rsc_economics::{calculate_fees, Clock, DistributionSpec, EconomicsEngine, LedgerError};
use rsc_storage::{LedgerStore, LockKey, Table, WriteBatch, WriteOp};
use rsc_types::{
    Bounty, BountyId, BountySolution, BountyStatus, ContentRef, DistributionType, DocumentId,
    Escrow, EscrowId, HoldType, LedgerEvent, RscAmount, SolutionId, SolutionStatus, SourceRecord,
    SourceRef, UserId,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BountyConfig {
    pub min_amount: RscAmount,
    pub max_amount: RscAmount,
    pub default_expiration_days: i64,
}

impl Default for BountyConfig {
    fn default() -> Self {
        Self {
            min_amount: RscAmount::from_rsc(10),
            max_amount: RscAmount::from_rsc(1_000_000),
            default_expiration_days: 30,
        }
    }
}

/// Outcome of one expiry sweep.
#[derive(Debug, Default, Clone)]
pub struct ExpirySweep {
    pub expired: Vec<BountyId>,
    pub failed: Vec<(BountyId, String)>,
}

/// Bounty lifecycle over an escrow hold.
///
/// ```text
/// OPEN ──award (escrow drained)──▶ AWARDED
///   ├──close by creator──────────▶ AWARDED | REFUNDED
///   └──expiry sweep──────────────▶ EXPIRED
/// ```
pub struct BountyManager {
    store: Arc<dyn LedgerStore>,
    economics: Arc<EconomicsEngine>,
    escrows: Arc<EscrowManager>,
    clock: Arc<dyn Clock>,
    config: BountyConfig,
}

impl BountyManager {
    pub fn new(economics: Arc<EconomicsEngine>, config: BountyConfig) -> Self {
        let escrows = Arc::new(EscrowManager::new(
            economics.balances.clone(),
            economics.distributor.clone(),
        ));
        Self {
            store: economics.store.clone(),
            clock: economics.clock.clone(),
            escrows,
            economics,
            config,
        }
    }

    pub fn escrows(&self) -> &Arc<EscrowManager> {
        &self.escrows
    }

    pub async fn get_bounty(&self, id: BountyId) -> Result<Bounty> {
        self.store
            .get_bounty(id)
            .await?
            .ok_or(BountyError::BountyNotFound(id))
    }

    pub async fn get_solution(&self, id: SolutionId) -> Result<BountySolution> {
        self.store
            .get_solution(id)
            .await?
            .ok_or(BountyError::SolutionNotFound(id))
    }

    pub async fn solutions(&self, bounty_id: BountyId) -> Result<Vec<BountySolution>> {
        Ok(self.store.solutions_for_bounty(bounty_id).await?)
    }

    /// Fund a new bounty: the creator pays `amount` into escrow plus fees on
    /// top, all in one transaction.
    pub async fn create_bounty(
        &self,
        created_by_id: UserId,
        amount: RscAmount,
        item: ContentRef,
        unified_document_id: DocumentId,
        expiration_date: Option<DateTime<Utc>>,
    ) -> Result<Bounty> {
        if amount < self.config.min_amount {
            return Err(BountyError::InvalidAmount(format!(
                "{} is below the minimum bounty of {}",
                amount, self.config.min_amount
            )));
        }
        if amount > self.config.max_amount {
            return Err(BountyError::InvalidAmount(format!(
                "{} exceeds the maximum bounty of {}",
                amount, self.config.max_amount
            )));
        }

        let now = self.clock.now();
        let expiration_date = expiration_date
            .unwrap_or_else(|| now + Duration::days(self.config.default_expiration_days));
        if expiration_date <= now {
            return Err(BountyError::InvalidAmount(
                "expiration date must be in the future".to_string(),
            ));
        }

        let schedule = self.economics.fees.active_schedule().await;
        let fees = calculate_fees(amount, &schedule);

        let _guard = self
            .economics
            .locks
            .acquire(LockKey::User(created_by_id))
            .await;

        let required = amount + fees.total;
        let available = self
            .economics
            .balances
            .get_withdrawable_balance(created_by_id)
            .await?;
        if available < required {
            return Err(LedgerError::InsufficientBalance {
                user_id: created_by_id,
                requested: required,
                available,
            }
            .into());
        }

        let bounty_id = BountyId(self.store.next_id(Table::Bounties).await?);
        let escrow_id = EscrowId(self.store.next_id(Table::Escrows).await?);
        let bounty = Bounty {
            id: bounty_id,
            amount,
            escrow_id,
            created_by_id,
            item,
            unified_document_id,
            status: BountyStatus::Open,
            expiration_date,
            created_at: now,
            closed_at: None,
        };

        let mut batch = WriteBatch::new();
        self.escrows
            .stage_fund(
                &mut batch,
                escrow_id,
                created_by_id,
                amount,
                HoldType::Bounty,
                item,
                Some(bounty_id),
                now,
            )
            .await?;
        self.economics
            .fees
            .stage_fee_deduction(
                &mut batch,
                created_by_id,
                &fees,
                &schedule,
                SourceRef::BountyFee(bounty_id),
                now,
            )
            .await?;

        let source = SourceRecord::Bounty(Box::new(bounty.clone()));
        self.economics
            .distributor
            .ensure_unique(&batch, DistributionType::BountyCreated, created_by_id, &source)
            .await?;
        self.economics
            .distributor
            .stage(
                &mut batch,
                DistributionSpec::new(DistributionType::BountyCreated, RscAmount::ZERO),
                created_by_id,
                &source,
                now,
                None,
            )
            .await?;

        batch.push(WriteOp::PutBounty(bounty.clone()));
        batch.emit(LedgerEvent::BountyStatusChanged {
            bounty_id,
            status: BountyStatus::Open,
        });
        self.commit(batch).await?;

        info!(
            bounty = %bounty_id,
            escrow = %escrow_id,
            creator = %created_by_id,
            amount = %amount,
            fee = %fees.total,
            expires = %expiration_date,
            "🎯 Bounty created"
        );
        Ok(bounty)
    }

    pub async fn submit_solution(
        &self,
        bounty_id: BountyId,
        created_by_id: UserId,
        item: ContentRef,
    ) -> Result<BountySolution> {
        let bounty = self.get_bounty(bounty_id).await?;
        let now = self.clock.now();
        ensure_open(&bounty, "submit a solution to")?;
        if bounty.is_expired_at(now) {
            return Err(BountyError::InvalidBountyState {
                bounty_id,
                status: BountyStatus::Expired,
                operation: "submit a solution to",
            });
        }

        let solution = BountySolution {
            id: SolutionId(self.store.next_id(Table::Solutions).await?),
            bounty_id,
            created_by_id,
            item,
            status: SolutionStatus::Submitted,
            awarded_amount: RscAmount::ZERO,
            awarded_by_id: None,
            created_at: now,
            updated_at: now,
        };
        let mut batch = WriteBatch::new();
        batch.push(WriteOp::PutSolution(solution.clone()));
        self.commit(batch).await?;

        info!(bounty = %bounty_id, solution = %solution.id, author = %created_by_id, "📝 Solution submitted");
        Ok(solution)
    }

    pub async fn reject_solution(&self, solution_id: SolutionId, actor: UserId) -> Result<BountySolution> {
        let mut solution = self.get_solution(solution_id).await?;
        let bounty = self.get_bounty(solution.bounty_id).await?;
        let _guard = self
            .economics
            .locks
            .acquire(LockKey::Escrow(bounty.escrow_id))
            .await;

        ensure_creator(&bounty, actor, "reject solutions on")?;
        solution = self.get_solution(solution_id).await?;
        ensure_submitted(&solution)?;

        solution.status = SolutionStatus::Rejected;
        solution.updated_at = self.clock.now();
        let mut batch = WriteBatch::new();
        batch.push(WriteOp::PutSolution(solution.clone()));
        self.commit(batch).await?;

        info!(bounty = %bounty.id, solution = %solution_id, "Solution rejected");
        Ok(solution)
    }

    /// Pay `amount` from the bounty's escrow to a submitted solution's author.
    ///
    /// Awards on one bounty serialize on its escrow row lock, so the
    /// holding check and the decrement see the same state.
    pub async fn award_bounty_solution(
        &self,
        bounty_id: BountyId,
        solution_id: SolutionId,
        amount: RscAmount,
        actor: UserId,
    ) -> Result<BountySolution> {
        let bounty = self.get_bounty(bounty_id).await?;
        let solution = self.get_solution(solution_id).await?;
        if solution.bounty_id != bounty_id {
            return Err(BountyError::SolutionNotFound(solution_id));
        }

        let _guard = self
            .economics
            .locks
            .acquire_many([
                LockKey::Escrow(bounty.escrow_id),
                LockKey::User(solution.created_by_id),
            ])
            .await;

        // re-read everything under the locks
        let bounty = self.get_bounty(bounty_id).await?;
        let mut solution = self.get_solution(solution_id).await?;
        let mut escrow = self.escrows.get_escrow(bounty.escrow_id).await?;

        ensure_creator(&bounty, actor, "award")?;
        ensure_open(&bounty, "award")?;
        if escrow.is_drained() {
            return Err(BountyError::InvalidBountyState {
                bounty_id,
                status: bounty.status,
                operation: "award from a drained escrow of",
            });
        }
        ensure_submitted(&solution)?;

        let now = self.clock.now();
        let source = SourceRecord::BountySolution(Box::new(solution.clone()));
        let mut batch = WriteBatch::new();
        self.economics
            .distributor
            .ensure_unique(&batch, DistributionType::BountySolution, solution.created_by_id, &source)
            .await?;
        self.escrows
            .stage_payout(
                &mut batch,
                &mut escrow,
                solution.created_by_id,
                amount,
                DistributionType::BountySolution,
                &source,
                now,
                Some(actor),
            )
            .await?;

        solution.status = SolutionStatus::Awarded;
        solution.awarded_amount = amount;
        solution.awarded_by_id = Some(actor);
        solution.updated_at = now;
        batch.push(WriteOp::PutSolution(solution.clone()));

        if escrow.is_drained() {
            self.stage_close(&mut batch, bounty.clone(), BountyStatus::Awarded, now)?;
        }
        self.commit(batch).await?;

        info!(
            bounty = %bounty_id,
            solution = %solution_id,
            recipient = %solution.created_by_id,
            amount = %amount,
            escrow_remaining = %escrow.amount_holding,
            "🏆 Bounty solution awarded"
        );
        Ok(solution)
    }

    /// Creator closes the bounty early; any remainder returns to them.
    pub async fn close_bounty(&self, bounty_id: BountyId, actor: UserId) -> Result<Bounty> {
        let bounty = self.get_bounty(bounty_id).await?;
        let _guard = self
            .economics
            .locks
            .acquire_many([
                LockKey::Escrow(bounty.escrow_id),
                LockKey::User(bounty.created_by_id),
            ])
            .await;

        let bounty = self.get_bounty(bounty_id).await?;
        ensure_creator(&bounty, actor, "close")?;
        ensure_open(&bounty, "close")?;

        let any_awarded = self
            .store
            .solutions_for_bounty(bounty_id)
            .await?
            .iter()
            .any(|s| s.status == SolutionStatus::Awarded);
        let outcome = if any_awarded {
            BountyStatus::Awarded
        } else {
            BountyStatus::Refunded
        };

        let (closed, refunded) = self.refund_and_close(bounty, outcome).await?;
        info!(bounty = %bounty_id, status = %closed.status, refunded = %refunded, "🔒 Bounty closed");
        Ok(closed)
    }

    /// Expire every open bounty past its deadline, one transaction each.
    pub async fn expire_bounties(&self) -> Result<ExpirySweep> {
        let now = self.clock.now();
        let due = self.store.open_bounties_expiring_before(now).await?;
        let mut sweep = ExpirySweep::default();

        for candidate in due {
            match self.expire_one(candidate.id).await {
                Ok(Some(bounty)) => sweep.expired.push(bounty.id),
                Ok(None) => {}
                Err(e) => {
                    error!(bounty = %candidate.id, error = %e, "Failed to expire bounty");
                    sweep.failed.push((candidate.id, e.to_string()));
                }
            }
        }

        if !sweep.expired.is_empty() || !sweep.failed.is_empty() {
            info!(
                expired = sweep.expired.len(),
                failed = sweep.failed.len(),
                "⏰ Bounty expiry sweep finished"
            );
        }
        Ok(sweep)
    }

    async fn expire_one(&self, bounty_id: BountyId) -> Result<Option<Bounty>> {
        let bounty = self.get_bounty(bounty_id).await?;
        let _guard = self
            .economics
            .locks
            .acquire_many([
                LockKey::Escrow(bounty.escrow_id),
                LockKey::User(bounty.created_by_id),
            ])
            .await;

        // an award may have closed it while we waited
        let bounty = self.get_bounty(bounty_id).await?;
        if !bounty.is_open() {
            return Ok(None);
        }
        let (expired, refunded) = self.refund_and_close(bounty, BountyStatus::Expired).await?;
        warn!(bounty = %bounty_id, refunded = %refunded, "Bounty expired");
        Ok(Some(expired))
    }

    async fn refund_and_close(
        &self,
        bounty: Bounty,
        outcome: BountyStatus,
    ) -> Result<(Bounty, RscAmount)> {
        let now = self.clock.now();
        let mut escrow: Escrow = self.escrows.get_escrow(bounty.escrow_id).await?;
        let refunded = escrow.amount_holding;

        let mut batch = WriteBatch::new();
        let source = SourceRecord::Escrow(Box::new(escrow.clone()));
        self.escrows
            .stage_refund(
                &mut batch,
                &mut escrow,
                &source,
                now,
            )
            .await?;
        let closed = self.stage_close(&mut batch, bounty, outcome, now)?;
        self.commit(batch).await?;
        Ok((closed, refunded))
    }

    fn stage_close(
        &self,
        batch: &mut WriteBatch,
        mut bounty: Bounty,
        outcome: BountyStatus,
        at: DateTime<Utc>,
    ) -> Result<Bounty> {
        if !bounty.status.can_transition_to(outcome) {
            return Err(BountyError::InvalidBountyState {
                bounty_id: bounty.id,
                status: bounty.status,
                operation: "close",
            });
        }
        bounty.status = outcome;
        bounty.closed_at = Some(at);
        batch.push(WriteOp::PutBounty(bounty.clone()));
        batch.emit(LedgerEvent::BountyStatusChanged {
            bounty_id: bounty.id,
            status: outcome,
        });
        Ok(bounty)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<()> {
        self.economics
            .hooks
            .commit(self.store.as_ref(), batch)
            .await
            .map_err(BountyError::from)
    }
}

fn ensure_open(bounty: &Bounty, operation: &'static str) -> Result<()> {
    if !bounty.is_open() {
        return Err(BountyError::InvalidBountyState {
            bounty_id: bounty.id,
            status: bounty.status,
            operation,
        });
    }
    Ok(())
}

fn ensure_creator(bounty: &Bounty, actor: UserId, operation: &str) -> Result<()> {
    if bounty.created_by_id != actor {
        return Err(BountyError::InsufficientPermission(format!(
            "only the creator of {} may {} it",
            bounty.id, operation
        )));
    }
    Ok(())
}

fn ensure_submitted(solution: &BountySolution) -> Result<()> {
    if solution.status != SolutionStatus::Submitted {
        return Err(BountyError::InvalidSolutionState {
            solution_id: solution.id,
            status: solution.status,
        });
    }
    Ok(())
}
