use crate::error::{BountyError, Result};
use chrono::{DateTime, Utc};
use rsc_economics::{BalanceManager, DistributionSpec, Distributor};
use rsc_storage::{WriteBatch, WriteOp};
use rsc_types::{
    BountyId, ContentRef, Distribution, DistributionType, Escrow, EscrowId, HoldType, LedgerEvent,
    PaidStatusModel, RscAmount, SourceRecord, SourceRef, UserId,
};
use std::sync::Arc;
use tracing::debug;

/// Moves value between a creator's ledger and an escrow hold.
///
/// Every operation stages into a caller-owned batch; callers hold the row
/// locks of the escrow and of every user whose ledger is touched.
pub struct EscrowManager {
    balances: Arc<BalanceManager>,
    distributor: Arc<Distributor>,
}

impl EscrowManager {
    pub fn new(balances: Arc<BalanceManager>, distributor: Arc<Distributor>) -> Self {
        Self {
            balances,
            distributor,
        }
    }

    pub async fn get_escrow(&self, id: EscrowId) -> Result<Escrow> {
        self.balances
            .store()
            .get_escrow(id)
            .await?
            .ok_or(BountyError::EscrowNotFound(id))
    }

    /// Debit `amount` from the creator and open an escrow holding it.
    #[allow(clippy::too_many_arguments)]
    pub async fn stage_fund(
        &self,
        batch: &mut WriteBatch,
        id: EscrowId,
        created_by_id: UserId,
        amount: RscAmount,
        hold_type: HoldType,
        item: ContentRef,
        bounty_id: Option<BountyId>,
        at: DateTime<Utc>,
    ) -> Result<Escrow> {
        if !amount.is_positive() {
            return Err(BountyError::InvalidAmount(format!(
                "escrow amount must be positive, got {}",
                amount
            )));
        }

        self.balances
            .stage_debit(batch, created_by_id, amount, SourceRef::EscrowFunding(id), None, at)
            .await?;

        let mut escrow = Escrow {
            id,
            created_by_id,
            hold_type,
            amount_holding: amount,
            amount_funded: amount,
            item,
            bounty_id,
            paid_status: None,
            created_at: at,
            updated_at: at,
        };
        escrow.set_paid_pending();
        batch.push(WriteOp::PutEscrow(escrow.clone()));
        batch.emit(LedgerEvent::EscrowFunded {
            escrow_id: id,
            amount,
        });

        debug!(escrow = %id, creator = %created_by_id, amount = %amount, "Escrow funded");
        Ok(escrow)
    }

    /// Pay `amount` out of the escrow through the distributor.
    #[allow(clippy::too_many_arguments)]
    pub async fn stage_payout(
        &self,
        batch: &mut WriteBatch,
        escrow: &mut Escrow,
        recipient_id: UserId,
        amount: RscAmount,
        distribution_type: DistributionType,
        source: &SourceRecord,
        at: DateTime<Utc>,
        giver_id: Option<UserId>,
    ) -> Result<Distribution> {
        if !amount.is_positive() {
            return Err(BountyError::InvalidAmount(format!(
                "payout amount must be positive, got {}",
                amount
            )));
        }
        if amount > escrow.amount_holding {
            return Err(BountyError::InsufficientEscrow {
                escrow_id: escrow.id,
                requested: amount,
                holding: escrow.amount_holding,
            });
        }

        let distribution = self
            .distributor
            .stage(
                batch,
                DistributionSpec::new(distribution_type, amount),
                recipient_id,
                source,
                at,
                giver_id,
            )
            .await?;

        escrow.amount_holding -= amount;
        escrow.updated_at = at;
        if escrow.is_drained() {
            escrow.set_paid();
        }
        batch.push(WriteOp::PutEscrow(escrow.clone()));

        debug!(
            escrow = %escrow.id,
            recipient = %recipient_id,
            amount = %amount,
            holding = %escrow.amount_holding,
            "Escrow payout staged"
        );
        Ok(distribution)
    }

    /// Return whatever the escrow still holds to its creator.
    pub async fn stage_refund(
        &self,
        batch: &mut WriteBatch,
        escrow: &mut Escrow,
        source: &SourceRecord,
        at: DateTime<Utc>,
    ) -> Result<Option<Distribution>> {
        if escrow.is_drained() {
            return Ok(None);
        }
        let remaining = escrow.amount_holding;
        let creator = escrow.created_by_id;
        self.stage_payout(
            batch,
            escrow,
            creator,
            remaining,
            DistributionType::BountyRefund,
            source,
            at,
            None,
        )
        .await
        .map(Some)
    }
}
