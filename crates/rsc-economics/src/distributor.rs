use crate::error::{LedgerError, Result};
use crate::ledger::BalanceManager;
use chrono::{DateTime, Utc};
use rsc_storage::{LockKey, Table, WriteBatch, WriteOp};
use rsc_types::{
    DistributedStatus, Distribution, DistributionId, DistributionType, LedgerEvent, LockType,
    PaidStatus, Proof, RscAmount, SourceRecord, SourceRef, UserId,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

/// What to pay, independent of who receives it and why.
#[derive(Debug, Clone, PartialEq)]
pub struct DistributionSpec {
    pub distribution_type: DistributionType,
    pub amount: RscAmount,
    pub reputation: Decimal,
    pub lock_type: Option<LockType>,
    pub paid_status: Option<PaidStatus>,
}

impl DistributionSpec {
    pub fn new(distribution_type: DistributionType, amount: RscAmount) -> Self {
        Self {
            distribution_type,
            amount,
            reputation: Decimal::ZERO,
            lock_type: None,
            paid_status: None,
        }
    }

    /// Also raise the recipient's reputation by the distributed amount.
    pub fn give_rep(mut self) -> Self {
        self.reputation = self.amount.as_decimal();
        self
    }

    pub fn locked(mut self, lock_type: LockType) -> Self {
        self.lock_type = Some(lock_type);
        self
    }

    pub fn paid(mut self, status: PaidStatus) -> Self {
        self.paid_status = Some(status);
        self
    }

    fn validate(&self) -> Result<()> {
        let amount = self.amount;
        let ok = if amount.is_zero() {
            self.distribution_type.allows_zero()
        } else if amount.is_negative() {
            self.distribution_type.allows_negative()
        } else {
            !self.distribution_type.allows_negative()
        };
        if !ok {
            return Err(LedgerError::InvalidAmount(format!(
                "{} distribution cannot carry {}",
                self.distribution_type, amount
            )));
        }
        Ok(())
    }
}

/// The only path that credits the ledger on behalf of the platform.
///
/// Each distribution writes a proof snapshot, the distribution row and its
/// balance entry in one transaction.
pub struct Distributor {
    balances: Arc<BalanceManager>,
}

impl Distributor {
    pub fn new(balances: Arc<BalanceManager>) -> Self {
        Self { balances }
    }

    pub fn build_proof(source: &SourceRecord, timestamp: DateTime<Utc>) -> Result<Proof> {
        Ok(Proof {
            timestamp,
            table: source.table_name().to_string(),
            record: source.snapshot()?,
        })
    }

    pub async fn distribute(
        &self,
        spec: DistributionSpec,
        recipient_id: UserId,
        source: &SourceRecord,
        timestamp: DateTime<Utc>,
        giver_id: Option<UserId>,
    ) -> Result<Distribution> {
        let _guard = self
            .balances
            .locks()
            .acquire(LockKey::User(recipient_id))
            .await;

        let mut batch = WriteBatch::new();
        let distribution = self
            .stage(&mut batch, spec, recipient_id, source, timestamp, giver_id)
            .await?;
        self.commit(batch).await?;
        log_distributed(&distribution);
        Ok(distribution)
    }

    /// Like [`Distributor::distribute`], but refuses a second non-removed
    /// distribution with the same (type, source, recipient).
    pub async fn distribute_unique(
        &self,
        spec: DistributionSpec,
        recipient_id: UserId,
        source: &SourceRecord,
        timestamp: DateTime<Utc>,
        giver_id: Option<UserId>,
    ) -> Result<Distribution> {
        let _guard = self
            .balances
            .locks()
            .acquire(LockKey::User(recipient_id))
            .await;

        let mut batch = WriteBatch::new();
        self.ensure_unique(&batch, spec.distribution_type, recipient_id, source)
            .await?;
        let distribution = self
            .stage(&mut batch, spec, recipient_id, source, timestamp, giver_id)
            .await?;
        self.commit(batch).await?;
        log_distributed(&distribution);
        Ok(distribution)
    }

    pub async fn ensure_unique(
        &self,
        batch: &WriteBatch,
        distribution_type: DistributionType,
        recipient_id: UserId,
        source: &SourceRecord,
    ) -> Result<()> {
        let source_key = source.source_key();
        let staged = batch.ops().iter().any(|op| {
            matches!(op, WriteOp::InsertDistribution(d)
                if d.distribution_type == distribution_type
                    && d.recipient_id == recipient_id
                    && d.source_key == source_key)
        });
        let committed = self
            .balances
            .store()
            .find_active_distribution(distribution_type, &source_key, recipient_id)
            .await?;
        if staged || committed.is_some() {
            return Err(LedgerError::DuplicateDistribution {
                distribution_type,
                source_key,
                recipient_id,
            });
        }
        Ok(())
    }

    /// Stage a distribution into a caller-owned transaction.
    ///
    /// The caller must hold the recipient's row lock.
    pub async fn stage(
        &self,
        batch: &mut WriteBatch,
        spec: DistributionSpec,
        recipient_id: UserId,
        source: &SourceRecord,
        timestamp: DateTime<Utc>,
        giver_id: Option<UserId>,
    ) -> Result<Distribution> {
        spec.validate()?;

        let proof = Self::build_proof(source, timestamp)?;
        let id = DistributionId(self.balances.store().next_id(Table::Distributions).await?);
        let entry_source = SourceRef::Distribution(id);

        if spec.amount.is_negative() {
            self.balances
                .stage_debit(
                    batch,
                    recipient_id,
                    spec.amount.abs(),
                    entry_source,
                    spec.lock_type,
                    timestamp,
                )
                .await?;
        } else {
            self.balances
                .stage_credit(
                    batch,
                    recipient_id,
                    spec.amount,
                    entry_source,
                    spec.lock_type,
                    timestamp,
                )
                .await?;
        }

        if !spec.reputation.is_zero() {
            batch.push(WriteOp::AdjustReputation {
                user_id: recipient_id,
                delta: spec.reputation,
            });
        }

        let distribution = Distribution {
            id,
            distribution_type: spec.distribution_type,
            recipient_id,
            giver_id,
            amount: spec.amount,
            reputation_amount: spec.reputation,
            proof,
            source_key: source.source_key(),
            distributed_status: DistributedStatus::Distributed,
            distributed_at: Some(timestamp),
            paid_status: spec.paid_status,
            is_removed: false,
            created_at: timestamp,
        };
        batch.push(WriteOp::InsertDistribution(distribution.clone()));
        batch.emit(LedgerEvent::Distributed {
            distribution_id: id,
            distribution_type: spec.distribution_type,
            recipient_id,
            amount: spec.amount,
        });

        Ok(distribution)
    }

    /// Tombstone a distribution and write an offsetting entry that reverses
    /// both its balance and reputation effect.
    pub async fn revoke(&self, id: DistributionId, now: DateTime<Utc>) -> Result<Distribution> {
        let store = self.balances.store();
        let original = store
            .get_distribution(id)
            .await?
            .ok_or(LedgerError::DistributionNotFound(id))?;

        let _guard = self
            .balances
            .locks()
            .acquire(LockKey::User(original.recipient_id))
            .await;

        // re-read under the lock
        let mut revoked = store
            .get_distribution(id)
            .await?
            .ok_or(LedgerError::DistributionNotFound(id))?;
        if revoked.is_removed {
            return Err(LedgerError::AlreadyRevoked(id));
        }
        if revoked.amount.is_negative() {
            return Err(LedgerError::InvalidAmount(format!(
                "{} is itself an offsetting entry",
                id
            )));
        }

        let lock_type = store
            .entries_for_user(revoked.recipient_id)
            .await?
            .into_iter()
            .find(|e| e.source == SourceRef::Distribution(id))
            .and_then(|e| e.lock_type);

        let mut batch = WriteBatch::new();
        if revoked.amount.is_positive() {
            let mut offset = DistributionSpec::new(DistributionType::Revocation, -revoked.amount);
            offset.lock_type = lock_type;
            offset.reputation = -revoked.reputation_amount;
            self.stage(
                &mut batch,
                offset,
                revoked.recipient_id,
                &SourceRecord::Distribution(Box::new(revoked.clone())),
                now,
                None,
            )
            .await?;
        } else if !revoked.reputation_amount.is_zero() {
            batch.push(WriteOp::AdjustReputation {
                user_id: revoked.recipient_id,
                delta: -revoked.reputation_amount,
            });
        }

        revoked.is_removed = true;
        batch.push(WriteOp::UpdateDistribution(revoked.clone()));
        batch.emit(LedgerEvent::DistributionRevoked {
            distribution_id: id,
            recipient_id: revoked.recipient_id,
        });
        self.commit(batch).await?;

        warn!(
            distribution = %id,
            recipient = %revoked.recipient_id,
            amount = %revoked.amount,
            "↩️ Distribution revoked"
        );
        Ok(revoked)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<()> {
        self.balances
            .hooks()
            .commit(self.balances.store().as_ref(), batch)
            .await
    }
}

fn log_distributed(distribution: &Distribution) {
    info!(
        distribution = %distribution.id,
        kind = %distribution.distribution_type,
        recipient = %distribution.recipient_id,
        amount = %distribution.amount,
        "🎁 Distribution paid"
    );
}
