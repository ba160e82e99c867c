use crate::bridge::{BridgeError, ChainBridge, TransferReceipt, TransferRequest};
use crate::clock::Clock;
use crate::distributor::{DistributionSpec, Distributor};
use crate::error::{LedgerError, Result};
use crate::fees::SystemAccounts;
use crate::ledger::BalanceManager;
use chrono::Duration;
use rsc_storage::{LockKey, Table, WriteBatch, WriteOp};
use rsc_types::{
    Deposit, DepositId, DistributionType, LedgerEvent, PaidStatus, PaidStatusModel, RscAmount,
    SourceRecord, SourceRef, UserId, Withdrawal, WithdrawalId,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WithdrawalConfig {
    pub minimum_amount: RscAmount,
    /// Flat network fee debited on top of the withdrawn amount
    pub fee: RscAmount,
    pub min_interval_hours: i64,
    pub max_bridge_attempts: u32,
    pub retry_backoff_ms: u64,
    pub token: String,
    pub default_network: String,
}

impl Default for WithdrawalConfig {
    fn default() -> Self {
        Self {
            minimum_amount: RscAmount::from_rsc(100),
            fee: RscAmount::ZERO,
            min_interval_hours: 24,
            max_bridge_attempts: 3,
            retry_backoff_ms: 500,
            token: "RSC".to_string(),
            default_network: "BASE".to_string(),
        }
    }
}

/// Operator decision for a withdrawal stuck in PENDING.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PendingResolution {
    /// The transfer landed on chain.
    Paid { transaction_hash: String },
    /// The transfer never happened; return the funds.
    Failed { reason: String },
}

/// Ledger entry and exit points.
///
/// A withdrawal is reserved on the ledger first (one committed debit), then
/// sent through the bridge outside any transaction. Success only settles the
/// record; failure is compensated with a refund distribution.
pub struct WithdrawalManager {
    balances: Arc<BalanceManager>,
    distributor: Arc<Distributor>,
    bridge: Arc<dyn ChainBridge>,
    clock: Arc<dyn Clock>,
    accounts: SystemAccounts,
    config: WithdrawalConfig,
}

impl WithdrawalManager {
    pub fn new(
        balances: Arc<BalanceManager>,
        distributor: Arc<Distributor>,
        bridge: Arc<dyn ChainBridge>,
        clock: Arc<dyn Clock>,
        accounts: SystemAccounts,
        config: WithdrawalConfig,
    ) -> Self {
        Self {
            balances,
            distributor,
            bridge,
            clock,
            accounts,
            config,
        }
    }

    pub fn config(&self) -> &WithdrawalConfig {
        &self.config
    }

    pub async fn get_withdrawal(&self, id: WithdrawalId) -> Result<Withdrawal> {
        self.balances
            .store()
            .get_withdrawal(id)
            .await?
            .ok_or(LedgerError::WithdrawalNotFound(id))
    }

    pub async fn withdrawals(&self, user_id: UserId) -> Result<Vec<Withdrawal>> {
        Ok(self.balances.store().withdrawals_for_user(user_id).await?)
    }

    pub async fn request_withdrawal(
        &self,
        user_id: UserId,
        amount: RscAmount,
        to_address: &str,
        network: Option<&str>,
    ) -> Result<Withdrawal> {
        if amount < self.config.minimum_amount || !amount.is_positive() {
            return Err(LedgerError::WithdrawalRejected(format!(
                "{} is below the withdrawal minimum of {}",
                amount, self.config.minimum_amount
            )));
        }
        let to_address = to_address.trim();
        if to_address.is_empty() {
            return Err(LedgerError::WithdrawalRejected(
                "destination address is empty".to_string(),
            ));
        }
        let network = network.unwrap_or(&self.config.default_network).to_uppercase();

        let withdrawal = self.reserve(user_id, amount, to_address, &network).await?;

        match self.send_with_retry(&withdrawal).await {
            Ok(receipt) => self.settle_paid(&withdrawal, receipt).await,
            Err(bridge_error) => self.compensate(&withdrawal, bridge_error).await,
        }
    }

    async fn reserve(
        &self,
        user_id: UserId,
        amount: RscAmount,
        to_address: &str,
        network: &str,
    ) -> Result<Withdrawal> {
        let store = self.balances.store();
        let _guard = self.balances.locks().acquire(LockKey::User(user_id)).await;
        let now = self.clock.now();

        let history = store.withdrawals_for_user(user_id).await?;
        if history.iter().any(|w| w.is_paid_pending()) {
            return Err(LedgerError::WithdrawalRejected(
                "a previous withdrawal is still pending".to_string(),
            ));
        }
        let interval = Duration::hours(self.config.min_interval_hours);
        if let Some(last) = history
            .iter()
            .filter(|w| w.paid_status != PaidStatus::Failed)
            .map(|w| w.created_at)
            .max()
        {
            if now - last < interval {
                return Err(LedgerError::WithdrawalRejected(format!(
                    "withdrawals are limited to one every {} hours",
                    self.config.min_interval_hours
                )));
            }
        }

        let withdrawal = Withdrawal {
            id: WithdrawalId(store.next_id(Table::Withdrawals).await?),
            user_id,
            amount,
            fee: self.config.fee,
            to_address: to_address.to_string(),
            network: network.to_string(),
            token: self.config.token.clone(),
            paid_status: PaidStatus::Pending,
            transaction_hash: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        };

        let mut batch = WriteBatch::new();
        self.balances
            .stage_debit(
                &mut batch,
                user_id,
                withdrawal.total_debit(),
                SourceRef::Withdrawal(withdrawal.id),
                None,
                now,
            )
            .await?;
        batch.push(WriteOp::PutWithdrawal(withdrawal.clone()));
        batch.emit(status_event(&withdrawal));
        self.balances.hooks().commit(store.as_ref(), batch).await?;

        info!(
            withdrawal = %withdrawal.id,
            user = %user_id,
            amount = %amount,
            fee = %withdrawal.fee,
            to = %withdrawal.to_address,
            "📤 Withdrawal reserved"
        );
        Ok(withdrawal)
    }

    async fn send_with_retry(
        &self,
        withdrawal: &Withdrawal,
    ) -> std::result::Result<TransferReceipt, BridgeError> {
        let request = TransferRequest {
            withdrawal_id: withdrawal.id,
            to_address: withdrawal.to_address.clone(),
            amount: withdrawal.amount,
            network: withdrawal.network.clone(),
            token: withdrawal.token.clone(),
        };

        let attempts = self.config.max_bridge_attempts.max(1);
        let mut backoff = std::time::Duration::from_millis(self.config.retry_backoff_ms);
        let mut attempt = 1;
        loop {
            match self.bridge.submit_transfer(&request).await {
                Ok(receipt) => return Ok(receipt),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    warn!(
                        withdrawal = %withdrawal.id,
                        attempt,
                        error = %e,
                        "Bridge transfer failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Resolve a withdrawal left PENDING by an interrupted request.
    ///
    /// Safe to repeat: a withdrawal that is no longer PENDING is refused and
    /// the refund is unique per withdrawal.
    pub async fn reconcile_pending(
        &self,
        id: WithdrawalId,
        resolution: PendingResolution,
    ) -> Result<Withdrawal> {
        let withdrawal = self.get_withdrawal(id).await?;
        info!(withdrawal = %id, user = %withdrawal.user_id, resolution = ?resolution, "🔧 Reconciling pending withdrawal");
        match resolution {
            PendingResolution::Paid { transaction_hash } => {
                self.settle_paid(&withdrawal, TransferReceipt { transaction_hash })
                    .await
            }
            PendingResolution::Failed { reason } => self.refund(&withdrawal, reason).await,
        }
    }

    pub async fn pending_withdrawals(&self) -> Result<Vec<Withdrawal>> {
        Ok(self.balances.store().pending_withdrawals().await?)
    }

    /// Current record for `id`, provided it is still PENDING.
    ///
    /// The caller must hold the owner's row lock.
    async fn reload_pending(&self, id: WithdrawalId) -> Result<Withdrawal> {
        let current = self.get_withdrawal(id).await?;
        if !current.is_paid_pending() {
            return Err(LedgerError::WithdrawalNotPending {
                withdrawal_id: id,
                status: current.paid_status,
            });
        }
        Ok(current)
    }

    async fn settle_paid(&self, reserved: &Withdrawal, receipt: TransferReceipt) -> Result<Withdrawal> {
        let _guard = self
            .balances
            .locks()
            .acquire(LockKey::User(reserved.user_id))
            .await;
        let mut withdrawal = self.reload_pending(reserved.id).await?;
        let now = self.clock.now();

        withdrawal.set_paid();
        withdrawal.transaction_hash = Some(receipt.transaction_hash);
        withdrawal.updated_at = now;

        let mut batch = WriteBatch::new();
        if withdrawal.fee.is_positive() {
            let source = SourceRecord::Withdrawal(Box::new(withdrawal.clone()));
            self.distributor
                .ensure_unique(&batch, DistributionType::WithdrawalFee, self.accounts.revenue, &source)
                .await?;
            self.distributor
                .stage(
                    &mut batch,
                    DistributionSpec::new(DistributionType::WithdrawalFee, withdrawal.fee),
                    self.accounts.revenue,
                    &source,
                    now,
                    Some(withdrawal.user_id),
                )
                .await?;
        }
        batch.push(WriteOp::PutWithdrawal(withdrawal.clone()));
        batch.emit(status_event(&withdrawal));

        if let Err(e) = self
            .balances
            .hooks()
            .commit(self.balances.store().as_ref(), batch)
            .await
        {
            // funds are on chain; the record stays PENDING for reconcile_pending
            error!(
                withdrawal = %withdrawal.id,
                tx_hash = ?withdrawal.transaction_hash,
                error = %e,
                "Failed to record paid withdrawal"
            );
            return Err(e);
        }

        info!(
            withdrawal = %withdrawal.id,
            user = %withdrawal.user_id,
            tx_hash = ?withdrawal.transaction_hash,
            "✅ Withdrawal paid"
        );
        Ok(withdrawal)
    }

    async fn compensate(&self, reserved: &Withdrawal, cause: BridgeError) -> Result<Withdrawal> {
        self.refund(reserved, cause.to_string()).await?;
        Err(LedgerError::ExternalBridge {
            withdrawal_id: reserved.id,
            reason: cause.to_string(),
        })
    }

    /// Mark the withdrawal FAILED and credit amount + fee back to its owner.
    async fn refund(&self, reserved: &Withdrawal, reason: String) -> Result<Withdrawal> {
        let _guard = self
            .balances
            .locks()
            .acquire(LockKey::User(reserved.user_id))
            .await;
        let mut withdrawal = self.reload_pending(reserved.id).await?;
        let now = self.clock.now();

        withdrawal.set_paid_failed();
        withdrawal.failure_reason = Some(reason);
        withdrawal.updated_at = now;

        let source = SourceRecord::Withdrawal(Box::new(withdrawal.clone()));
        let mut batch = WriteBatch::new();
        self.distributor
            .ensure_unique(&batch, DistributionType::WithdrawalRefund, withdrawal.user_id, &source)
            .await?;
        self.distributor
            .stage(
                &mut batch,
                DistributionSpec::new(DistributionType::WithdrawalRefund, withdrawal.total_debit()),
                withdrawal.user_id,
                &source,
                now,
                None,
            )
            .await?;
        batch.push(WriteOp::PutWithdrawal(withdrawal.clone()));
        batch.emit(status_event(&withdrawal));

        if let Err(e) = self
            .balances
            .hooks()
            .commit(self.balances.store().as_ref(), batch)
            .await
        {
            // the debit stands; the record stays PENDING for reconcile_pending
            error!(
                withdrawal = %withdrawal.id,
                user = %withdrawal.user_id,
                error = %e,
                "Failed to refund withdrawal"
            );
            return Err(e);
        }

        warn!(
            withdrawal = %withdrawal.id,
            user = %withdrawal.user_id,
            refunded = %withdrawal.total_debit(),
            reason = ?withdrawal.failure_reason,
            "↩️ Withdrawal failed, funds returned"
        );
        Ok(withdrawal)
    }

    /// Credit an on-chain deposit once per transaction hash.
    pub async fn record_deposit(
        &self,
        user_id: UserId,
        amount: RscAmount,
        transaction_hash: &str,
        from_address: &str,
        network: &str,
    ) -> Result<Deposit> {
        if !amount.is_positive() {
            return Err(LedgerError::InvalidAmount(format!(
                "deposit amount must be positive, got {}",
                amount
            )));
        }
        let store = self.balances.store();
        let _guard = self.balances.locks().acquire(LockKey::User(user_id)).await;

        if store.deposit_by_tx_hash(transaction_hash).await?.is_some() {
            return Err(LedgerError::DuplicateDeposit(transaction_hash.to_string()));
        }

        let now = self.clock.now();
        let deposit = Deposit {
            id: DepositId(store.next_id(Table::Deposits).await?),
            user_id,
            amount,
            transaction_hash: transaction_hash.to_string(),
            from_address: from_address.to_string(),
            network: network.to_uppercase(),
            created_at: now,
        };

        let mut batch = WriteBatch::new();
        self.balances
            .stage_credit(&mut batch, user_id, amount, SourceRef::Deposit(deposit.id), None, now)
            .await?;
        batch.push(WriteOp::InsertDeposit(deposit.clone()));
        batch.emit(LedgerEvent::DepositCredited {
            deposit_id: deposit.id,
            user_id,
            amount,
        });

        match self.balances.hooks().commit(store.as_ref(), batch).await {
            Err(LedgerError::Persistence(rsc_storage::StorageError::UniqueViolation {
                table: "deposits",
                ..
            })) => return Err(LedgerError::DuplicateDeposit(transaction_hash.to_string())),
            other => other?,
        }

        info!(
            deposit = %deposit.id,
            user = %user_id,
            amount = %amount,
            tx_hash = transaction_hash,
            "📥 Deposit credited"
        );
        Ok(deposit)
    }
}

fn status_event(withdrawal: &Withdrawal) -> LedgerEvent {
    LedgerEvent::WithdrawalStatusChanged {
        withdrawal_id: withdrawal.id,
        user_id: withdrawal.user_id,
        status: withdrawal.paid_status,
    }
}
