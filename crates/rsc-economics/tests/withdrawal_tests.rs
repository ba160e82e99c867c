use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use rsc_economics::{
    BridgeError, ChainBridge, ChannelHook, DistributionSpec, EconomicsConfig, EconomicsEngine,
    LedgerError, ManualClock, OracleError, PendingResolution, PriceOracle, TransferReceipt,
    TransferRequest, WithdrawalConfig,
};
use rsc_storage::MemoryBackend;
use rsc_types::{
    DistributionType, LedgerEvent, PaidStatus, RscAmount, SourceRecord, UserId,
};
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Bridge that replays a fixed script of outcomes, then succeeds.
struct ScriptedBridge {
    script: Mutex<VecDeque<Result<(), BridgeError>>>,
    calls: Mutex<Vec<TransferRequest>>,
}

impl ScriptedBridge {
    fn new(script: Vec<Result<(), BridgeError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ChainBridge for ScriptedBridge {
    async fn submit_transfer(&self, request: &TransferRequest) -> Result<TransferReceipt, BridgeError> {
        self.calls.lock().unwrap().push(request.clone());
        let next = self.script.lock().unwrap().pop_front().unwrap_or(Ok(()));
        next.map(|_| TransferReceipt {
            transaction_hash: format!("0x{:04x}", request.withdrawal_id.get()),
        })
    }
}

/// Bridge that breaks the store's next commit before answering, so the
/// ledger write following the transfer is lost.
struct StoreBreakingBridge {
    backend: Arc<MemoryBackend>,
    outcome: Mutex<VecDeque<Result<(), BridgeError>>>,
}

#[async_trait]
impl ChainBridge for StoreBreakingBridge {
    async fn submit_transfer(&self, request: &TransferRequest) -> Result<TransferReceipt, BridgeError> {
        let next = self.outcome.lock().unwrap().pop_front();
        if next.is_some() {
            self.backend.fail_next_commits(1);
        }
        next.unwrap_or(Ok(())).map(|_| TransferReceipt {
            transaction_hash: format!("0x{:04x}", request.withdrawal_id.get()),
        })
    }
}

fn engine_breaking_store(
    outcome: Result<(), BridgeError>,
    withdrawal: WithdrawalConfig,
) -> EconomicsEngine {
    let backend = Arc::new(MemoryBackend::new());
    let bridge = Arc::new(StoreBreakingBridge {
        backend: backend.clone(),
        outcome: Mutex::new(VecDeque::from(vec![outcome])),
    });
    let config = EconomicsConfig {
        withdrawal: WithdrawalConfig {
            retry_backoff_ms: 1,
            ..withdrawal
        },
        ..Default::default()
    };
    EconomicsEngine::new(backend, config, bridge, Arc::new(ManualClock::new(start())))
}

struct FixedOracle(Decimal);

#[async_trait]
impl PriceOracle for FixedOracle {
    async fn get_rsc_to_usd_rate(&self) -> Result<Decimal, OracleError> {
        Ok(self.0)
    }
}

fn start() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

fn engine_with(bridge: Arc<ScriptedBridge>, withdrawal: WithdrawalConfig) -> (EconomicsEngine, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(start()));
    let config = EconomicsConfig {
        withdrawal: WithdrawalConfig {
            retry_backoff_ms: 1,
            ..withdrawal
        },
        ..Default::default()
    };
    let engine = EconomicsEngine::new(Arc::new(MemoryBackend::new()), config, bridge, clock.clone());
    (engine, clock)
}

async fn reward(engine: &EconomicsEngine, user: UserId, amount: i64) {
    engine
        .distributor
        .distribute(
            DistributionSpec::new(DistributionType::Reward, RscAmount::from_rsc(amount)),
            user,
            &SourceRecord::User { user_id: user },
            engine.clock.now(),
            None,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_successful_withdrawal_pays_fee_to_revenue() {
    let bridge = ScriptedBridge::new(vec![]);
    let (engine, _) = engine_with(
        bridge.clone(),
        WithdrawalConfig {
            fee: RscAmount::from_rsc(5),
            ..Default::default()
        },
    );
    let user = UserId(100);
    reward(&engine, user, 500).await;

    let withdrawal = engine
        .withdrawals
        .request_withdrawal(user, RscAmount::from_rsc(300), "0xabc", None)
        .await
        .unwrap();

    assert_eq!(withdrawal.paid_status, PaidStatus::Paid);
    assert_eq!(withdrawal.transaction_hash.as_deref(), Some("0x0001"));
    assert_eq!(engine.get_balance(user).await.unwrap(), RscAmount::from_rsc(195));
    assert_eq!(engine.get_balance(UserId(1)).await.unwrap(), RscAmount::from_rsc(5));
    assert_eq!(bridge.call_count(), 1);
}

#[tokio::test]
async fn test_bridge_failure_refunds_amount_and_fee() {
    let bridge = ScriptedBridge::new(vec![Err(BridgeError::Rejected("bad address".into()))]);
    let (engine, _) = engine_with(
        bridge.clone(),
        WithdrawalConfig {
            fee: RscAmount::from_rsc(5),
            ..Default::default()
        },
    );
    let (hook, mut events) = ChannelHook::channel();
    engine.hooks.register(Arc::new(hook)).await;
    let user = UserId(101);
    reward(&engine, user, 500).await;

    let result = engine
        .withdrawals
        .request_withdrawal(user, RscAmount::from_rsc(300), "0xabc", None)
        .await;

    assert!(matches!(result, Err(LedgerError::ExternalBridge { .. })));
    assert_eq!(engine.get_balance(user).await.unwrap(), RscAmount::from_rsc(500));
    assert_eq!(engine.get_balance(UserId(1)).await.unwrap(), RscAmount::ZERO);
    assert_eq!(bridge.call_count(), 1, "rejections are not retried");

    let history = engine.withdrawals.withdrawals(user).await.unwrap();
    assert_eq!(history[0].paid_status, PaidStatus::Failed);
    assert!(history[0].failure_reason.is_some());

    let mut statuses = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let LedgerEvent::WithdrawalStatusChanged { status, .. } = event {
            statuses.push(status);
        }
    }
    assert_eq!(statuses, vec![PaidStatus::Pending, PaidStatus::Failed]);
}

#[tokio::test]
async fn test_lost_refund_stays_pending_until_reconciled() {
    let engine = engine_breaking_store(
        Err(BridgeError::Rejected("bad address".into())),
        WithdrawalConfig::default(),
    );
    let user = UserId(106);
    reward(&engine, user, 500).await;

    let first = engine
        .withdrawals
        .request_withdrawal(user, RscAmount::from_rsc(300), "0xabc", None)
        .await;
    assert!(matches!(first, Err(LedgerError::Persistence(_))));
    assert_eq!(engine.get_balance(user).await.unwrap(), RscAmount::from_rsc(200));

    let pending = engine.withdrawals.pending_withdrawals().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].paid_status, PaidStatus::Pending);
    let blocked = engine
        .withdrawals
        .request_withdrawal(user, RscAmount::from_rsc(100), "0xabc", None)
        .await;
    assert!(matches!(blocked, Err(LedgerError::WithdrawalRejected(_))));

    let resolved = engine
        .withdrawals
        .reconcile_pending(
            pending[0].id,
            PendingResolution::Failed {
                reason: "bridge rejected the address".into(),
            },
        )
        .await
        .unwrap();
    assert_eq!(resolved.paid_status, PaidStatus::Failed);
    assert_eq!(engine.get_balance(user).await.unwrap(), RscAmount::from_rsc(500));
    assert!(engine.withdrawals.pending_withdrawals().await.unwrap().is_empty());

    let again = engine
        .withdrawals
        .reconcile_pending(
            pending[0].id,
            PendingResolution::Failed {
                reason: "twice".into(),
            },
        )
        .await;
    assert!(matches!(
        again,
        Err(LedgerError::WithdrawalNotPending {
            status: PaidStatus::Failed,
            ..
        })
    ));
    assert_eq!(engine.get_balance(user).await.unwrap(), RscAmount::from_rsc(500));

    // a failed withdrawal does not hold the user up
    let next = engine
        .withdrawals
        .request_withdrawal(user, RscAmount::from_rsc(100), "0xabc", None)
        .await
        .unwrap();
    assert_eq!(next.paid_status, PaidStatus::Paid);
    assert_eq!(engine.get_balance(user).await.unwrap(), RscAmount::from_rsc(400));
}

#[tokio::test]
async fn test_lost_paid_settlement_is_reconciled_with_tx_hash() {
    let engine = engine_breaking_store(
        Ok(()),
        WithdrawalConfig {
            fee: RscAmount::from_rsc(5),
            ..Default::default()
        },
    );
    let user = UserId(107);
    reward(&engine, user, 500).await;

    let first = engine
        .withdrawals
        .request_withdrawal(user, RscAmount::from_rsc(300), "0xabc", None)
        .await;
    assert!(matches!(first, Err(LedgerError::Persistence(_))));
    assert_eq!(engine.get_balance(user).await.unwrap(), RscAmount::from_rsc(195));
    assert_eq!(engine.get_balance(UserId(1)).await.unwrap(), RscAmount::ZERO);

    let pending = engine.withdrawals.pending_withdrawals().await.unwrap();
    let paid = engine
        .withdrawals
        .reconcile_pending(
            pending[0].id,
            PendingResolution::Paid {
                transaction_hash: "0xfeed".into(),
            },
        )
        .await
        .unwrap();
    assert_eq!(paid.paid_status, PaidStatus::Paid);
    assert_eq!(paid.transaction_hash.as_deref(), Some("0xfeed"));
    assert_eq!(engine.get_balance(UserId(1)).await.unwrap(), RscAmount::from_rsc(5));

    // funds went out on chain, so a refund is refused
    let refund = engine
        .withdrawals
        .reconcile_pending(
            pending[0].id,
            PendingResolution::Failed {
                reason: "late".into(),
            },
        )
        .await;
    assert!(matches!(
        refund,
        Err(LedgerError::WithdrawalNotPending {
            status: PaidStatus::Paid,
            ..
        })
    ));
    assert_eq!(engine.get_balance(user).await.unwrap(), RscAmount::from_rsc(195));
}

#[tokio::test]
async fn test_transient_errors_are_retried() {
    let bridge = ScriptedBridge::new(vec![
        Err(BridgeError::Transient("timeout".into())),
        Err(BridgeError::Transient("nonce too low".into())),
    ]);
    let (engine, _) = engine_with(bridge.clone(), WithdrawalConfig::default());
    let user = UserId(102);
    reward(&engine, user, 200).await;

    let withdrawal = engine
        .withdrawals
        .request_withdrawal(user, RscAmount::from_rsc(150), "0xabc", Some("ethereum"))
        .await
        .unwrap();

    assert_eq!(withdrawal.paid_status, PaidStatus::Paid);
    assert_eq!(withdrawal.network, "ETHEREUM");
    assert_eq!(bridge.call_count(), 3);
}

#[tokio::test]
async fn test_withdrawal_guards() {
    let bridge = ScriptedBridge::new(vec![]);
    let (engine, clock) = engine_with(bridge, WithdrawalConfig::default());
    let user = UserId(103);
    reward(&engine, user, 1_000).await;

    let below_min = engine
        .withdrawals
        .request_withdrawal(user, RscAmount::from_rsc(99), "0xabc", None)
        .await;
    assert!(matches!(below_min, Err(LedgerError::WithdrawalRejected(_))));

    let too_much = engine
        .withdrawals
        .request_withdrawal(user, RscAmount::from_rsc(1_001), "0xabc", None)
        .await;
    assert!(matches!(too_much, Err(LedgerError::InsufficientBalance { .. })));

    engine
        .withdrawals
        .request_withdrawal(user, RscAmount::from_rsc(100), "0xabc", None)
        .await
        .unwrap();

    clock.advance(Duration::hours(2));
    let too_soon = engine
        .withdrawals
        .request_withdrawal(user, RscAmount::from_rsc(100), "0xabc", None)
        .await;
    assert!(matches!(too_soon, Err(LedgerError::WithdrawalRejected(_))));

    clock.advance(Duration::hours(23));
    assert!(engine
        .withdrawals
        .request_withdrawal(user, RscAmount::from_rsc(100), "0xabc", None)
        .await
        .is_ok());
    assert_eq!(engine.get_balance(user).await.unwrap(), RscAmount::from_rsc(800));
}

#[tokio::test]
async fn test_deposit_is_credited_once() {
    let (engine, _) = engine_with(ScriptedBridge::new(vec![]), WithdrawalConfig::default());
    let user = UserId(104);

    engine
        .withdrawals
        .record_deposit(user, RscAmount::from_rsc(40), "0xdead", "0xfrom", "base")
        .await
        .unwrap();
    let again = engine
        .withdrawals
        .record_deposit(user, RscAmount::from_rsc(40), "0xdead", "0xfrom", "base")
        .await;

    assert!(matches!(again, Err(LedgerError::DuplicateDeposit(_))));
    assert_eq!(engine.get_balance(user).await.unwrap(), RscAmount::from_rsc(40));
    assert_eq!(
        engine.balances.get_withdrawable_balance(user).await.unwrap(),
        RscAmount::from_rsc(40)
    );
}

#[tokio::test]
async fn test_balance_usd_uses_oracle_rate() {
    let (engine, _) = engine_with(ScriptedBridge::new(vec![]), WithdrawalConfig::default());
    let user = UserId(105);
    reward(&engine, user, 250).await;

    let usd = engine
        .get_balance_usd(user, &FixedOracle(Decimal::new(42, 2)))
        .await
        .unwrap();
    assert_eq!(usd, Decimal::new(10500, 2));
}
