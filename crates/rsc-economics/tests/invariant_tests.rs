use async_trait::async_trait;
use chrono::{Duration, Utc};
use proptest::prelude::*;
use rsc_economics::{
    BridgeError, ChainBridge, DistributionSpec, EconomicsConfig, EconomicsEngine, LedgerError,
    SystemClock, TransferReceipt, TransferRequest,
};
use rsc_storage::{LedgerStore, MemoryBackend};
use rsc_types::{
    DistributionType, LockType, RscAmount, SourceRecord, SourceRef, UserId, WithdrawalId,
};
use std::sync::Arc;

struct NoopBridge;

#[async_trait]
impl ChainBridge for NoopBridge {
    async fn submit_transfer(&self, _request: &TransferRequest) -> Result<TransferReceipt, BridgeError> {
        Ok(TransferReceipt {
            transaction_hash: "0x0".into(),
        })
    }
}

fn engine() -> EconomicsEngine {
    EconomicsEngine::new(
        Arc::new(MemoryBackend::new()),
        EconomicsConfig::default(),
        Arc::new(NoopBridge),
        Arc::new(SystemClock),
    )
}

#[derive(Debug, Clone)]
enum Op {
    Reward { user: u64, amount: i64, locked: bool },
    Withdraw { user: u64, amount: i64 },
    RevokeLatest,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (10u64..14, 1i64..500, any::<bool>())
            .prop_map(|(user, amount, locked)| Op::Reward { user, amount, locked }),
        (10u64..14, 1i64..700).prop_map(|(user, amount)| Op::Withdraw { user, amount }),
        Just(Op::RevokeLatest),
    ]
}

async fn assert_ledger_consistent(engine: &EconomicsEngine, users: &[UserId]) {
    for user in users {
        let entries = engine.balances.entries(*user).await.unwrap();
        let summed: RscAmount = entries.iter().map(|e| e.amount).sum();
        assert_eq!(engine.get_balance(*user).await.unwrap(), summed);

        let lots = engine.balances.lots(*user).await.unwrap();
        for lot in &lots {
            assert!(!lot.remaining_amount.is_negative());
            assert!(lot.remaining_amount <= lot.original_amount);
        }
        assert_eq!(
            engine.balances.get_withdrawable_balance(*user).await.unwrap(),
            engine.balances.get_unlocked_balance(*user).await.unwrap()
        );
        assert!(!engine.balances.get_unlocked_balance(*user).await.unwrap().is_negative());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_value_is_conserved(ops in prop::collection::vec(arb_op(), 1..40)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let engine = engine();
            let users: Vec<UserId> = (10..14).map(UserId).collect();
            let mut distributed = Vec::new();
            let mut withdrawn = RscAmount::ZERO;
            let mut withdrawal_seq = 0u64;
            let t0 = Utc::now() - Duration::days(30);

            for (i, op) in ops.into_iter().enumerate() {
                let at = t0 + Duration::minutes(i as i64);
                match op {
                    Op::Reward { user, amount, locked } => {
                        let mut spec = DistributionSpec::new(
                            DistributionType::Reward,
                            RscAmount::from_rsc(amount),
                        );
                        if locked {
                            spec = spec.locked(LockType::ReferralBonus);
                        }
                        let d = engine
                            .distributor
                            .distribute(spec, UserId(user), &SourceRecord::User { user_id: UserId(user) }, at, None)
                            .await
                            .unwrap();
                        distributed.push(d.id);
                    }
                    Op::Withdraw { user, amount } => {
                        withdrawal_seq += 1;
                        let amount = RscAmount::from_rsc(amount);
                        let before = engine.balances.lots(UserId(user)).await.unwrap();
                        let result = engine
                            .balances
                            .withdraw(UserId(user), amount, SourceRef::Withdrawal(WithdrawalId(withdrawal_seq)), at)
                            .await;
                        match result {
                            Ok(consumed) => {
                                let taken: RscAmount = consumed.iter().map(|c| c.consumed).sum();
                                assert_eq!(taken, amount);
                                withdrawn += amount;
                            }
                            Err(LedgerError::InsufficientBalance { .. }) => {
                                // rejected withdrawals leave lots untouched
                                assert_eq!(engine.balances.lots(UserId(user)).await.unwrap(), before);
                            }
                            Err(e) => panic!("unexpected error: {e}"),
                        }
                    }
                    Op::RevokeLatest => {
                        if let Some(id) = distributed.pop() {
                            // the recipient may already have spent the funds
                            let _ = engine.distributor.revoke(id, at).await;
                        }
                    }
                }
                assert_ledger_consistent(&engine, &users).await;
            }

            // system-wide: every credit came from a distribution, every debit
            // from a withdrawal or an offsetting distribution
            let all_entries: RscAmount = engine.store.all_entries().await.unwrap().iter().map(|e| e.amount).sum();
            let mut net_distributed = RscAmount::ZERO;
            for user in &users {
                for d in engine.store.distributions_for_recipient(*user).await.unwrap() {
                    net_distributed += d.amount;
                }
            }
            assert_eq!(all_entries, net_distributed - withdrawn);
        });
    }
}
