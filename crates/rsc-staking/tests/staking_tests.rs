use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use proptest::prelude::*;
use rsc_economics::{
    BridgeError, ChainBridge, DistributionSpec, EconomicsConfig, EconomicsEngine, ManualClock,
    TransferReceipt, TransferRequest,
};
use rsc_staking::{StakingConfig, StakingEngine, StakingError};
use rsc_storage::{LedgerStore, MemoryBackend, Table, WriteBatch, WriteOp};
use rsc_types::{
    CreditSource, CreditType, DistributionType, FundingCredit, FundingCreditId, RscAmount,
    SourceRecord, StakingCycleId, StakingCycleStatus, StakingDistributionRecord, UserId,
};
use rust_decimal::Decimal;
use std::str::FromStr;
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

const U1: UserId = UserId(11);
const U2: UserId = UserId(22);

struct Harness {
    backend: Arc<MemoryBackend>,
    economics: Arc<EconomicsEngine>,
    staking: StakingEngine,
}

fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 10, 0, 0).unwrap()
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn harness() -> Harness {
    let backend = Arc::new(MemoryBackend::new());
    let economics = Arc::new(EconomicsEngine::new(
        backend.clone(),
        EconomicsConfig::default(),
        Arc::new(NoopBridge),
        Arc::new(ManualClock::new(at(2024, 6, 10))),
    ));
    let staking = StakingEngine::new(economics.clone(), StakingConfig::default()).unwrap();
    Harness {
        backend,
        economics,
        staking,
    }
}

async fn reward(h: &Harness, user: UserId, amount: i64, when: DateTime<Utc>) {
    h.economics
        .distributor
        .distribute(
            DistributionSpec::new(DistributionType::Reward, RscAmount::from_rsc(amount)),
            user,
            &SourceRecord::User { user_id: user },
            when,
            None,
        )
        .await
        .unwrap();
}

async fn staking_credits(h: &Harness, user: UserId, date: NaiveDate) -> Vec<FundingCredit> {
    h.backend
        .funding_credits_for_user(user)
        .await
        .unwrap()
        .into_iter()
        .filter(|c| c.source == Some(CreditSource::StakingCycle(date)))
        .collect()
}

async fn seed_cycle(h: &Harness, date: NaiveDate, status: StakingCycleStatus, total: i64) {
    let record = StakingDistributionRecord {
        id: StakingCycleId(h.backend.next_id(Table::StakingCycles).await.unwrap()),
        distribution_date: date,
        total_pool_amount: RscAmount::from_rsc(10_000),
        total_weighted_balance: RscAmount::from_rsc(total),
        users_rewarded: 0,
        status,
        error_message: None,
        created_at: at(2024, 6, 10),
        completed_at: None,
    };
    let mut batch = WriteBatch::new();
    batch.push(WriteOp::InsertStakingCycle(record));
    h.backend.commit(batch).await.unwrap();
}

async fn seed_credit(h: &Harness, user: UserId, amount: i64, date: NaiveDate) {
    let mut batch = WriteBatch::new();
    batch.push(WriteOp::InsertFundingCredit(FundingCredit {
        id: FundingCreditId(h.backend.next_id(Table::FundingCredits).await.unwrap()),
        user_id: user,
        amount: RscAmount::from_rsc(amount),
        credit_type: CreditType::StakingReward,
        source: Some(CreditSource::StakingCycle(date)),
        created_at: at(2024, 6, 10),
    }));
    h.backend.commit(batch).await.unwrap();
}

#[tokio::test]
async fn test_weekly_distribution_splits_pool_by_weight() {
    let h = harness();
    reward(&h, U1, 100, at(2024, 6, 1)).await;
    reward(&h, U2, 300, at(2024, 6, 1)).await;

    let run = h.staking.run_daily_snapshot(day(2024, 6, 9)).await.unwrap();
    assert_eq!(run.created, 2);

    let record = h.staking.run_weekly_distribution(day(2024, 6, 10)).await.unwrap();
    assert_eq!(record.status, StakingCycleStatus::Completed);
    assert_eq!(record.users_rewarded, 2);
    assert_eq!(record.total_weighted_balance, RscAmount::from_rsc(400));
    assert_eq!(record.total_pool_amount, RscAmount::from_rsc(10_000));

    let c1 = staking_credits(&h, U1, day(2024, 6, 10)).await;
    let c2 = staking_credits(&h, U2, day(2024, 6, 10)).await;
    assert_eq!(c1.len(), 1);
    assert_eq!(c1[0].amount, RscAmount::from_rsc(2_500));
    assert_eq!(c2[0].amount, RscAmount::from_rsc(7_500));

    // credits are not ledger balance
    assert_eq!(h.economics.get_balance(U1).await.unwrap(), RscAmount::from_rsc(100));
    assert_eq!(
        h.economics.credits.get_balance(U2).await.unwrap(),
        RscAmount::from_rsc(7_500)
    );
}

#[tokio::test]
async fn test_weekly_distribution_is_idempotent() {
    let h = harness();
    reward(&h, U1, 100, at(2024, 6, 1)).await;
    reward(&h, U2, 300, at(2024, 6, 1)).await;
    h.staking.run_daily_snapshot(day(2024, 6, 9)).await.unwrap();

    let first = h.staking.run_weekly_distribution(day(2024, 6, 10)).await.unwrap();
    let second = h.staking.run_weekly_distribution(day(2024, 6, 10)).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(staking_credits(&h, U1, day(2024, 6, 10)).await.len(), 1);
    assert_eq!(staking_credits(&h, U2, day(2024, 6, 10)).await.len(), 1);
}

#[tokio::test]
async fn test_daily_snapshot_is_insert_if_absent() {
    let h = harness();
    reward(&h, U1, 500, at(2024, 1, 1)).await;
    reward(&h, U2, 50, at(2024, 6, 1)).await;

    let first = h.staking.run_daily_snapshot(day(2024, 6, 9)).await.unwrap();
    assert_eq!(first.created, 1);
    assert_eq!(first.below_minimum, 1);

    let stored = h.backend.get_snapshot(U1, day(2024, 6, 9)).await.unwrap().unwrap();
    // 160 days held: Gold
    assert_eq!(stored.multiplier, Decimal::from_str("4.0").unwrap());
    assert_eq!(stored.weighted_balance, RscAmount::from_rsc(2_000));

    // a later top-up does not rewrite the day
    reward(&h, U1, 500, at(2024, 6, 9)).await;
    let second = h.staking.run_daily_snapshot(day(2024, 6, 9)).await.unwrap();
    assert_eq!(second.created, 0);
    assert_eq!(second.already_present, 1);
    let unchanged = h.backend.get_snapshot(U1, day(2024, 6, 9)).await.unwrap().unwrap();
    assert_eq!(unchanged, stored);
}

#[tokio::test]
async fn test_failed_cycle_is_marked_and_resumable() {
    let h = harness();
    reward(&h, U1, 100, at(2024, 6, 1)).await;
    reward(&h, U2, 300, at(2024, 6, 1)).await;
    h.staking.run_daily_snapshot(day(2024, 6, 9)).await.unwrap();
    seed_cycle(&h, day(2024, 6, 10), StakingCycleStatus::Pending, 0).await;

    h.backend.fail_next_commits(1);
    let failed = h.staking.run_weekly_distribution(day(2024, 6, 10)).await;
    assert!(matches!(failed, Err(StakingError::Ledger(_))));

    let record = h.backend.get_staking_cycle(day(2024, 6, 10)).await.unwrap().unwrap();
    assert_eq!(record.status, StakingCycleStatus::Failed);
    assert!(record.error_message.is_some());
    assert!(staking_credits(&h, U1, day(2024, 6, 10)).await.is_empty());

    let retried = h.staking.run_weekly_distribution(day(2024, 6, 10)).await.unwrap();
    assert_eq!(retried.status, StakingCycleStatus::Completed);
    assert_eq!(retried.users_rewarded, 2);
    assert!(retried.error_message.is_none());
}

#[tokio::test]
async fn test_resume_skips_users_already_credited() {
    let h = harness();
    reward(&h, U1, 100, at(2024, 6, 1)).await;
    reward(&h, U2, 300, at(2024, 6, 1)).await;
    h.staking.run_daily_snapshot(day(2024, 6, 9)).await.unwrap();
    seed_cycle(&h, day(2024, 6, 10), StakingCycleStatus::Failed, 0).await;
    seed_credit(&h, U1, 2_500, day(2024, 6, 10)).await;

    let record = h.staking.run_weekly_distribution(day(2024, 6, 10)).await.unwrap();

    assert_eq!(record.users_rewarded, 2);
    assert_eq!(staking_credits(&h, U1, day(2024, 6, 10)).await.len(), 1);
    let c2 = staking_credits(&h, U2, day(2024, 6, 10)).await;
    assert_eq!(c2.len(), 1);
    assert_eq!(c2[0].amount, RscAmount::from_rsc(7_500));
}

#[tokio::test]
async fn test_reconcile_tops_up_missing_users() {
    let h = harness();
    reward(&h, U1, 100, at(2024, 6, 1)).await;
    reward(&h, U2, 300, at(2024, 6, 1)).await;
    h.staking.run_daily_snapshot(day(2024, 6, 9)).await.unwrap();
    seed_cycle(&h, day(2024, 6, 10), StakingCycleStatus::Completed, 400).await;
    seed_credit(&h, U1, 2_500, day(2024, 6, 10)).await;

    let report = h.staking.reconcile_cycle(day(2024, 6, 10)).await.unwrap();
    assert_eq!(report.eligible, 2);
    assert_eq!(report.topped_up, vec![(U2, RscAmount::from_rsc(7_500))]);

    let record = h.backend.get_staking_cycle(day(2024, 6, 10)).await.unwrap().unwrap();
    assert_eq!(record.users_rewarded, 2);

    let again = h.staking.reconcile_cycle(day(2024, 6, 10)).await.unwrap();
    assert!(again.topped_up.is_empty());
}

#[tokio::test]
async fn test_no_recent_snapshots_completes_empty() {
    let h = harness();
    reward(&h, U1, 100, at(2024, 5, 1)).await;
    // outside the seven-day lookback
    h.staking.run_daily_snapshot(day(2024, 5, 20)).await.unwrap();

    let record = h.staking.run_weekly_distribution(day(2024, 6, 10)).await.unwrap();
    assert_eq!(record.status, StakingCycleStatus::Completed);
    assert_eq!(record.users_rewarded, 0);
    assert!(record.total_weighted_balance.is_zero());
    assert!(staking_credits(&h, U1, day(2024, 6, 10)).await.is_empty());
}

#[tokio::test]
async fn test_staking_summary() {
    let h = harness();
    // 40 days before the clock's 2024-06-10
    reward(&h, U1, 200, at(2024, 5, 1)).await;

    let before = h.staking.get_staking_summary(U1).await.unwrap();
    assert_eq!(before.tier, "Silver");
    assert_eq!(before.days_held, 40);
    assert_eq!(before.days_until_next_tier, Some(50));
    assert_eq!(before.next_tier.as_deref(), Some("Gold"));
    assert_eq!(before.multiplier, Decimal::from_str("2.5").unwrap());
    assert_eq!(before.weighted_balance, RscAmount::from_rsc(500));
    assert!(before.is_eligible);
    assert_eq!(before.pending_rewards, RscAmount::from_rsc(10_000));

    reward(&h, U2, 1_500, at(2024, 6, 1)).await;
    h.staking.run_daily_snapshot(day(2024, 6, 9)).await.unwrap();
    h.staking.run_weekly_distribution(day(2024, 6, 10)).await.unwrap();

    // 500 of 2000 weighted
    let after = h.staking.get_staking_summary(U1).await.unwrap();
    assert_eq!(after.pending_rewards, RscAmount::from_rsc(2_500));
    assert_eq!(after.credit_balance, RscAmount::from_rsc(2_500));
    // 2500 * 52 / 200 * 100
    assert_eq!(after.projected_apy, Decimal::from(65_000));

    let nobody = h.staking.get_staking_summary(UserId(999)).await.unwrap();
    assert!(!nobody.is_eligible);
    assert!(nobody.pending_rewards.is_zero());
    assert!(nobody.projected_apy.is_zero());
}

#[tokio::test]
async fn test_summary_below_minimum_projects_nothing() {
    let h = harness();
    reward(&h, U1, 50, at(2024, 5, 1)).await;

    let summary = h.staking.get_staking_summary(U1).await.unwrap();
    assert!(!summary.is_eligible);
    assert_eq!(summary.rsc_balance, RscAmount::from_rsc(50));
    assert!(summary.pending_rewards.is_zero());
    assert!(summary.projected_apy.is_zero());

    reward(&h, U2, 400, at(2024, 6, 1)).await;
    h.staking.run_daily_snapshot(day(2024, 6, 9)).await.unwrap();
    h.staking.run_weekly_distribution(day(2024, 6, 10)).await.unwrap();

    let after_cycle = h.staking.get_staking_summary(U1).await.unwrap();
    assert!(after_cycle.pending_rewards.is_zero());
    assert!(staking_credits(&h, U1, day(2024, 6, 10)).await.is_empty());
}

#[tokio::test]
async fn test_cycle_uses_latest_snapshot_per_user() {
    let h = harness();
    reward(&h, U1, 100, at(2024, 6, 1)).await;
    reward(&h, U2, 300, at(2024, 6, 1)).await;
    let earlier = h.staking.run_daily_snapshot(day(2024, 6, 8)).await.unwrap();
    assert_eq!(earlier.created, 2);

    // one of the two inserts for the last day is lost
    h.backend.fail_next_commits(1);
    let partial = h.staking.run_daily_snapshot(day(2024, 6, 9)).await.unwrap();
    assert_eq!(partial.created, 1);
    assert_eq!(partial.failed, 1);

    let record = h.staking.run_weekly_distribution(day(2024, 6, 10)).await.unwrap();
    assert_eq!(record.status, StakingCycleStatus::Completed);
    assert_eq!(record.users_rewarded, 2);
    assert_eq!(record.total_weighted_balance, RscAmount::from_rsc(400));

    let c1 = staking_credits(&h, U1, day(2024, 6, 10)).await;
    let c2 = staking_credits(&h, U2, day(2024, 6, 10)).await;
    assert_eq!(c1[0].amount, RscAmount::from_rsc(2_500));
    assert_eq!(c2[0].amount, RscAmount::from_rsc(7_500));
}

#[test]
fn test_rejects_bad_lookback() {
    let h = harness();
    let config = StakingConfig {
        snapshot_lookback_days: 0,
        ..Default::default()
    };
    assert!(matches!(
        StakingEngine::new(h.economics.clone(), config),
        Err(StakingError::InvalidConfig(_))
    ));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_cycle_credits_sum_to_pool(balances in prop::collection::vec(100i64..5_000, 1..6)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let h = harness();
            for (i, amount) in balances.iter().enumerate() {
                reward(&h, UserId(100 + i as u64), *amount, at(2024, 6, 1)).await;
            }
            h.staking.run_daily_snapshot(day(2024, 6, 9)).await.unwrap();
            let record = h.staking.run_weekly_distribution(day(2024, 6, 10)).await.unwrap();
            assert_eq!(record.users_rewarded as usize, balances.len());

            let mut total = RscAmount::ZERO;
            for i in 0..balances.len() {
                for credit in staking_credits(&h, UserId(100 + i as u64), day(2024, 6, 10)).await {
                    total += credit.amount;
                }
            }
            let drift = (total - RscAmount::from_rsc(10_000)).abs();
            let tolerance = Decimal::new(balances.len() as i64, 10);
            assert!(drift.as_decimal() <= tolerance, "drift {drift} over {tolerance}");
        });
    }
}
