pub mod bridge;
pub mod clock;
pub mod distributor;
pub mod error;
pub mod fees;
pub mod funding;
pub mod hooks;
pub mod ledger;
pub mod lots;
pub mod withdrawal;

pub use bridge::{BridgeError, ChainBridge, OracleError, PriceOracle, TransferReceipt, TransferRequest};
pub use clock::{Clock, ManualClock, SystemClock};
pub use distributor::{DistributionSpec, Distributor};
pub use error::{LedgerError, Result};
pub use fees::{calculate_fees, FeeManager, SystemAccounts};
pub use funding::FundingCreditManager;
pub use hooks::{ChannelHook, HookRegistry, LedgerHook};
pub use ledger::BalanceManager;
pub use lots::{LotAccountant, Shortfall};
pub use withdrawal::{PendingResolution, WithdrawalConfig, WithdrawalManager};

use rsc_storage::{LedgerStore, RowLocks};
use rsc_types::{FeeSchedule, RscAmount, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomicsConfig {
    pub accounts: SystemAccounts,
    pub fees: FeeSchedule,
    pub withdrawal: WithdrawalConfig,
}

/// Wiring for every ledger-side component over one store.
pub struct EconomicsEngine {
    pub store: Arc<dyn LedgerStore>,
    pub locks: Arc<RowLocks>,
    pub hooks: Arc<HookRegistry>,
    pub clock: Arc<dyn Clock>,
    pub balances: Arc<BalanceManager>,
    pub distributor: Arc<Distributor>,
    pub fees: Arc<FeeManager>,
    pub credits: Arc<FundingCreditManager>,
    pub withdrawals: Arc<WithdrawalManager>,
}

impl EconomicsEngine {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        config: EconomicsConfig,
        bridge: Arc<dyn ChainBridge>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let locks = Arc::new(RowLocks::new());
        let hooks = Arc::new(HookRegistry::new());
        let balances = Arc::new(BalanceManager::new(
            store.clone(),
            locks.clone(),
            hooks.clone(),
        ));
        let distributor = Arc::new(Distributor::new(balances.clone()));
        let fees = Arc::new(FeeManager::new(
            balances.clone(),
            distributor.clone(),
            config.accounts,
            config.fees,
        ));
        let credits = Arc::new(FundingCreditManager::new(
            store.clone(),
            locks.clone(),
            hooks.clone(),
        ));
        let withdrawals = Arc::new(WithdrawalManager::new(
            balances.clone(),
            distributor.clone(),
            bridge,
            clock.clone(),
            config.accounts,
            config.withdrawal,
        ));

        Self {
            store,
            locks,
            hooks,
            clock,
            balances,
            distributor,
            fees,
            credits,
            withdrawals,
        }
    }

    pub async fn get_balance(&self, user_id: UserId) -> Result<RscAmount> {
        self.balances.get_balance(user_id).await
    }

    /// Display-only conversion; never feeds ledger arithmetic.
    pub async fn get_balance_usd(&self, user_id: UserId, oracle: &dyn PriceOracle) -> Result<Decimal> {
        let balance = self.balances.get_balance(user_id).await?;
        let rate = oracle
            .get_rsc_to_usd_rate()
            .await
            .map_err(|e| LedgerError::PriceOracle(e.to_string()))?;
        Ok((balance.as_decimal() * rate).round_dp(2))
    }
}
