use crate::engine::StakingEngine;
use crate::error::Result;
use rsc_economics::Clock;
use rsc_storage::LedgerStore;
use rsc_types::{RscAmount, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

const WEEKS_PER_YEAR: i64 = 52;

/// What a holder sees about their stake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StakingSummary {
    pub user_id: UserId,
    pub rsc_balance: RscAmount,
    pub weighted_balance: RscAmount,
    pub multiplier: Decimal,
    /// Tier of the oldest open lot.
    pub tier: String,
    pub days_held: i64,
    pub days_until_next_tier: Option<i64>,
    pub next_tier: Option<String>,
    pub is_eligible: bool,
    /// Projected credits for the next weekly cycle.
    pub pending_rewards: RscAmount,
    /// Annualized `pending_rewards` as a percentage of the balance.
    pub projected_apy: Decimal,
    pub credit_balance: RscAmount,
}

impl StakingEngine {
    pub async fn get_staking_summary(&self, user_id: UserId) -> Result<StakingSummary> {
        let today = self.economics.clock.now().date_naive();
        let position = self.position(user_id, today).await?;
        let tiers = &self.config.tiers;

        let latest = self
            .economics
            .store
            .latest_completed_staking_cycle()
            .await?;
        let pool = self.config.weekly_pool;
        let is_eligible = position.rsc_balance >= self.config.minimum_balance;
        let pending_rewards = match latest {
            // never snapshotted, so never paid
            _ if !is_eligible => RscAmount::ZERO,
            Some(cycle) if cycle.total_weighted_balance.is_positive() => pool.scale(
                position.weighted_balance.as_decimal()
                    / cycle.total_weighted_balance.as_decimal().max(position.weighted_balance.as_decimal()),
            ),
            // sole staker until a cycle has run
            _ => pool,
        };

        let projected_apy = if position.rsc_balance.is_positive() {
            (pending_rewards.as_decimal() * Decimal::from(WEEKS_PER_YEAR)
                / position.rsc_balance.as_decimal()
                * Decimal::ONE_HUNDRED)
                .round_dp(2)
        } else {
            Decimal::ZERO
        };

        Ok(StakingSummary {
            user_id,
            rsc_balance: position.rsc_balance,
            weighted_balance: position.weighted_balance,
            multiplier: position.multiplier,
            tier: tiers.tier_name(position.days_held).to_string(),
            days_held: position.days_held,
            days_until_next_tier: tiers.days_until_next_tier(position.days_held),
            next_tier: tiers.next_tier(position.days_held).map(|t| t.name.clone()),
            is_eligible,
            pending_rewards,
            projected_apy,
            credit_balance: self.economics.credits.get_balance(user_id).await?,
        })
    }
}
