use crate::error::{Result, StakingError};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Holding-duration band: `[min_days, max_days)`, open-ended when
/// `max_days` is `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiplierTier {
    pub name: String,
    pub min_days: i64,
    pub max_days: Option<i64>,
    pub multiplier: Decimal,
}

impl MultiplierTier {
    fn new(name: &str, min_days: i64, max_days: Option<i64>, multiplier: Decimal) -> Self {
        Self {
            name: name.to_string(),
            min_days,
            max_days,
            multiplier,
        }
    }

    pub fn contains(&self, days: i64) -> bool {
        days >= self.min_days && self.max_days.map_or(true, |max| days < max)
    }
}

/// Ordered, contiguous tier table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TierTable {
    tiers: Vec<MultiplierTier>,
}

impl Default for TierTable {
    fn default() -> Self {
        Self {
            tiers: vec![
                MultiplierTier::new("Bronze", 0, Some(30), dec!(1.0)),
                MultiplierTier::new("Silver", 30, Some(90), dec!(2.5)),
                MultiplierTier::new("Gold", 90, Some(180), dec!(4.0)),
                MultiplierTier::new("Platinum", 180, Some(365), dec!(6.0)),
                MultiplierTier::new("Diamond", 365, None, dec!(7.5)),
            ],
        }
    }
}

impl TierTable {
    pub fn new(tiers: Vec<MultiplierTier>) -> Result<Self> {
        let table = Self { tiers };
        table.validate()?;
        Ok(table)
    }

    pub fn tiers(&self) -> &[MultiplierTier] {
        &self.tiers
    }

    /// The first tier starts at day 0, each band begins where the previous
    /// one ends, only the last is open-ended and multipliers are positive.
    pub fn validate(&self) -> Result<()> {
        let Some(first) = self.tiers.first() else {
            return Err(StakingError::InvalidConfig("tier table is empty".into()));
        };
        if first.min_days != 0 {
            return Err(StakingError::InvalidConfig(format!(
                "first tier must start at day 0, starts at {}",
                first.min_days
            )));
        }

        for (i, tier) in self.tiers.iter().enumerate() {
            if tier.multiplier <= Decimal::ZERO {
                return Err(StakingError::InvalidConfig(format!(
                    "tier {} has non-positive multiplier {}",
                    tier.name, tier.multiplier
                )));
            }
            let is_last = i + 1 == self.tiers.len();
            match (tier.max_days, self.tiers.get(i + 1)) {
                (Some(max), Some(next)) if max == next.min_days && max > tier.min_days => {}
                (None, None) => {}
                _ if is_last => {
                    return Err(StakingError::InvalidConfig(format!(
                        "last tier {} must be open-ended",
                        tier.name
                    )))
                }
                _ => {
                    return Err(StakingError::InvalidConfig(format!(
                        "tier {} does not end where the next tier begins",
                        tier.name
                    )))
                }
            }
        }
        Ok(())
    }

    pub fn tier_for_days(&self, days: i64) -> Option<&MultiplierTier> {
        self.tiers.iter().find(|t| t.contains(days.max(0)))
    }

    /// Multiplier for a holding duration; 1.0 when no tier matches.
    pub fn multiplier_for_days(&self, days: i64) -> Decimal {
        self.tier_for_days(days)
            .map(|t| t.multiplier)
            .unwrap_or(Decimal::ONE)
    }

    pub fn tier_name(&self, days: i64) -> &str {
        self.tier_for_days(days)
            .map(|t| t.name.as_str())
            .unwrap_or("Unknown")
    }

    /// `None` once the holder is in the open-ended top tier.
    pub fn days_until_next_tier(&self, days: i64) -> Option<i64> {
        let days = days.max(0);
        self.tier_for_days(days)
            .and_then(|t| t.max_days)
            .map(|max| max - days)
    }

    pub fn next_tier(&self, days: i64) -> Option<&MultiplierTier> {
        let max = self.tier_for_days(days)?.max_days?;
        self.tier_for_days(max)
    }
}
