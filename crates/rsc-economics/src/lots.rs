use rsc_types::{BalanceLot, ConsumedLot, RscAmount};

/// Requested more than the open lots hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shortfall {
    pub requested: RscAmount,
    pub available: RscAmount,
}

/// Pure FIFO arithmetic over a user's lots.
///
/// Consumption always drains the oldest `entry_date` first (ties by lot id),
/// partially draining the last lot touched. Callers persist the plan.
pub struct LotAccountant;

impl LotAccountant {
    pub fn available(lots: &[BalanceLot]) -> RscAmount {
        lots.iter().map(|l| l.remaining_amount).sum()
    }

    pub fn plan_consumption(
        lots: &[BalanceLot],
        amount: RscAmount,
    ) -> Result<Vec<ConsumedLot>, Shortfall> {
        let available = Self::available(lots);
        if amount > available {
            return Err(Shortfall {
                requested: amount,
                available,
            });
        }

        let mut ordered: Vec<&BalanceLot> = lots.iter().filter(|l| l.is_open()).collect();
        ordered.sort_by(|a, b| a.entry_date.cmp(&b.entry_date).then(a.id.cmp(&b.id)));

        let mut outstanding = amount;
        let mut plan = Vec::new();
        for lot in ordered {
            if !outstanding.is_positive() {
                break;
            }
            let consumed = outstanding.min(lot.remaining_amount);
            outstanding -= consumed;
            plan.push(ConsumedLot {
                lot_id: lot.id,
                entry_date: lot.entry_date,
                consumed,
                remaining_after: lot.remaining_amount - consumed,
            });
        }

        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use proptest::prelude::*;
    use rsc_types::{BalanceEntryId, LotId, UserId};

    fn lot(id: u64, days_ago: i64, remaining: i64) -> BalanceLot {
        BalanceLot {
            id: LotId(id),
            user_id: UserId(1),
            source_entry_id: BalanceEntryId(id),
            entry_date: Utc::now() - Duration::days(days_ago),
            original_amount: RscAmount::from_rsc(remaining.max(1)),
            remaining_amount: RscAmount::from_rsc(remaining),
        }
    }

    #[test]
    fn test_oldest_lot_drains_first() {
        // 50 RSC held 10 days, 30 RSC held 5 days; withdraw 60
        let lots = vec![lot(2, 5, 30), lot(1, 10, 50)];
        let plan = LotAccountant::plan_consumption(&lots, RscAmount::from_rsc(60)).unwrap();

        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].lot_id, LotId(1));
        assert_eq!(plan[0].consumed, RscAmount::from_rsc(50));
        assert_eq!(plan[0].remaining_after, RscAmount::ZERO);
        assert_eq!(plan[1].lot_id, LotId(2));
        assert_eq!(plan[1].consumed, RscAmount::from_rsc(10));
        assert_eq!(plan[1].remaining_after, RscAmount::from_rsc(20));
    }

    #[test]
    fn test_shortfall_reports_available() {
        let lots = vec![lot(1, 3, 40)];
        let err = LotAccountant::plan_consumption(&lots, RscAmount::from_rsc(41)).unwrap_err();
        assert_eq!(err.available, RscAmount::from_rsc(40));
    }

    #[test]
    fn test_exhausted_lots_are_skipped() {
        let lots = vec![lot(1, 9, 0), lot(2, 4, 5)];
        let plan = LotAccountant::plan_consumption(&lots, RscAmount::from_rsc(5)).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].lot_id, LotId(2));
    }

    proptest! {
        #[test]
        fn prop_plan_consumes_exactly_requested(
            sizes in prop::collection::vec(1i64..500, 1..12),
            take_pct in 0u32..=100,
        ) {
            let lots: Vec<BalanceLot> = sizes
                .iter()
                .enumerate()
                .map(|(i, s)| lot(i as u64 + 1, (sizes.len() - i) as i64, *s))
                .collect();
            let total: i64 = sizes.iter().sum();
            let request = RscAmount::from_rsc(total * take_pct as i64 / 100);

            let plan = LotAccountant::plan_consumption(&lots, request).unwrap();
            let consumed: RscAmount = plan.iter().map(|c| c.consumed).sum();
            prop_assert_eq!(consumed, request);

            // only the last touched lot may be partially drained
            for step in plan.iter().take(plan.len().saturating_sub(1)) {
                prop_assert!(step.remaining_after.is_zero());
            }
            for window in plan.windows(2) {
                prop_assert!(window[0].entry_date <= window[1].entry_date);
            }
        }
    }
}
