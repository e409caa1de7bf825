//! Credit balance arithmetic.
//!
//! The balance is derived, never persisted: the monthly quota comes from the
//! plan tier, the purchased portion from unexpired lots. Unlimited plans
//! report a sentinel instead of numbers.

use serde::Serialize;
use time::OffsetDateTime;

use crate::domain::entities::CreditPurchaseRecord;
use crate::domain::types::PlanTier;

/// Fraction of total capacity below which the low-balance advisory fires.
const WARN_RATIO_NUM: u64 = 1;
const WARN_RATIO_DEN: u64 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CreditBalance {
    Unlimited,
    Metered {
        monthly_quota: u32,
        monthly_used: u32,
        monthly_remaining: u32,
        purchased_remaining: u64,
        total_available: u64,
    },
}

impl CreditBalance {
    /// Derive the balance from the plan, the month's usage row, and the
    /// account's purchased lots (expired or exhausted lots contribute zero).
    pub fn derive(
        plan: PlanTier,
        monthly_used: u32,
        purchases: &[CreditPurchaseRecord],
        now: OffsetDateTime,
    ) -> Self {
        let Some(monthly_quota) = plan.monthly_quota() else {
            return CreditBalance::Unlimited;
        };

        let monthly_remaining = monthly_quota.saturating_sub(monthly_used);
        let purchased_remaining: u64 = purchases
            .iter()
            .filter(|lot| lot.is_usable(now))
            .map(|lot| lot.credits_remaining.max(0) as u64)
            .sum();

        CreditBalance::Metered {
            monthly_quota,
            monthly_used,
            monthly_remaining,
            purchased_remaining,
            total_available: monthly_remaining as u64 + purchased_remaining,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        match self {
            CreditBalance::Unlimited => false,
            CreditBalance::Metered {
                total_available, ..
            } => *total_available == 0,
        }
    }

    /// Advisory only, never gating: true when available credit has dropped
    /// under 20% of total capacity (monthly quota + all purchased amounts
    /// still usable this period).
    pub fn should_warn(&self, purchases: &[CreditPurchaseRecord], now: OffsetDateTime) -> bool {
        let CreditBalance::Metered {
            monthly_quota,
            total_available,
            ..
        } = self
        else {
            return false;
        };

        let purchased_capacity: u64 = purchases
            .iter()
            .filter(|lot| lot.is_usable(now))
            .map(|lot| lot.credits_amount.max(0) as u64)
            .sum();
        let capacity = *monthly_quota as u64 + purchased_capacity;
        if capacity == 0 {
            return true;
        }

        total_available * WARN_RATIO_DEN < capacity * WARN_RATIO_NUM
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::domain::types::PurchaseStatus;

    fn lot(amount: i32, remaining: i32, expires_at: Option<OffsetDateTime>) -> CreditPurchaseRecord {
        CreditPurchaseRecord {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            credits_amount: amount,
            credits_used: amount - remaining,
            credits_remaining: remaining,
            price_per_credit_cents: 10,
            total_price_cents: amount * 10,
            status: PurchaseStatus::Active,
            expires_at,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn total_available_is_monthly_plus_unexpired_lots() {
        let now = OffsetDateTime::now_utc();
        let lots = vec![
            lot(50, 30, None),
            lot(20, 5, Some(now + time::Duration::days(10))),
            lot(20, 20, Some(now - time::Duration::days(1))), // expired
        ];

        let balance = CreditBalance::derive(PlanTier::Starter, 40, &lots, now);
        match balance {
            CreditBalance::Metered {
                monthly_remaining,
                purchased_remaining,
                total_available,
                ..
            } => {
                assert_eq!(monthly_remaining, 60);
                assert_eq!(purchased_remaining, 35);
                assert_eq!(total_available, 95);
            }
            CreditBalance::Unlimited => panic!("starter plan is metered"),
        }
    }

    #[test]
    fn balance_never_negative_when_overdrawn() {
        let now = OffsetDateTime::now_utc();
        let balance = CreditBalance::derive(PlanTier::Free, 25, &[], now);
        match balance {
            CreditBalance::Metered {
                monthly_remaining,
                total_available,
                ..
            } => {
                assert_eq!(monthly_remaining, 0);
                assert_eq!(total_available, 0);
            }
            CreditBalance::Unlimited => panic!("free plan is metered"),
        }
    }

    #[test]
    fn unlimited_plan_reports_sentinel() {
        let now = OffsetDateTime::now_utc();
        let balance = CreditBalance::derive(PlanTier::Unlimited, 9999, &[lot(10, 10, None)], now);
        assert_eq!(balance, CreditBalance::Unlimited);
        assert!(!balance.is_exhausted());
        assert!(!balance.should_warn(&[], now));
    }

    #[test]
    fn warns_under_twenty_percent() {
        let now = OffsetDateTime::now_utc();
        let lots = vec![lot(100, 10, None)];
        // capacity = 100 quota + 100 purchased = 200; available = 0 + 10
        let balance = CreditBalance::derive(PlanTier::Starter, 100, &lots, now);
        assert!(balance.should_warn(&lots, now));

        // plenty left: no warning
        let lots = vec![lot(100, 100, None)];
        let balance = CreditBalance::derive(PlanTier::Starter, 0, &lots, now);
        assert!(!balance.should_warn(&lots, now));
    }
}
