//! Credit ledger service.
//!
//! Consumption order is fixed: unlimited plans bypass the ledger entirely,
//! then the monthly quota, then purchased lots oldest-first. Every metered
//! consumption is a single conditional update in the repository, so the
//! ledger can never go negative under concurrent spenders.

use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use crate::application::error::AppError;
use crate::application::repos::{AccountsRepo, CreditsRepo};
use crate::cache::{CacheKey, CacheState, EntityKey};
use crate::domain::credits::CreditBalance;
use crate::domain::types::PlanTier;

/// Which pool satisfied a consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum CreditSource {
    Unlimited,
    Monthly,
    Purchased { lot_id: Uuid },
}

/// Calendar-month ledger key, `YYYY-MM`.
pub fn period_key(now: OffsetDateTime) -> String {
    format!("{:04}-{:02}", now.year(), u8::from(now.month()))
}

pub struct CreditService {
    accounts: Arc<dyn AccountsRepo>,
    credits: Arc<dyn CreditsRepo>,
    cache: CacheState,
}

impl CreditService {
    pub fn new(
        accounts: Arc<dyn AccountsRepo>,
        credits: Arc<dyn CreditsRepo>,
        cache: CacheState,
    ) -> Self {
        Self {
            accounts,
            credits,
            cache,
        }
    }

    async fn plan_for(&self, user_id: Uuid) -> Result<PlanTier, AppError> {
        self.accounts
            .plan_for(user_id)
            .await?
            .ok_or(AppError::NotFound)
    }

    /// Cache-through derived balance.
    pub async fn balance(&self, user_id: Uuid) -> Result<CreditBalance, AppError> {
        if let Some(hit) = self.cache.store.get_balance(user_id) {
            return Ok(hit);
        }

        let now = OffsetDateTime::now_utc();
        let balance = self.derive_balance(user_id, now).await?;

        self.cache.store.put_balance(user_id, balance.clone());
        self.cache.registry.register(
            CacheKey::CreditBalance(user_id),
            std::collections::HashSet::from([EntityKey::UserCredits(user_id)]),
        );
        Ok(balance)
    }

    async fn derive_balance(
        &self,
        user_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<CreditBalance, AppError> {
        let plan = self.plan_for(user_id).await?;
        let used = self
            .credits
            .monthly_used(user_id, &period_key(now))
            .await?;
        let purchases = self.credits.list_purchases(user_id).await?;
        Ok(CreditBalance::derive(plan, used, &purchases, now))
    }

    /// Consume exactly one credit. Returns the pool that paid for it, or
    /// [`AppError::InsufficientCredits`] when both pools are empty.
    pub async fn consume(&self, user_id: Uuid) -> Result<CreditSource, AppError> {
        let plan = self.plan_for(user_id).await?;
        let Some(quota) = plan.monthly_quota() else {
            debug!(%user_id, "credit consumption bypassed: unlimited plan");
            return Ok(CreditSource::Unlimited);
        };

        let now = OffsetDateTime::now_utc();
        let period = period_key(now);

        let source = if self
            .credits
            .try_increment_monthly(user_id, &period, quota)
            .await?
        {
            CreditSource::Monthly
        } else if let Some(lot_id) = self.credits.try_consume_purchased(user_id, now).await? {
            CreditSource::Purchased { lot_id }
        } else {
            metrics::counter!("sitemend_credit_denials_total").increment(1);
            info!(%user_id, %period, "credit consumption denied: ledger exhausted");
            return Err(AppError::InsufficientCredits);
        };

        metrics::counter!("sitemend_credits_consumed_total").increment(1);
        self.cache.trigger.credits_changed(user_id).await;
        debug!(%user_id, ?source, "credit consumed");
        Ok(source)
    }

    /// Low-balance advisory; never gates anything.
    pub async fn should_warn(&self, user_id: Uuid) -> Result<bool, AppError> {
        let now = OffsetDateTime::now_utc();
        let balance = self.balance(user_id).await?;
        let purchases = self.credits.list_purchases(user_id).await?;
        Ok(balance.should_warn(&purchases, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn period_key_is_calendar_month() {
        assert_eq!(period_key(datetime!(2026-03-07 12:00 UTC)), "2026-03");
        assert_eq!(period_key(datetime!(2026-12-31 23:59 UTC)), "2026-12");
    }
}
