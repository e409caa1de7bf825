use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{CreditsRepo, RepoError},
    domain::entities::CreditPurchaseRecord,
    domain::types::PurchaseStatus,
};

use super::{PostgresRepositories, map_sqlx_error, parse_enum};

#[derive(sqlx::FromRow)]
struct PurchaseRow {
    id: Uuid,
    user_id: Uuid,
    credits_amount: i32,
    credits_used: i32,
    credits_remaining: i32,
    price_per_credit_cents: i32,
    total_price_cents: i32,
    status: String,
    expires_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
}

impl TryFrom<PurchaseRow> for CreditPurchaseRecord {
    type Error = RepoError;

    fn try_from(row: PurchaseRow) -> Result<Self, RepoError> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            credits_amount: row.credits_amount,
            credits_used: row.credits_used,
            credits_remaining: row.credits_remaining,
            price_per_credit_cents: row.price_per_credit_cents,
            total_price_cents: row.total_price_cents,
            status: parse_enum::<PurchaseStatus>(&row.status, "credit_purchases.status")?,
            expires_at: row.expires_at,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl CreditsRepo for PostgresRepositories {
    async fn monthly_used(&self, user_id: Uuid, period: &str) -> Result<u32, RepoError> {
        let used: Option<i32> = sqlx::query_scalar(
            "SELECT credits_used FROM credit_usage WHERE user_id = $1 AND period = $2",
        )
        .bind(user_id)
        .bind(period)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(used.unwrap_or(0).max(0) as u32)
    }

    async fn try_increment_monthly(
        &self,
        user_id: Uuid,
        period: &str,
        quota: u32,
    ) -> Result<bool, RepoError> {
        if quota == 0 {
            return Ok(false);
        }

        // Conditional upsert: the WHERE clause makes an exhausted month a
        // zero-row update instead of an overdraft.
        let result = sqlx::query(
            "INSERT INTO credit_usage (user_id, period, credits_used, updated_at) \
             VALUES ($1, $2, 1, $4) \
             ON CONFLICT (user_id, period) DO UPDATE SET \
                 credits_used = credit_usage.credits_used + 1, \
                 updated_at = $4 \
             WHERE credit_usage.credits_used < $3",
        )
        .bind(user_id)
        .bind(period)
        .bind(i32::try_from(quota).map_err(|_| RepoError::invalid_input("quota out of range"))?)
        .bind(OffsetDateTime::now_utc())
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn try_consume_purchased(
        &self,
        user_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<Option<Uuid>, RepoError> {
        // Oldest usable lot first; SKIP LOCKED sends concurrent spenders to
        // the next lot instead of blocking.
        let lot_id: Option<Uuid> = sqlx::query_scalar(
            "UPDATE credit_purchases SET \
                 credits_used = credits_used + 1, \
                 credits_remaining = credits_remaining - 1, \
                 status = CASE WHEN credits_remaining - 1 = 0 \
                     THEN 'exhausted' ELSE status END \
             WHERE id = ( \
                 SELECT id FROM credit_purchases \
                 WHERE user_id = $1 AND status = 'active' AND credits_remaining >= 1 \
                     AND (expires_at IS NULL OR expires_at > $2) \
                 ORDER BY created_at \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED) \
             RETURNING id",
        )
        .bind(user_id)
        .bind(now)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(lot_id)
    }

    async fn list_purchases(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<CreditPurchaseRecord>, RepoError> {
        let rows = sqlx::query_as::<_, PurchaseRow>(
            "SELECT id, user_id, credits_amount, credits_used, credits_remaining, \
                 price_per_credit_cents, total_price_cents, status, expires_at, created_at \
             FROM credit_purchases WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(CreditPurchaseRecord::try_from).collect()
    }
}
