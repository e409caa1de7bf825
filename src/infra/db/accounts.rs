use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    application::repos::{AccountsRepo, RepoError},
    domain::types::PlanTier,
};

use super::{PostgresRepositories, map_sqlx_error, parse_enum};

#[async_trait]
impl AccountsRepo for PostgresRepositories {
    async fn plan_for(&self, user_id: Uuid) -> Result<Option<PlanTier>, RepoError> {
        let raw: Option<String> =
            sqlx::query_scalar("SELECT plan FROM accounts WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(self.pool())
                .await
                .map_err(map_sqlx_error)?;

        raw.map(|plan| parse_enum::<PlanTier>(&plan, "accounts.plan"))
            .transpose()
    }
}
