//! Postgres-backed repository implementations.
//!
//! Queries are runtime-checked; domain enums are stored as TEXT and
//! decoded through their `TryFrom<&str>` impls. Every conditional state
//! transition is a single guarded UPDATE, so concurrent writers can never
//! regress progress or resurrect a terminal row.

mod accounts;
mod assets;
mod audit;
mod batches;
mod connections;
mod credits;
mod fixes;
mod jobs;
mod util;

pub use util::{map_sqlx_error, parse_enum};

use std::sync::Arc;

use sqlx::{
    postgres::{PgPool, PgPoolOptions},
    query,
};

#[derive(Clone)]
pub struct PostgresRepositories {
    pool: Arc<PgPool>,
}

impl PostgresRepositories {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
    }

    pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        query("SELECT 1").execute(self.pool()).await.map(|_| ())
    }
}
