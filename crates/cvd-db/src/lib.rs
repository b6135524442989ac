//! cvd-db
//!
//! Postgres store for published generations.
//!
//! - `connect` / `connect_from_env` / `migrate` / `status`: operator plumbing.
//! - [`GenerationStore`] / [`PublishTxn`]: the seam the publish coordinator
//!   and the read layer go through.
//! - [`PgStore`]: the production implementation.
//! - `MemoryStore` (feature `testkit`): same contract, in memory, with fault
//!   injection for mid-commit failures.

use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};

mod pg;
mod store;

#[cfg(feature = "testkit")]
mod memory;

pub use pg::{PgPublishTxn, PgStore, PUBLISH_LOCK_KEY};
pub use store::{GenerationStore, PublishTxn};

#[cfg(feature = "testkit")]
pub use memory::{FailPoint, MemoryStore};

pub const ENV_DB_URL: &str = "CVD_DATABASE_URL";

/// Connect to Postgres at `url`.
pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Connect to Postgres using the URL in `env_var` (usually [`ENV_DB_URL`]).
pub async fn connect_from_env(env_var: &str, max_connections: u32) -> Result<PgPool> {
    let url = std::env::var(env_var).with_context(|| format!("missing env var {env_var}"))?;
    connect(&url, max_connections).await
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;
    let ok = one == 1;

    let has_totals_table = table_exists(pool, "totals").await?;
    let has_locations_table = table_exists(pool, "cases_by_location").await?;

    Ok(DbStatus {
        ok,
        has_totals_table,
        has_locations_table,
    })
}

async fn table_exists(pool: &PgPool, table: &str) -> Result<bool> {
    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema = 'public' and table_name = $1
        )
        "#,
    )
    .bind(table)
    .fetch_one(pool)
    .await
    .with_context(|| format!("status table-exists query failed for {table}"))?;

    Ok(exists)
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_totals_table: bool,
    pub has_locations_table: bool,
}

impl DbStatus {
    pub fn is_migrated(&self) -> bool {
        self.has_totals_table && self.has_locations_table
    }
}
