//! Postgres-backed [`GenerationStore`].
//!
//! Publish: `begin` → `pg_advisory_xact_lock` → delete/insert `totals` →
//! delete/insert `cases_by_location` → `commit`. The advisory lock is
//! released with the transaction, so overlapping runs queue instead of
//! interleaving their deletes.
//!
//! Read: both tables in one `REPEATABLE READ, READ ONLY` transaction so the
//! totals and the locations always come from the same generation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cvd_schemas::{DailyCountRecord, Generation, GlobalTotals, ReconciledLocationRecord};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::debug;

use crate::store::{GenerationStore, PublishTxn};

/// Advisory lock key shared by every publisher of this schema.
pub const PUBLISH_LOCK_KEY: i64 = 0x0063_7664_5f70_7562;

/// Repository handle with an explicit open/close lifecycle.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn open(url: &str, max_connections: u32) -> Result<Self> {
        let pool = crate::connect(url, max_connections).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Wait for in-flight queries and close every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl GenerationStore for PgStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn begin_publish(&self) -> Result<Box<dyn PublishTxn>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("begin publish transaction failed")?;

        sqlx::query("select pg_advisory_xact_lock($1)")
            .bind(PUBLISH_LOCK_KEY)
            .execute(&mut *tx)
            .await
            .context("publish advisory lock failed")?;

        Ok(Box::new(PgPublishTxn { tx }))
    }

    async fn load_generation(&self) -> Result<Option<Generation>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("begin read transaction failed")?;

        sqlx::query("set transaction isolation level repeatable read, read only")
            .execute(&mut *tx)
            .await
            .context("set read isolation failed")?;

        let totals_row = sqlx::query(
            r#"
            select confirmed, recovered, deaths, active,
                   time_series_total_cases_by_date, all_countries, generated_at_utc
            from totals
            where id = 1
            "#,
        )
        .fetch_optional(&mut *tx)
        .await
        .context("load totals failed")?;

        let Some(row) = totals_row else {
            tx.rollback().await.context("end read transaction failed")?;
            return Ok(None);
        };

        let series: Json<Vec<DailyCountRecord>> = row.try_get("time_series_total_cases_by_date")?;
        let countries: Json<Vec<String>> = row.try_get("all_countries")?;
        let totals = GlobalTotals {
            confirmed: row.try_get("confirmed")?,
            recovered: row.try_get("recovered")?,
            deaths: row.try_get("deaths")?,
            active: row.try_get("active")?,
            time_series_total_cases_by_date: series.0,
            all_countries: countries.0,
            timestamp: row.try_get::<DateTime<Utc>, _>("generated_at_utc")?,
        };

        let rows = sqlx::query(
            r#"
            select id_key, country, province, latitude, longitude,
                   confirmed, recovered, deaths, active,
                   confirmed_cases_today, deaths_today,
                   last_update_utc, object_id, cases_by_date
            from cases_by_location
            order by position asc
            "#,
        )
        .fetch_all(&mut *tx)
        .await
        .context("load cases_by_location failed")?;

        let mut locations = Vec::with_capacity(rows.len());
        for r in rows {
            let cases: Json<Vec<DailyCountRecord>> = r.try_get("cases_by_date")?;
            locations.push(ReconciledLocationRecord {
                id_key: r.try_get("id_key")?,
                country: r.try_get("country")?,
                province: r.try_get("province")?,
                latitude: r.try_get("latitude")?,
                longitude: r.try_get("longitude")?,
                confirmed: r.try_get("confirmed")?,
                recovered: r.try_get("recovered")?,
                deaths: r.try_get("deaths")?,
                active: r.try_get("active")?,
                confirmed_cases_today: r.try_get("confirmed_cases_today")?,
                deaths_today: r.try_get("deaths_today")?,
                last_update: r.try_get("last_update_utc")?,
                object_id: r.try_get("object_id")?,
                cases_by_date: cases.0,
            });
        }

        tx.commit().await.context("end read transaction failed")?;
        Ok(Some(Generation { totals, locations }))
    }
}

pub struct PgPublishTxn {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl PublishTxn for PgPublishTxn {
    async fn replace_totals(&mut self, totals: &GlobalTotals) -> Result<()> {
        sqlx::query("delete from totals")
            .execute(&mut *self.tx)
            .await
            .context("clear totals failed")?;

        sqlx::query(
            r#"
            insert into totals (
              id, confirmed, recovered, deaths, active,
              time_series_total_cases_by_date, all_countries, generated_at_utc
            ) values (
              1, $1, $2, $3, $4, $5, $6, $7
            )
            "#,
        )
        .bind(totals.confirmed)
        .bind(totals.recovered)
        .bind(totals.deaths)
        .bind(totals.active)
        .bind(Json(&totals.time_series_total_cases_by_date))
        .bind(Json(&totals.all_countries))
        .bind(totals.timestamp)
        .execute(&mut *self.tx)
        .await
        .context("insert totals failed")?;

        Ok(())
    }

    async fn replace_locations(&mut self, records: &[ReconciledLocationRecord]) -> Result<u64> {
        let cleared = sqlx::query("delete from cases_by_location")
            .execute(&mut *self.tx)
            .await
            .context("clear cases_by_location failed")?
            .rows_affected();
        debug!(cleared, "cases_by_location cleared");

        let mut written = 0u64;
        for (position, rec) in records.iter().enumerate() {
            let position = i64::try_from(position).context("location position overflow")?;
            written += sqlx::query(
                r#"
                insert into cases_by_location (
                  position, id_key, country, province, latitude, longitude,
                  confirmed, recovered, deaths, active,
                  confirmed_cases_today, deaths_today,
                  last_update_utc, object_id, cases_by_date
                ) values (
                  $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15
                )
                "#,
            )
            .bind(position)
            .bind(&rec.id_key)
            .bind(&rec.country)
            .bind(&rec.province)
            .bind(rec.latitude)
            .bind(rec.longitude)
            .bind(rec.confirmed)
            .bind(rec.recovered)
            .bind(rec.deaths)
            .bind(rec.active)
            .bind(rec.confirmed_cases_today)
            .bind(rec.deaths_today)
            .bind(rec.last_update)
            .bind(rec.object_id)
            .bind(Json(&rec.cases_by_date))
            .execute(&mut *self.tx)
            .await
            .with_context(|| format!("insert cases_by_location failed for {}", rec.id_key))?
            .rows_affected();
        }

        Ok(written)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.context("publish commit failed")
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await.context("publish rollback failed")
    }
}
