//! One pipeline run: fetch barrier → assemble → publish.
//!
//! Both feed sides are fetched concurrently and joined with `try_join!`;
//! the first failure cancels the rest and nothing reaches the store.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use cvd_db::GenerationStore;
use cvd_feeds::{FeedError, SnapshotFeed, TimeSeriesFeed};
use cvd_reconcile::{assemble_generation, AssembledGeneration, GenerationInputs};
use cvd_schemas::{LocationSnapshot, Metric, RawSeriesRow};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::outcome::{RunError, RunOutcome};
use crate::publish::PublishCoordinator;

pub struct Pipeline {
    snapshot: Arc<dyn SnapshotFeed>,
    series: Arc<dyn TimeSeriesFeed>,
    coordinator: PublishCoordinator,
}

impl Pipeline {
    pub fn new(
        snapshot: Arc<dyn SnapshotFeed>,
        series: Arc<dyn TimeSeriesFeed>,
        store: Arc<dyn GenerationStore>,
    ) -> Self {
        Self {
            snapshot,
            series,
            coordinator: PublishCoordinator::new(store),
        }
    }

    /// Fetch everything one run needs. All seven calls are in flight at once.
    pub async fn fetch_inputs(&self) -> Result<GenerationInputs, FeedError> {
        let (snapshot_side, series_side) =
            tokio::try_join!(self.fetch_snapshot_side(), self.fetch_series_side())?;
        let (snapshots, confirmed_total, recovered_total, deaths_total) = snapshot_side;
        let (confirmed, recovered, deaths) = series_side;

        Ok(GenerationInputs {
            snapshots,
            confirmed_total,
            recovered_total,
            deaths_total,
            confirmed_series: confirmed,
            recovered_series: recovered,
            deaths_series: deaths,
        })
    }

    async fn fetch_snapshot_side(
        &self,
    ) -> Result<(Vec<LocationSnapshot>, i64, i64, i64), FeedError> {
        let feed = self.snapshot.as_ref();
        tokio::try_join!(
            feed.fetch_location_snapshots(),
            feed.fetch_global_metric_total(Metric::Confirmed),
            feed.fetch_global_metric_total(Metric::Recovered),
            feed.fetch_global_metric_total(Metric::Deaths),
        )
    }

    async fn fetch_series_side(
        &self,
    ) -> Result<(Vec<RawSeriesRow>, Vec<RawSeriesRow>, Vec<RawSeriesRow>), FeedError> {
        let feed = self.series.as_ref();
        tokio::try_join!(
            feed.fetch_metric_series(Metric::Confirmed),
            feed.fetch_metric_series(Metric::Recovered),
            feed.fetch_metric_series(Metric::Deaths),
        )
    }

    /// Run once with a fresh run id.
    pub async fn run_once(&self, generated_at: DateTime<Utc>) -> Result<RunOutcome, RunError> {
        self.run_with_id(Uuid::new_v4(), generated_at).await
    }

    #[instrument(name = "pipeline_run", skip_all, fields(run_id = %run_id))]
    pub async fn run_with_id(
        &self,
        run_id: Uuid,
        generated_at: DateTime<Utc>,
    ) -> Result<RunOutcome, RunError> {
        info!(
            snapshot_feed = self.snapshot.name(),
            series_feed = self.series.name(),
            "run started"
        );

        let inputs = match self.fetch_inputs().await {
            Ok(inputs) => inputs,
            Err(e) => {
                error!(error = %e, "fetch failed; nothing written");
                return Err(RunError::Fetch(e));
            }
        };
        info!(
            snapshot_rows = inputs.snapshots.len(),
            confirmed_rows = inputs.confirmed_series.len(),
            recovered_rows = inputs.recovered_series.len(),
            deaths_rows = inputs.deaths_series.len(),
            "fetch complete"
        );

        let assembled = assemble_generation(&inputs, generated_at);
        log_reports(&assembled);

        self.coordinator.publish(&assembled).await
    }
}

fn log_reports(assembled: &AssembledGeneration) {
    let join = &assembled.join_report;
    let combine = &assembled.combine_report;

    info!(
        "{} records from {} snapshot rows and {} series",
        assembled.generation.locations.len(),
        join.snapshot_rows,
        join.series_collections
    );

    if !join.unmatched.is_empty() {
        warn!(count = join.unmatched.len(), "snapshot rows without a series");
    }
    for c in &join.id_key_collisions {
        warn!(id_key = %c.id_key, locations = c.keys.len(), "id key shared by distinct locations");
    }
    if combine.negative_deltas > 0 {
        warn!(count = combine.negative_deltas, "negative daily deltas");
    }
    let misaligned = combine.missing_recovered_cells + combine.missing_deaths_cells;
    if misaligned > 0 {
        warn!(
            missing_recovered = combine.missing_recovered_cells,
            missing_deaths = combine.missing_deaths_cells,
            "misaligned metric cells read as zero"
        );
    }
    if combine.orphan_series > 0 {
        warn!(count = combine.orphan_series, "series rows absent from confirmed dropped");
    }
}
