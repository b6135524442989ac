//! In-memory feeds with switchable failures and call counters.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use cvd_feeds::{FeedError, SnapshotFeed, TimeSeriesFeed};
use cvd_schemas::{LocationSnapshot, Metric, RawSeriesRow};

fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Snapshot feed
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct SnapshotState {
    rows: Vec<LocationSnapshot>,
    totals: BTreeMap<Metric, i64>,
    fail: Option<String>,
    calls: usize,
}

/// Cloneable handle; clones share state, so a test can keep one handle and
/// hand another to the pipeline.
#[derive(Debug, Clone, Default)]
pub struct FakeSnapshotFeed {
    state: Arc<Mutex<SnapshotState>>,
}

impl FakeSnapshotFeed {
    pub fn new(rows: Vec<LocationSnapshot>, confirmed: i64, recovered: i64, deaths: i64) -> Self {
        let feed = Self::default();
        feed.set_rows(rows);
        feed.set_totals(confirmed, recovered, deaths);
        feed
    }

    pub fn set_rows(&self, rows: Vec<LocationSnapshot>) {
        guard(&self.state).rows = rows;
    }

    pub fn set_totals(&self, confirmed: i64, recovered: i64, deaths: i64) {
        let mut st = guard(&self.state);
        st.totals.insert(Metric::Confirmed, confirmed);
        st.totals.insert(Metric::Recovered, recovered);
        st.totals.insert(Metric::Deaths, deaths);
    }

    /// Every call fails with `FeedError::Transport(msg)` until cleared.
    pub fn fail_with(&self, msg: &str) {
        guard(&self.state).fail = Some(msg.to_string());
    }

    pub fn clear_failure(&self) {
        guard(&self.state).fail = None;
    }

    pub fn calls(&self) -> usize {
        guard(&self.state).calls
    }

    fn enter(&self) -> Result<MutexGuard<'_, SnapshotState>, FeedError> {
        let mut st = guard(&self.state);
        st.calls += 1;
        if let Some(msg) = st.fail.clone() {
            return Err(FeedError::Transport(msg));
        }
        Ok(st)
    }
}

#[async_trait]
impl SnapshotFeed for FakeSnapshotFeed {
    fn name(&self) -> &'static str {
        "fake-snapshot"
    }

    async fn fetch_location_snapshots(&self) -> Result<Vec<LocationSnapshot>, FeedError> {
        Ok(self.enter()?.rows.clone())
    }

    async fn fetch_global_metric_total(&self, metric: Metric) -> Result<i64, FeedError> {
        Ok(self.enter()?.totals.get(&metric).copied().unwrap_or(0))
    }
}

// ---------------------------------------------------------------------------
// Series feed
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct SeriesState {
    series: BTreeMap<Metric, Vec<RawSeriesRow>>,
    fail: BTreeMap<Metric, String>,
    calls: usize,
}

#[derive(Debug, Clone, Default)]
pub struct FakeSeriesFeed {
    state: Arc<Mutex<SeriesState>>,
}

impl FakeSeriesFeed {
    pub fn new(
        confirmed: Vec<RawSeriesRow>,
        recovered: Vec<RawSeriesRow>,
        deaths: Vec<RawSeriesRow>,
    ) -> Self {
        let feed = Self::default();
        feed.set_metric(Metric::Confirmed, confirmed);
        feed.set_metric(Metric::Recovered, recovered);
        feed.set_metric(Metric::Deaths, deaths);
        feed
    }

    pub fn set_metric(&self, metric: Metric, rows: Vec<RawSeriesRow>) {
        guard(&self.state).series.insert(metric, rows);
    }

    /// Calls for `metric` fail with a decode error until cleared.
    pub fn fail_metric(&self, metric: Metric, msg: &str) {
        guard(&self.state).fail.insert(metric, msg.to_string());
    }

    pub fn clear_failures(&self) {
        guard(&self.state).fail.clear();
    }

    pub fn calls(&self) -> usize {
        guard(&self.state).calls
    }
}

#[async_trait]
impl TimeSeriesFeed for FakeSeriesFeed {
    fn name(&self) -> &'static str {
        "fake-series"
    }

    async fn fetch_metric_series(&self, metric: Metric) -> Result<Vec<RawSeriesRow>, FeedError> {
        let mut st = guard(&self.state);
        st.calls += 1;
        if let Some(msg) = st.fail.get(&metric) {
            return Err(FeedError::Decode(msg.clone()));
        }
        Ok(st.series.get(&metric).cloned().unwrap_or_default())
    }
}
