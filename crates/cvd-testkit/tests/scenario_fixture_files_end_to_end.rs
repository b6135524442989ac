//! Full pipeline over the shipped CSV/JSON fixtures.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use cvd_db::{GenerationStore, MemoryStore};
use cvd_runtime::{Pipeline, RunOutcome};
use cvd_testkit::fixture_file_feeds;

fn init_logs() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn fixture_pipeline(store: &MemoryStore) -> Pipeline {
    let (snap, series) = fixture_file_feeds().expect("fixtures load");
    Pipeline::new(
        Arc::new(snap),
        Arc::new(series),
        Arc::new(store.clone()) as Arc<dyn GenerationStore>,
    )
}

#[tokio::test]
async fn fixtures_reconcile_into_one_record_per_snapshot_row() {
    init_logs();
    let store = MemoryStore::new();
    let at = Utc.with_ymd_and_hms(2021, 1, 3, 18, 0, 0).unwrap();

    let outcome = fixture_pipeline(&store).run_once(at).await.unwrap();
    assert!(outcome.is_published());

    let g = store.snapshot().unwrap();
    assert_eq!(g.locations.len(), 2);
    assert_eq!(g.totals.confirmed, 165);
    assert_eq!(g.totals.recovered, 33);
    assert_eq!(g.totals.deaths, 5);
    assert_eq!(g.totals.active, 127);
    assert_eq!(g.totals.all_countries, vec!["Canada", "Testland"]);

    let testland = g.locations.iter().find(|r| r.id_key == "testland").unwrap();
    let deltas: Vec<i64> = testland
        .cases_by_date
        .iter()
        .map(|d| d.confirmed_cases_today)
        .collect();
    assert_eq!(deltas, vec![10, 0, 5]);
    assert_eq!(testland.province, None);

    let ontario = g
        .locations
        .iter()
        .find(|r| r.id_key == "canada--ontario")
        .unwrap();
    assert_eq!(ontario.confirmed_cases_today, 30);
    assert_eq!(ontario.deaths_today, 2);
    assert_eq!(ontario.active, 116);

    let global: Vec<i64> = g
        .totals
        .time_series_total_cases_by_date
        .iter()
        .map(|d| d.confirmed_cumulative)
        .collect();
    assert_eq!(global, vec![110, 130, 165]);
}

#[tokio::test]
async fn republishing_identical_inputs_is_byte_identical() {
    let store = MemoryStore::new();
    let p = fixture_pipeline(&store);
    let at = Utc.with_ymd_and_hms(2021, 1, 3, 18, 0, 0).unwrap();

    assert!(matches!(p.run_once(at).await.unwrap(), RunOutcome::Published(_)));
    let first = serde_json::to_vec(&store.snapshot().unwrap()).unwrap();

    assert!(matches!(p.run_once(at).await.unwrap(), RunOutcome::Published(_)));
    let second = serde_json::to_vec(&store.snapshot().unwrap()).unwrap();

    assert_eq!(first, second);
    assert_eq!(store.commits(), 2);
}
