//! A blocked generation never reaches the store.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use cvd_db::{GenerationStore, MemoryStore};
use cvd_reconcile::GateReason;
use cvd_runtime::{Pipeline, RunOutcome};
use cvd_schemas::Metric;
use cvd_testkit::fixtures::{jan, series_row, snapshot, world_feeds};
use cvd_testkit::{FakeSeriesFeed, FakeSnapshotFeed};

/// Store already holding the world generation, plus handles to its feeds.
async fn published_world() -> (MemoryStore, FakeSnapshotFeed, FakeSeriesFeed, Pipeline) {
    let (snap, series) = world_feeds();
    let store = MemoryStore::new();
    let p = Pipeline::new(
        Arc::new(snap.clone()),
        Arc::new(series.clone()),
        Arc::new(store.clone()) as Arc<dyn GenerationStore>,
    );
    let at = Utc.with_ymd_and_hms(2021, 1, 3, 0, 0, 0).unwrap();
    assert!(p.run_once(at).await.unwrap().is_published());
    (store, snap, series, p)
}

async fn assert_rejected_and_untouched(
    store: &MemoryStore,
    p: &Pipeline,
    expected: Vec<GateReason>,
) {
    let before = store.snapshot().unwrap();
    let commits = store.commits();

    let outcome = p.run_once(Utc::now()).await.unwrap();
    assert_eq!(outcome, RunOutcome::Rejected { reasons: expected });
    assert_eq!(store.snapshot().unwrap(), before);
    assert_eq!(store.commits(), commits);
    assert_eq!(store.rollbacks(), 0);
}

#[tokio::test]
async fn empty_snapshot_is_rejected() {
    let (store, snap, _series, p) = published_world().await;
    snap.set_rows(vec![]);
    assert_rejected_and_untouched(&store, &p, vec![GateReason::NoLocations]).await;
}

#[tokio::test]
async fn each_zero_total_is_rejected() {
    for metric in Metric::ALL {
        let (store, snap, _series, p) = published_world().await;
        let (c, r, d) = match metric {
            Metric::Confirmed => (0, 10, 10),
            Metric::Recovered => (10, 0, 10),
            Metric::Deaths => (10, 10, 0),
        };
        snap.set_totals(c, r, d);
        assert_rejected_and_untouched(&store, &p, vec![GateReason::NonPositiveTotal(metric)])
            .await;
    }
}

#[tokio::test]
async fn duplicate_series_key_is_rejected() {
    let (store, _snap, series, p) = published_world().await;
    series.set_metric(
        Metric::Confirmed,
        vec![
            series_row("Testland", "", jan(1), &[10, 10, 15]),
            series_row("Testland", "", jan(1), &[11, 12, 13]),
            series_row("Canada", "Ontario", jan(1), &[100, 120, 150]),
        ],
    );
    assert_rejected_and_untouched(&store, &p, vec![GateReason::DuplicateSeriesKeys(1)]).await;
}

#[tokio::test]
async fn locations_sharing_an_id_key_are_rejected() {
    let (store, snap, _series, p) = published_world().await;
    snap.set_rows(vec![
        snapshot("Korea, South", None, 500, 100, 10),
        snapshot("Korea South", None, 5, 1, 1),
        snapshot("Testland", None, 15, 5, 1),
    ]);
    assert_rejected_and_untouched(&store, &p, vec![GateReason::IdKeyCollisions(1)]).await;
}

#[tokio::test]
async fn padded_snapshot_names_still_join_and_publish_trimmed() {
    let (store, snap, _series, p) = published_world().await;
    snap.set_rows(vec![
        snapshot(" Testland ", Some("  "), 15, 5, 1),
        snapshot("Canada", Some(" Ontario "), 150, 20, 3),
    ]);

    let outcome = p.run_once(Utc::now()).await.unwrap();
    assert!(outcome.is_published());

    let g = store.snapshot().expect("published generation");
    let ids: Vec<&str> = g.locations.iter().map(|r| r.id_key.as_str()).collect();
    assert_eq!(ids, vec!["testland", "canada--ontario"]);
    assert_eq!(g.locations[0].country, "Testland");
    assert_eq!(g.locations[0].province, None);
    assert_eq!(g.locations[1].province.as_deref(), Some("Ontario"));
    assert!(g.locations.iter().all(|r| !r.cases_by_date.is_empty()));
}
