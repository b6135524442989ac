//! LocationReconciler: attach each snapshot row's time series by key.
//!
//! The join goes through a `BTreeMap<LocationKey, usize>` index over the
//! collections, O((N + M) log M), instead of scanning every collection for
//! every snapshot row.
//!
//! Cardinality: output count and order equal the snapshot input. A snapshot
//! row without a series gets an empty `cases_by_date`. When several
//! collections share a key the last one wins; every such key is reported so
//! the publish gate can block the run. Distinct snapshot keys that slug to the
//! same `id_key` are reported the same way.

use std::collections::{BTreeMap, BTreeSet};

use cvd_schemas::{derive_active, LocationSnapshot, ReconciledLocationRecord};
use serde::{Deserialize, Serialize};

use crate::combiner::TimeSeriesCollection;
use crate::location::LocationKey;

/// Distinct snapshot keys that produce the same `id_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdKeyCollision {
    pub id_key: String,
    /// Sorted, at least two.
    pub keys: Vec<LocationKey>,
}

/// A key seen more than once on one side of the join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateKey {
    pub key: LocationKey,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinReport {
    pub snapshot_rows: usize,
    pub series_collections: usize,
    pub matched: usize,
    /// Snapshot rows with no series, in snapshot order.
    pub unmatched: Vec<LocationKey>,
    pub duplicate_series_keys: Vec<DuplicateKey>,
    pub duplicate_snapshot_keys: Vec<DuplicateKey>,
    pub id_key_collisions: Vec<IdKeyCollision>,
}

impl JoinReport {
    pub fn has_duplicates(&self) -> bool {
        !self.duplicate_series_keys.is_empty()
            || !self.duplicate_snapshot_keys.is_empty()
            || !self.id_key_collisions.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub records: Vec<ReconciledLocationRecord>,
    pub report: JoinReport,
}

fn duplicates(keys: impl Iterator<Item = LocationKey>) -> Vec<DuplicateKey> {
    let mut counts: BTreeMap<LocationKey, usize> = BTreeMap::new();
    for k in keys {
        *counts.entry(k).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(key, count)| DuplicateKey { key, count })
        .collect()
}

fn id_key_collisions(keys: impl Iterator<Item = LocationKey>) -> Vec<IdKeyCollision> {
    let mut by_id: BTreeMap<String, BTreeSet<LocationKey>> = BTreeMap::new();
    for k in keys {
        by_id.entry(k.id_key()).or_default().insert(k);
    }
    by_id
        .into_iter()
        .filter(|(_, keys)| keys.len() > 1)
        .map(|(id_key, keys)| IdKeyCollision {
            id_key,
            keys: keys.into_iter().collect(),
        })
        .collect()
}

pub fn reconcile_locations(
    snapshots: &[LocationSnapshot],
    collections: &[TimeSeriesCollection],
) -> Reconciliation {
    // Later inserts overwrite earlier ones: last duplicate wins.
    let index: BTreeMap<&LocationKey, usize> = collections
        .iter()
        .enumerate()
        .map(|(i, c)| (&c.key, i))
        .collect();

    let mut report = JoinReport {
        snapshot_rows: snapshots.len(),
        series_collections: collections.len(),
        duplicate_series_keys: duplicates(collections.iter().map(|c| c.key.clone())),
        duplicate_snapshot_keys: duplicates(snapshots.iter().map(LocationKey::of_snapshot)),
        id_key_collisions: id_key_collisions(snapshots.iter().map(LocationKey::of_snapshot)),
        ..JoinReport::default()
    };

    let mut records = Vec::with_capacity(snapshots.len());
    for snap in snapshots {
        let key = LocationKey::of_snapshot(snap);
        let cases_by_date = match index.get(&key) {
            Some(&i) => {
                report.matched += 1;
                collections[i].cases_by_date.clone()
            }
            None => {
                report.unmatched.push(key.clone());
                Vec::new()
            }
        };

        let (confirmed_cases_today, deaths_today) = cases_by_date
            .last()
            .map(|r| (r.confirmed_cases_today, r.deaths_today))
            .unwrap_or((0, 0));

        records.push(ReconciledLocationRecord {
            id_key: key.id_key(),
            country: key.country().to_string(),
            province: key.province().map(str::to_string),
            latitude: snap.latitude,
            longitude: snap.longitude,
            confirmed: snap.confirmed,
            recovered: snap.recovered,
            deaths: snap.deaths,
            active: derive_active(snap.confirmed, snap.recovered, snap.deaths),
            confirmed_cases_today,
            deaths_today,
            last_update: snap.last_update,
            object_id: snap.object_id,
            cases_by_date,
        });
    }

    Reconciliation { records, report }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use cvd_schemas::DailyCountRecord;

    fn snap(country: &str, province: Option<&str>, confirmed: i64) -> LocationSnapshot {
        LocationSnapshot {
            country: country.to_string(),
            province: province.map(str::to_string),
            latitude: None,
            longitude: None,
            confirmed,
            recovered: 0,
            deaths: 0,
            active: confirmed,
            last_update: None,
            object_id: 0,
        }
    }

    fn day(n: u32, confirmed: i64, today: i64) -> DailyCountRecord {
        DailyCountRecord {
            day: NaiveDate::from_ymd_opt(2021, 1, n).unwrap(),
            confirmed_cumulative: confirmed,
            recovered_cumulative: 0,
            deaths_cumulative: 0,
            confirmed_cases_today: today,
            deaths_today: 0,
        }
    }

    fn coll(country: &str, province: Option<&str>, days: Vec<DailyCountRecord>) -> TimeSeriesCollection {
        TimeSeriesCollection {
            key: LocationKey::new(country, province),
            cases_by_date: days,
        }
    }

    #[test]
    fn output_count_and_order_follow_snapshots() {
        let snaps = vec![snap("B", None, 2), snap("A", None, 1), snap("C", None, 3)];
        let colls = vec![coll("A", None, vec![day(1, 1, 1)])];
        let out = reconcile_locations(&snaps, &colls);

        assert_eq!(out.records.len(), 3);
        let countries: Vec<&str> = out.records.iter().map(|r| r.country.as_str()).collect();
        assert_eq!(countries, vec!["B", "A", "C"]);
        assert_eq!(out.report.matched, 1);
        assert_eq!(out.report.unmatched.len(), 2);
    }

    #[test]
    fn unmatched_row_has_empty_series_and_zero_today() {
        let out = reconcile_locations(&[snap("Nowhere", None, 5)], &[]);
        let r = &out.records[0];
        assert!(r.cases_by_date.is_empty());
        assert_eq!(r.confirmed_cases_today, 0);
        assert_eq!(r.deaths_today, 0);
    }

    #[test]
    fn today_fields_come_from_last_day() {
        let out = reconcile_locations(
            &[snap("A", None, 15)],
            &[coll("A", None, vec![day(1, 10, 10), day(2, 15, 5)])],
        );
        assert_eq!(out.records[0].confirmed_cases_today, 5);
    }

    #[test]
    fn derived_active_ignores_feed_active() {
        let mut s = snap("A", None, 100);
        s.recovered = 50;
        s.deaths = 5;
        s.active = 999;
        let out = reconcile_locations(&[s], &[]);
        assert_eq!(out.records[0].active, 45);
    }

    #[test]
    fn duplicate_series_key_last_wins_and_is_reported() {
        let colls = vec![
            coll("A", None, vec![day(1, 1, 1)]),
            coll("A", Some(""), vec![day(1, 2, 2)]),
        ];
        let out = reconcile_locations(&[snap("A", None, 2)], &colls);
        assert_eq!(out.records[0].cases_by_date[0].confirmed_cumulative, 2);
        assert_eq!(
            out.report.duplicate_series_keys,
            vec![DuplicateKey { key: LocationKey::new("A", None), count: 2 }]
        );
        assert!(out.report.has_duplicates());
    }

    #[test]
    fn duplicate_snapshot_key_is_reported() {
        let out = reconcile_locations(&[snap("A", Some(""), 1), snap("A", None, 1)], &[]);
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.report.duplicate_snapshot_keys.len(), 1);
    }

    #[test]
    fn empty_string_snapshot_province_publishes_as_null() {
        let out = reconcile_locations(&[snap("A", Some(""), 1)], &[]);
        assert_eq!(out.records[0].province, None);
        assert_eq!(out.records[0].id_key, "a");
    }

    #[test]
    fn whitespace_province_joins_both_ways_and_publishes_as_null() {
        // Snapshot side padded, series side clean.
        let out = reconcile_locations(
            &[snap("Testland", Some(" "), 10)],
            &[coll("Testland", Some(""), vec![day(1, 10, 10)])],
        );
        assert_eq!(out.report.matched, 1);
        assert_eq!(out.records[0].province, None);
        assert_eq!(out.records[0].id_key, "testland");

        // Series side padded, snapshot side clean.
        let out = reconcile_locations(
            &[snap("Canada", Some("Ontario"), 10)],
            &[coll(" Canada ", Some("Ontario  "), vec![day(1, 10, 10)])],
        );
        assert_eq!(out.report.matched, 1);
        assert!(out.report.unmatched.is_empty());
    }

    #[test]
    fn published_names_are_trimmed() {
        let out = reconcile_locations(&[snap(" Canada ", Some(" Quebec "), 1)], &[]);
        assert_eq!(out.records[0].country, "Canada");
        assert_eq!(out.records[0].province.as_deref(), Some("Quebec"));
    }

    #[test]
    fn colliding_id_keys_are_reported() {
        let out = reconcile_locations(
            &[
                snap("Korea, South", None, 1),
                snap("Korea South", None, 2),
                snap("Testland", None, 3),
            ],
            &[],
        );
        assert!(out.report.duplicate_snapshot_keys.is_empty());
        assert_eq!(
            out.report.id_key_collisions,
            vec![IdKeyCollision {
                id_key: "korea-south".to_string(),
                keys: vec![
                    LocationKey::new("Korea South", None),
                    LocationKey::new("Korea, South", None),
                ],
            }]
        );
        assert!(out.report.has_duplicates());
    }

    #[test]
    fn repeated_identical_key_is_a_duplicate_not_a_collision() {
        let out = reconcile_locations(&[snap("A", None, 1), snap("A", Some(""), 1)], &[]);
        assert_eq!(out.report.duplicate_snapshot_keys.len(), 1);
        assert!(out.report.id_key_collisions.is_empty());
    }
}
