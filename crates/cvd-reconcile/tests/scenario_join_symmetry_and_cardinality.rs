//! Join invariants across combine + reconcile + assembly.
//!
//! GREEN when:
//! - a null snapshot province matches an empty-string series province, and
//!   an empty-string snapshot province matches the same key
//! - output record count equals snapshot count for every input mix
//! - cumulative [10, 10, 15] yields deltas [10, 0, 5]
//! - the Testland fixture reconciles to one record with one day
//! - identical inputs assemble identical generations

use chrono::{NaiveDate, TimeZone, Utc};
use cvd_reconcile::*;
use cvd_schemas::{LocationSnapshot, Metric, RawSeriesRow};

fn snap(country: &str, province: Option<&str>, c: i64, r: i64, d: i64) -> LocationSnapshot {
    LocationSnapshot {
        country: country.to_string(),
        province: province.map(str::to_string),
        latitude: Some(1.0),
        longitude: Some(2.0),
        confirmed: c,
        recovered: r,
        deaths: d,
        active: c - (r + d),
        last_update: None,
        object_id: 1,
    }
}

fn series(country: &str, province: &str, start: NaiveDate, counts: &[i64]) -> RawSeriesRow {
    RawSeriesRow {
        province: province.to_string(),
        country: country.to_string(),
        latitude: None,
        longitude: None,
        counts: counts
            .iter()
            .enumerate()
            .map(|(i, c)| (start + chrono::Days::new(i as u64), *c))
            .collect(),
    }
}

fn jan(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2021, 1, day).unwrap()
}

fn testland_inputs() -> GenerationInputs {
    GenerationInputs {
        snapshots: vec![snap("Testland", None, 100, 50, 5)],
        confirmed_total: 100,
        recovered_total: 50,
        deaths_total: 5,
        confirmed_series: vec![series("Testland", "", jan(1), &[100])],
        recovered_series: vec![series("Testland", "", jan(1), &[50])],
        deaths_series: vec![series("Testland", "", jan(1), &[5])],
    }
}

#[test]
fn null_snapshot_province_matches_empty_series_province() {
    let combined = combine_metric_series(
        &[series("Testland", "", jan(1), &[3])],
        &[],
        &[],
    );
    let out = reconcile_locations(&[snap("Testland", None, 3, 0, 0)], &combined.collections);
    assert_eq!(out.report.matched, 1);
    assert_eq!(out.records[0].cases_by_date.len(), 1);
}

#[test]
fn empty_snapshot_province_matches_same_key() {
    let combined = combine_metric_series(
        &[series("Testland", "", jan(1), &[3])],
        &[],
        &[],
    );
    let out = reconcile_locations(&[snap("Testland", Some(""), 3, 0, 0)], &combined.collections);
    assert_eq!(out.report.matched, 1);
    assert!(out.report.unmatched.is_empty());
}

#[test]
fn named_province_does_not_match_country_level_series() {
    let combined = combine_metric_series(&[series("Canada", "", jan(1), &[3])], &[], &[]);
    let out = reconcile_locations(&[snap("Canada", Some("Ontario"), 3, 0, 0)], &combined.collections);
    assert_eq!(out.report.matched, 0);
    assert_eq!(
        out.report.unmatched,
        vec![LocationKey::new("Canada", Some("Ontario"))]
    );
}

#[test]
fn record_count_always_equals_snapshot_count() {
    let snapshots = vec![
        snap("A", None, 1, 1, 1),
        snap("B", Some("X"), 1, 1, 1),
        snap("B", Some("Y"), 1, 1, 1),
        snap("C", None, 1, 1, 1),
    ];
    let series_sets: Vec<Vec<RawSeriesRow>> = vec![
        vec![],
        vec![series("A", "", jan(1), &[1])],
        vec![series("B", "X", jan(1), &[1]), series("Z", "", jan(1), &[1])],
        vec![series("A", "", jan(1), &[1]), series("A", "", jan(1), &[2])],
    ];

    for confirmed in series_sets {
        let combined = combine_metric_series(&confirmed, &[], &[]);
        let out = reconcile_locations(&snapshots, &combined.collections);
        assert_eq!(out.records.len(), snapshots.len());
    }
}

#[test]
fn cumulative_confirmed_yields_expected_deltas() {
    let combined = combine_metric_series(
        &[series("Testland", "", jan(1), &[10, 10, 15])],
        &[series("Testland", "", jan(1), &[0, 0, 0])],
        &[series("Testland", "", jan(1), &[0, 0, 0])],
    );
    let deltas: Vec<i64> = combined.collections[0]
        .cases_by_date
        .iter()
        .map(|r| r.confirmed_cases_today)
        .collect();
    assert_eq!(deltas, vec![10, 0, 5]);
}

#[test]
fn testland_end_to_end_assembles_one_record() {
    let at = Utc.with_ymd_and_hms(2021, 1, 2, 0, 0, 0).unwrap();
    let out = assemble_generation(&testland_inputs(), at);

    assert!(out.gate.is_permitted(), "gate: {:?}", out.gate);
    assert_eq!(out.generation.locations.len(), 1);

    let rec = &out.generation.locations[0];
    assert_eq!(rec.country, "Testland");
    assert_eq!(rec.province, None);
    assert_eq!(rec.confirmed, 100);
    assert_eq!(rec.active, 45);
    assert_eq!(rec.cases_by_date.len(), 1);
    assert_eq!(rec.cases_by_date[0].confirmed_cumulative, 100);
    assert_eq!(rec.cases_by_date[0].recovered_cumulative, 50);
    assert_eq!(rec.cases_by_date[0].deaths_cumulative, 5);

    let totals = &out.generation.totals;
    assert_eq!(totals.active, 45);
    assert_eq!(totals.all_countries, vec!["Testland".to_string()]);
    assert_eq!(totals.timestamp, at);
    assert_eq!(totals.time_series_total_cases_by_date.len(), 1);
}

#[test]
fn identical_inputs_assemble_identical_generations() {
    let at = Utc.with_ymd_and_hms(2021, 1, 2, 0, 0, 0).unwrap();
    let a = assemble_generation(&testland_inputs(), at);
    let b = assemble_generation(&testland_inputs(), at);
    assert_eq!(a, b);
}

#[test]
fn zero_total_blocks_assembly_gate() {
    let mut inputs = testland_inputs();
    inputs.recovered_total = 0;
    let out = assemble_generation(&inputs, Utc.with_ymd_and_hms(2021, 1, 2, 0, 0, 0).unwrap());
    assert_eq!(
        out.gate.reasons(),
        &[GateReason::NonPositiveTotal(Metric::Recovered)]
    );
}

#[test]
fn empty_snapshot_blocks_assembly_gate() {
    let mut inputs = testland_inputs();
    inputs.snapshots.clear();
    let out = assemble_generation(&inputs, Utc.with_ymd_and_hms(2021, 1, 2, 0, 0, 0).unwrap());
    assert!(out.gate.is_blocked());
    assert!(out.gate.reasons().contains(&GateReason::NoLocations));
}

#[test]
fn duplicate_series_key_blocks_assembly_gate() {
    let mut inputs = testland_inputs();
    inputs
        .confirmed_series
        .push(series("Testland", "", jan(1), &[100]));
    let out = assemble_generation(&inputs, Utc.with_ymd_and_hms(2021, 1, 2, 0, 0, 0).unwrap());
    assert_eq!(out.gate.reasons(), &[GateReason::DuplicateSeriesKeys(1)]);
    assert_eq!(out.generation.locations.len(), 1);
}
