//! Fixture builders for snapshot rows, series rows and ready-made feed pairs.

use chrono::{Days, NaiveDate};
use cvd_schemas::{LocationSnapshot, RawSeriesRow};

use crate::fakes::{FakeSeriesFeed, FakeSnapshotFeed};

pub fn jan(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2021, 1, day).unwrap_or(NaiveDate::MIN)
}

pub fn snapshot(
    country: &str,
    province: Option<&str>,
    confirmed: i64,
    recovered: i64,
    deaths: i64,
) -> LocationSnapshot {
    LocationSnapshot {
        country: country.to_string(),
        province: province.map(str::to_string),
        latitude: None,
        longitude: None,
        confirmed,
        recovered,
        deaths,
        active: confirmed - (recovered + deaths),
        last_update: None,
        object_id: 0,
    }
}

/// Consecutive days starting at `start`, one per count.
pub fn series_row(country: &str, province: &str, start: NaiveDate, counts: &[i64]) -> RawSeriesRow {
    RawSeriesRow {
        province: province.to_string(),
        country: country.to_string(),
        latitude: None,
        longitude: None,
        counts: counts
            .iter()
            .enumerate()
            .map(|(i, c)| (start + Days::new(i as u64), *c))
            .collect(),
    }
}

/// Single country-level location, single day:
/// snapshot `Testland / null` 100/50/5, series `Testland / ""` on 2021-01-01.
pub fn testland_feeds() -> (FakeSnapshotFeed, FakeSeriesFeed) {
    let snap = FakeSnapshotFeed::new(vec![snapshot("Testland", None, 100, 50, 5)], 100, 50, 5);
    let series = FakeSeriesFeed::new(
        vec![series_row("Testland", "", jan(1), &[100])],
        vec![series_row("Testland", "", jan(1), &[50])],
        vec![series_row("Testland", "", jan(1), &[5])],
    );
    (snap, series)
}

/// Several countries, named provinces and a "no province" exception
/// (`Denmark / Greenland`), three days each. `Atlantis` has no series.
pub fn world_feeds() -> (FakeSnapshotFeed, FakeSeriesFeed) {
    let rows = vec![
        snapshot("Testland", None, 15, 3, 1),
        snapshot("Canada", Some("Ontario"), 150, 30, 4),
        snapshot("Canada", Some("Quebec"), 300, 60, 10),
        snapshot("Denmark", None, 80, 40, 2),
        snapshot("Denmark", Some("Greenland"), 20, 10, 0),
        snapshot("Korea, South", None, 500, 400, 9),
        snapshot("Atlantis", None, 1, 0, 0),
    ];
    let confirmed: i64 = rows.iter().map(|r| r.confirmed).sum();
    let recovered: i64 = rows.iter().map(|r| r.recovered).sum();
    let deaths: i64 = rows.iter().map(|r| r.deaths).sum();
    let snap = FakeSnapshotFeed::new(rows, confirmed, recovered, deaths);

    let series = FakeSeriesFeed::new(
        vec![
            series_row("Testland", "", jan(1), &[10, 10, 15]),
            series_row("Canada", "Ontario", jan(1), &[100, 120, 150]),
            series_row("Canada", "Quebec", jan(1), &[200, 280, 300]),
            series_row("Denmark", "", jan(1), &[60, 70, 80]),
            series_row("Denmark", "Greenland", jan(1), &[18, 19, 20]),
            series_row("Korea, South", "", jan(1), &[450, 480, 500]),
        ],
        vec![
            series_row("Testland", "", jan(1), &[1, 2, 3]),
            series_row("Canada", "Ontario", jan(1), &[10, 20, 30]),
            series_row("Canada", "Quebec", jan(1), &[20, 40, 60]),
            series_row("Denmark", "", jan(1), &[30, 35, 40]),
            series_row("Denmark", "Greenland", jan(1), &[5, 8, 10]),
            series_row("Korea, South", "", jan(1), &[300, 350, 400]),
        ],
        vec![
            series_row("Testland", "", jan(1), &[0, 0, 1]),
            series_row("Canada", "Ontario", jan(1), &[1, 2, 4]),
            series_row("Canada", "Quebec", jan(1), &[5, 8, 10]),
            series_row("Denmark", "", jan(1), &[1, 1, 2]),
            series_row("Denmark", "Greenland", jan(1), &[0, 0, 0]),
            series_row("Korea, South", "", jan(1), &[7, 8, 9]),
        ],
    );
    (snap, series)
}
