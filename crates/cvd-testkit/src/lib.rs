//! cvd-testkit
//!
//! Fake feeds, fixture builders and file loaders shared by the scenario
//! tests of every crate. Nothing here talks to the network or a database.

use anyhow::{Context, Result};
use cvd_schemas::{LocationSnapshot, RawSeriesRow};
use std::fs;

pub mod fakes;
pub mod fixtures;

pub use fakes::{FakeSeriesFeed, FakeSnapshotFeed};

/// Directory of the CSV/JSON fixtures shipped with this crate.
pub fn fixtures_dir() -> &'static str {
    concat!(env!("CARGO_MANIFEST_DIR"), "/fixtures")
}

pub fn load_series_csv(path: &str) -> Result<Vec<RawSeriesRow>> {
    let text = fs::read_to_string(path).with_context(|| format!("read series csv: {path}"))?;
    cvd_feeds::parse_series_csv(&text).with_context(|| format!("parse series csv: {path}"))
}

pub fn load_snapshots_json(path: &str) -> Result<Vec<LocationSnapshot>> {
    let s = fs::read_to_string(path).with_context(|| format!("read snapshots: {path}"))?;
    let rows: Vec<LocationSnapshot> = serde_json::from_str(&s).context("parse snapshots json")?;
    Ok(rows)
}

/// Feeds built from the shipped fixture files. Totals are the snapshot sums.
pub fn fixture_file_feeds() -> Result<(FakeSnapshotFeed, FakeSeriesFeed)> {
    let dir = fixtures_dir();
    let rows = load_snapshots_json(&format!("{dir}/snapshots.json"))?;
    let confirmed = rows.iter().map(|r| r.confirmed).sum();
    let recovered = rows.iter().map(|r| r.recovered).sum();
    let deaths = rows.iter().map(|r| r.deaths).sum();

    let series = FakeSeriesFeed::new(
        load_series_csv(&format!("{dir}/time_series_covid19_confirmed_global.csv"))?,
        load_series_csv(&format!("{dir}/time_series_covid19_recovered_global.csv"))?,
        load_series_csv(&format!("{dir}/time_series_covid19_deaths_global.csv"))?,
    );
    Ok((
        FakeSnapshotFeed::new(rows, confirmed, recovered, deaths),
        series,
    ))
}
