//! TimeSeriesCombiner: three cumulative metric streams in, one per-day
//! record sequence per location plus a global per-day aggregate out.
//!
//! The confirmed stream defines the (location, day) universe. Recovered and
//! deaths cells are looked up against it; a missing cell counts as 0 and is
//! tallied. Rows that exist only in recovered or deaths are dropped and
//! tallied as orphans.
//!
//! Daily deltas are `cumulative(day) - cumulative(day - 1)`, with the first
//! day's delta equal to its cumulative. Negative deltas pass through.
//! All arithmetic saturates at the `i64` bounds instead of overflowing.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use cvd_schemas::{DailyCountRecord, RawSeriesRow};
use serde::{Deserialize, Serialize};

use crate::location::LocationKey;

/// Ordered-by-day records for one location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesCollection {
    pub key: LocationKey,
    pub cases_by_date: Vec<DailyCountRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombineReport {
    /// Rows in the confirmed stream.
    pub series_rows: usize,
    pub missing_recovered_cells: usize,
    pub missing_deaths_cells: usize,
    /// Recovered/deaths rows with no confirmed counterpart.
    pub orphan_series: usize,
    /// Days where `confirmed_cases_today` or `deaths_today` went negative.
    pub negative_deltas: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CombinedSeries {
    /// One per confirmed row, in feed order. Duplicate keys are kept.
    pub collections: Vec<TimeSeriesCollection>,
    /// Per-day sum over every collection, ordered by day.
    pub global: Vec<DailyCountRecord>,
    pub report: CombineReport,
}

type DayIndex = BTreeMap<LocationKey, BTreeMap<NaiveDate, i64>>;

fn index_by_key(rows: &[RawSeriesRow]) -> DayIndex {
    let mut idx = DayIndex::new();
    for row in rows {
        let days = idx.entry(LocationKey::of_series_row(row)).or_default();
        for (day, count) in &row.counts {
            days.insert(*day, *count);
        }
    }
    idx
}

pub fn combine_metric_series(
    confirmed: &[RawSeriesRow],
    recovered: &[RawSeriesRow],
    deaths: &[RawSeriesRow],
) -> CombinedSeries {
    let recovered_idx = index_by_key(recovered);
    let deaths_idx = index_by_key(deaths);

    let mut report = CombineReport {
        series_rows: confirmed.len(),
        ..CombineReport::default()
    };

    let confirmed_keys: BTreeSet<LocationKey> =
        confirmed.iter().map(LocationKey::of_series_row).collect();
    report.orphan_series = recovered_idx
        .keys()
        .chain(deaths_idx.keys())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .filter(|k| !confirmed_keys.contains(*k))
        .count();

    let mut global: BTreeMap<NaiveDate, DailyCountRecord> = BTreeMap::new();
    let mut collections = Vec::with_capacity(confirmed.len());

    for row in confirmed {
        let key = LocationKey::of_series_row(row);
        let rec_days = recovered_idx.get(&key);
        let death_days = deaths_idx.get(&key);

        let mut counts = row.counts.clone();
        counts.sort_by_key(|(day, _)| *day);

        let mut cases_by_date = Vec::with_capacity(counts.len());
        let mut prev: Option<(i64, i64)> = None;

        for (day, confirmed_cum) in counts {
            let recovered_cum = match rec_days.and_then(|m| m.get(&day)) {
                Some(v) => *v,
                None => {
                    report.missing_recovered_cells += 1;
                    0
                }
            };
            let deaths_cum = match death_days.and_then(|m| m.get(&day)) {
                Some(v) => *v,
                None => {
                    report.missing_deaths_cells += 1;
                    0
                }
            };

            let (confirmed_today, deaths_today) = match prev {
                Some((pc, pd)) => (
                    confirmed_cum.saturating_sub(pc),
                    deaths_cum.saturating_sub(pd),
                ),
                None => (confirmed_cum, deaths_cum),
            };
            if confirmed_today < 0 || deaths_today < 0 {
                report.negative_deltas += 1;
            }
            prev = Some((confirmed_cum, deaths_cum));

            let rec = DailyCountRecord {
                day,
                confirmed_cumulative: confirmed_cum,
                recovered_cumulative: recovered_cum,
                deaths_cumulative: deaths_cum,
                confirmed_cases_today: confirmed_today,
                deaths_today,
            };
            accumulate(&mut global, &rec);
            cases_by_date.push(rec);
        }

        collections.push(TimeSeriesCollection { key, cases_by_date });
    }

    CombinedSeries {
        collections,
        global: global.into_values().collect(),
        report,
    }
}

fn accumulate(global: &mut BTreeMap<NaiveDate, DailyCountRecord>, rec: &DailyCountRecord) {
    let g = global.entry(rec.day).or_insert(DailyCountRecord {
        day: rec.day,
        confirmed_cumulative: 0,
        recovered_cumulative: 0,
        deaths_cumulative: 0,
        confirmed_cases_today: 0,
        deaths_today: 0,
    });
    g.confirmed_cumulative = g.confirmed_cumulative.saturating_add(rec.confirmed_cumulative);
    g.recovered_cumulative = g.recovered_cumulative.saturating_add(rec.recovered_cumulative);
    g.deaths_cumulative = g.deaths_cumulative.saturating_add(rec.deaths_cumulative);
    g.confirmed_cases_today = g.confirmed_cases_today.saturating_add(rec.confirmed_cases_today);
    g.deaths_today = g.deaths_today.saturating_add(rec.deaths_today);
}
