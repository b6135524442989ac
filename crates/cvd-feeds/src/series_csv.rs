//! Decoder for the wide-format cumulative time-series CSV.
//!
//! ## Column contract
//!
//! | Column           | Example    | Notes                                   |
//! |------------------|------------|-----------------------------------------|
//! | `Province/State` | `Ontario`  | Empty means "no sub-division"           |
//! | `Country/Region` | `Canada`   | Required, non-empty                     |
//! | `Lat`            | `51.2538`  | Optional decimal                        |
//! | `Long`           | `-85.3232` | Optional decimal                        |
//! | `<M/D/YY>` ...   | `1/22/20`  | One column per day, cumulative integers |
//!
//! Empty count cells read as 0. Anything else that is not an integer is a
//! decode error, as are unparseable date headers and ragged rows.

use chrono::NaiveDate;
use cvd_schemas::RawSeriesRow;

use crate::provider::FeedError;

const FIXED_COLUMNS: [&str; 4] = ["province/state", "country/region", "lat", "long"];

/// Decode a full CSV document into one [`RawSeriesRow`] per data row.
pub fn parse_series_csv(text: &str) -> Result<Vec<RawSeriesRow>, FeedError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(text.as_bytes());

    let headers = rdr
        .headers()
        .map_err(|e| FeedError::Decode(format!("series csv header: {e}")))?
        .clone();

    if headers.len() < FIXED_COLUMNS.len() {
        return Err(FeedError::Decode(format!(
            "series csv header has {} columns, expected at least {}",
            headers.len(),
            FIXED_COLUMNS.len()
        )));
    }
    for (i, expected) in FIXED_COLUMNS.iter().enumerate() {
        let got = headers[i].trim().to_ascii_lowercase();
        if got != *expected {
            return Err(FeedError::Decode(format!(
                "series csv column {i} is '{}', expected '{expected}'",
                &headers[i]
            )));
        }
    }

    let days = headers
        .iter()
        .skip(FIXED_COLUMNS.len())
        .map(parse_header_day)
        .collect::<Result<Vec<NaiveDate>, FeedError>>()?;

    let mut out = Vec::new();
    for (idx, rec) in rdr.records().enumerate() {
        // Row numbers are 1-based and count the header.
        let row = idx + 2;
        let rec = rec.map_err(|e| FeedError::Decode(format!("series csv row {row}: {e}")))?;

        let country = rec[1].to_string();
        if country.trim().is_empty() {
            return Err(FeedError::Decode(format!(
                "series csv row {row}: empty Country/Region"
            )));
        }

        let mut counts = Vec::with_capacity(days.len());
        for (offset, day) in days.iter().enumerate() {
            let cell = &rec[FIXED_COLUMNS.len() + offset];
            counts.push((*day, parse_count(cell, row, *day)?));
        }

        out.push(RawSeriesRow {
            province: rec[0].to_string(),
            country,
            latitude: parse_coord(&rec[2], row, "Lat")?,
            longitude: parse_coord(&rec[3], row, "Long")?,
            counts,
        });
    }

    Ok(out)
}

/// Parse a `M/D/YY` (or `M/D/YYYY`) day header.
fn parse_header_day(raw: &str) -> Result<NaiveDate, FeedError> {
    let bad = || FeedError::Decode(format!("series csv date header '{raw}' is not M/D/YY"));

    let mut parts = raw.trim().split('/');
    let (Some(m), Some(d), Some(y), None) = (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(bad());
    };

    let month: u32 = m.parse().map_err(|_| bad())?;
    let day: u32 = d.parse().map_err(|_| bad())?;
    let mut year: i32 = y.parse().map_err(|_| bad())?;
    if y.len() <= 2 {
        year += 2000;
    }

    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(bad)
}

fn parse_count(cell: &str, row: usize, day: NaiveDate) -> Result<i64, FeedError> {
    let t = cell.trim();
    if t.is_empty() {
        return Ok(0);
    }
    t.parse::<i64>().map_err(|_| {
        FeedError::Decode(format!(
            "series csv row {row}: count for {day} is not an integer: '{t}'"
        ))
    })
}

fn parse_coord(cell: &str, row: usize, field: &str) -> Result<Option<f64>, FeedError> {
    let t = cell.trim();
    if t.is_empty() {
        return Ok(None);
    }
    t.parse::<f64>().map(Some).map_err(|_| {
        FeedError::Decode(format!(
            "series csv row {row}: {field} is not a number: '{t}'"
        ))
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
