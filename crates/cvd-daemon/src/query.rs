//! Read-side selection over a published generation: filters, the top-N sort
//! and its field names. Pure; handlers in `routes.rs` do the HTTP part.

use std::fmt;
use std::str::FromStr;

use cvd_schemas::ReconciledLocationRecord;

use crate::api_types::LocationsQuery;

pub const DEFAULT_TOP_LIMIT: usize = 10;

/// Numeric record fields the top-N route can sort by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Confirmed,
    Active,
    Recovered,
    Deaths,
    ConfirmedToday,
    DeathsToday,
}

impl SortField {
    pub const ALL: [SortField; 6] = [
        SortField::Confirmed,
        SortField::Active,
        SortField::Recovered,
        SortField::Deaths,
        SortField::ConfirmedToday,
        SortField::DeathsToday,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SortField::Confirmed => "confirmed",
            SortField::Active => "active",
            SortField::Recovered => "recovered",
            SortField::Deaths => "deaths",
            SortField::ConfirmedToday => "confirmedToday",
            SortField::DeathsToday => "deathsToday",
        }
    }

    pub fn value(self, r: &ReconciledLocationRecord) -> i64 {
        match self {
            SortField::Confirmed => r.confirmed,
            SortField::Active => r.active,
            SortField::Recovered => r.recovered,
            SortField::Deaths => r.deaths,
            SortField::ConfirmedToday => r.confirmed_cases_today,
            SortField::DeathsToday => r.deaths_today,
        }
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SortField::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| {
                let known: Vec<&str> = SortField::ALL.iter().map(|f| f.as_str()).collect();
                format!("unknown sort field '{s}'; expected one of {}", known.join(", "))
            })
    }
}

/// `None` and `""` are the same province.
fn province_matches(record: Option<&str>, wanted: &str) -> bool {
    match (record, wanted) {
        (None, "") => true,
        (Some(p), w) => p == w,
        (None, _) => false,
    }
}

/// Apply `/v1/locations` filters. Publish order is kept.
pub fn filter_locations<'a>(
    records: &'a [ReconciledLocationRecord],
    q: &LocationsQuery,
    no_province_exceptions: &[String],
) -> Vec<&'a ReconciledLocationRecord> {
    records
        .iter()
        .filter(|r| q.country.as_deref().map_or(true, |c| r.country == c))
        .filter(|r| {
            q.province
                .as_deref()
                .map_or(true, |p| province_matches(r.province.as_deref(), p))
        })
        .filter(|r| {
            !q.no_province
                || r.province
                    .as_ref()
                    .map_or(true, |p| no_province_exceptions.iter().any(|e| e == p))
        })
        .collect()
}

/// Records whose `id_key` is in `ids`, in the order of `ids`. Unknown ids
/// are skipped.
pub fn select_by_ids<'a>(
    records: &'a [ReconciledLocationRecord],
    ids: &[&str],
) -> Vec<&'a ReconciledLocationRecord> {
    ids.iter()
        .filter_map(|id| records.iter().find(|r| r.id_key == *id))
        .collect()
}

/// Named-province records of `country`, confirmed descending.
pub fn provinces_of<'a>(
    records: &'a [ReconciledLocationRecord],
    country: &str,
) -> Vec<&'a ReconciledLocationRecord> {
    let mut out: Vec<&ReconciledLocationRecord> = records
        .iter()
        .filter(|r| r.country == country && r.province.is_some())
        .collect();
    out.sort_by(|a, b| b.confirmed.cmp(&a.confirmed));
    out
}

/// Country-level records sorted descending by `field`; ties keep publish
/// order.
pub fn top_countries(
    records: &[ReconciledLocationRecord],
    field: SortField,
    limit: usize,
) -> Vec<&ReconciledLocationRecord> {
    let mut out: Vec<&ReconciledLocationRecord> =
        records.iter().filter(|r| r.province.is_none()).collect();
    out.sort_by(|a, b| field.value(b).cmp(&field.value(a)));
    out.truncate(limit);
    out
}

/// Parse `?limit=`: absent gives the default, zero or negative is refused.
pub fn parse_limit(limit: Option<i64>) -> Result<usize, String> {
    match limit {
        None => Ok(DEFAULT_TOP_LIMIT),
        Some(n) if n > 0 => usize::try_from(n).map_err(|_| format!("limit {n} is too large")),
        Some(n) => Err(format!("limit must be positive, got {n}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(country: &str, province: Option<&str>, confirmed: i64) -> ReconciledLocationRecord {
        ReconciledLocationRecord {
            id_key: match province {
                Some(p) => format!("{}--{}", country.to_lowercase(), p.to_lowercase()),
                None => country.to_lowercase(),
            },
            country: country.to_string(),
            province: province.map(str::to_string),
            latitude: None,
            longitude: None,
            confirmed,
            recovered: 0,
            deaths: 0,
            active: confirmed,
            confirmed_cases_today: 0,
            deaths_today: 0,
            last_update: None,
            object_id: 0,
            cases_by_date: vec![],
        }
    }

    fn sample() -> Vec<ReconciledLocationRecord> {
        vec![
            rec("Denmark", None, 80),
            rec("Denmark", Some("Greenland"), 20),
            rec("Canada", Some("Ontario"), 150),
            rec("Canada", Some("Quebec"), 300),
            rec("Testland", None, 15),
        ]
    }

    #[test]
    fn empty_province_means_none() {
        let rs = sample();
        let q = LocationsQuery {
            country: Some("Denmark".into()),
            province: Some(String::new()),
            no_province: false,
        };
        let got = filter_locations(&rs, &q, &[]);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].province, None);
    }

    #[test]
    fn no_province_includes_exceptions() {
        let rs = sample();
        let q = LocationsQuery {
            no_province: true,
            ..Default::default()
        };
        let keys: Vec<&str> = filter_locations(&rs, &q, &["Greenland".to_string()])
            .iter()
            .map(|r| r.id_key.as_str())
            .collect();
        assert_eq!(keys, vec!["denmark", "denmark--greenland", "testland"]);

        let keys: Vec<&str> = filter_locations(&rs, &q, &[])
            .iter()
            .map(|r| r.id_key.as_str())
            .collect();
        assert_eq!(keys, vec!["denmark", "testland"]);
    }

    #[test]
    fn provinces_sorted_by_confirmed_desc() {
        let rs = sample();
        let got: Vec<i64> = provinces_of(&rs, "Canada").iter().map(|r| r.confirmed).collect();
        assert_eq!(got, vec![300, 150]);
    }

    #[test]
    fn top_skips_provinces_and_truncates() {
        let rs = sample();
        let got = top_countries(&rs, SortField::Confirmed, 1);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].country, "Denmark");
    }

    #[test]
    fn by_ids_follows_request_order() {
        let rs = sample();
        let got: Vec<&str> = select_by_ids(&rs, &["testland", "nope", "denmark"])
            .iter()
            .map(|r| r.id_key.as_str())
            .collect();
        assert_eq!(got, vec!["testland", "denmark"]);
    }

    #[test]
    fn sort_field_names_and_limits() {
        assert_eq!("confirmedToday".parse::<SortField>(), Ok(SortField::ConfirmedToday));
        assert!("population".parse::<SortField>().is_err());
        assert_eq!(parse_limit(None), Ok(DEFAULT_TOP_LIMIT));
        assert_eq!(parse_limit(Some(3)), Ok(3));
        assert!(parse_limit(Some(0)).is_err());
        assert!(parse_limit(Some(-2)).is_err());
    }
}
