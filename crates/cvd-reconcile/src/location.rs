//! Location key normalization.
//!
//! The snapshot feed spells "no sub-division" as a null province; the series
//! feed spells it as an empty string. Both collapse to `None` here. This is
//! the only place key text is normalized: every [`LocationKey`] is built
//! through [`normalize_country`] and [`normalize_province`], and feed
//! adapters pass names through untouched.

use std::fmt;

use cvd_schemas::{LocationSnapshot, RawSeriesRow};
use serde::{Deserialize, Serialize};

/// Surrounding whitespace is dropped. Inner text is kept verbatim.
pub fn normalize_country(country: &str) -> String {
    country.trim().to_string()
}

/// `None`, `Some("")` and whitespace-only all mean "no province". Anything
/// else is trimmed and otherwise kept verbatim.
pub fn normalize_province(province: Option<&str>) -> Option<String> {
    match province.map(str::trim) {
        None | Some("") => None,
        Some(p) => Some(p.to_string()),
    }
}

/// Join key: (country, normalized province).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocationKey {
    country: String,
    province: Option<String>,
}

impl LocationKey {
    pub fn new(country: &str, province: Option<&str>) -> Self {
        Self {
            country: normalize_country(country),
            province: normalize_province(province),
        }
    }

    pub fn of_snapshot(row: &LocationSnapshot) -> Self {
        Self::new(&row.country, row.province.as_deref())
    }

    pub fn of_series_row(row: &RawSeriesRow) -> Self {
        Self::new(&row.country, Some(row.province.as_str()))
    }

    pub fn country(&self) -> &str {
        &self.country
    }

    pub fn province(&self) -> Option<&str> {
        self.province.as_deref()
    }

    /// URL-safe slug: `korea-south`, `canada--ontario`.
    pub fn id_key(&self) -> String {
        let mut out = slug(&self.country);
        if let Some(p) = &self.province {
            out.push_str("--");
            out.push_str(&slug(p));
        }
        out
    }
}

impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.province {
            Some(p) => write!(f, "{} / {}", self.country, p),
            None => f.write_str(&self.country),
        }
    }
}

fn slug(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending_dash = false;
    for ch in s.chars() {
        if ch.is_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.extend(ch.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_and_empty_province_normalize_alike() {
        assert_eq!(normalize_province(None), None);
        assert_eq!(normalize_province(Some("")), None);
        assert_eq!(
            normalize_province(Some("Ontario")),
            Some("Ontario".to_string())
        );
        assert_eq!(
            LocationKey::new("Testland", None),
            LocationKey::new("Testland", Some(""))
        );
    }

    #[test]
    fn whitespace_is_trimmed_on_both_parts() {
        assert_eq!(normalize_province(Some("   ")), None);
        assert_eq!(normalize_province(Some("\tOntario ")), Some("Ontario".to_string()));
        assert_eq!(normalize_country(" Canada\t"), "Canada");

        assert_eq!(
            LocationKey::new("Testland", Some(" ")),
            LocationKey::new("Testland", Some(""))
        );
        assert_eq!(
            LocationKey::new("Canada ", Some(" Ontario")),
            LocationKey::new("Canada", Some("Ontario"))
        );
        assert_eq!(LocationKey::new(" Canada ", Some(" Ontario ")).id_key(), "canada--ontario");
    }

    #[test]
    fn named_province_is_distinct_from_country_level() {
        assert_ne!(
            LocationKey::new("Canada", None),
            LocationKey::new("Canada", Some("Ontario"))
        );
    }

    #[test]
    fn id_key_slugs() {
        assert_eq!(LocationKey::new("Korea, South", None).id_key(), "korea-south");
        assert_eq!(
            LocationKey::new("Canada", Some("Ontario")).id_key(),
            "canada--ontario"
        );
        assert_eq!(
            LocationKey::new("US", Some("District of Columbia")).id_key(),
            "us--district-of-columbia"
        );
        assert_eq!(
            LocationKey::new("Cote d'Ivoire", None).id_key(),
            "cote-d-ivoire"
        );
        assert_eq!(LocationKey::new(" Taiwan* ", None).id_key(), "taiwan");
    }

    #[test]
    fn display_shows_province_when_present() {
        assert_eq!(LocationKey::new("Canada", Some("Ontario")).to_string(), "Canada / Ontario");
        assert_eq!(LocationKey::new("Testland", Some("")).to_string(), "Testland");
    }
}
