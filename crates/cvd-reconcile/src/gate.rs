//! Publish gate.
//!
//! A generation may be written only if [`PublishGate::Permitted`] is
//! returned. The check catches gross failures: an empty snapshot, a zero or
//! negative global total, a join with duplicate keys, or two locations that
//! would share one `id_key`. It cannot detect a
//! genuine decrease in a metric.
//!
//! Pure deterministic: no IO, no clock.

use std::fmt;

use cvd_schemas::{GlobalTotals, Metric};
use serde::{Deserialize, Serialize};

use crate::reconciler::JoinReport;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum GateReason {
    /// Zero reconciled records.
    NoLocations,
    /// A global total is `<= 0`.
    NonPositiveTotal(Metric),
    /// Distinct series keys that appeared more than once.
    DuplicateSeriesKeys(usize),
    /// Distinct snapshot keys that appeared more than once.
    DuplicateSnapshotKeys(usize),
    /// `id_key` values shared by more than one distinct location.
    IdKeyCollisions(usize),
}

impl fmt::Display for GateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateReason::NoLocations => f.write_str("no reconciled locations"),
            GateReason::NonPositiveTotal(m) => write!(f, "global {m} total is not positive"),
            GateReason::DuplicateSeriesKeys(n) => {
                write!(f, "{n} location key(s) repeated in the time series")
            }
            GateReason::DuplicateSnapshotKeys(n) => {
                write!(f, "{n} location key(s) repeated in the snapshot")
            }
            GateReason::IdKeyCollisions(n) => {
                write!(f, "{n} id key(s) shared by distinct locations")
            }
        }
    }
}

impl std::error::Error for GateReason {}

/// Result of the publish gate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PublishGate {
    Permitted,
    /// Nothing may be written. `reasons` is never empty.
    Blocked { reasons: Vec<GateReason> },
}

impl PublishGate {
    pub fn is_permitted(&self) -> bool {
        matches!(self, PublishGate::Permitted)
    }

    pub fn is_blocked(&self) -> bool {
        !self.is_permitted()
    }

    pub fn reasons(&self) -> &[GateReason] {
        match self {
            PublishGate::Permitted => &[],
            PublishGate::Blocked { reasons } => reasons,
        }
    }
}

pub fn check_publish_gate(
    record_count: usize,
    totals: &GlobalTotals,
    join: &JoinReport,
) -> PublishGate {
    let mut reasons = Vec::new();

    if record_count == 0 {
        reasons.push(GateReason::NoLocations);
    }
    for metric in Metric::ALL {
        let value = match metric {
            Metric::Confirmed => totals.confirmed,
            Metric::Recovered => totals.recovered,
            Metric::Deaths => totals.deaths,
        };
        if value <= 0 {
            reasons.push(GateReason::NonPositiveTotal(metric));
        }
    }
    if !join.duplicate_series_keys.is_empty() {
        reasons.push(GateReason::DuplicateSeriesKeys(join.duplicate_series_keys.len()));
    }
    if !join.duplicate_snapshot_keys.is_empty() {
        reasons.push(GateReason::DuplicateSnapshotKeys(join.duplicate_snapshot_keys.len()));
    }
    if !join.id_key_collisions.is_empty() {
        reasons.push(GateReason::IdKeyCollisions(join.id_key_collisions.len()));
    }

    if reasons.is_empty() {
        PublishGate::Permitted
    } else {
        PublishGate::Blocked { reasons }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::LocationKey;
    use crate::reconciler::{DuplicateKey, IdKeyCollision};
    use chrono::{TimeZone, Utc};

    fn totals(c: i64, r: i64, d: i64) -> GlobalTotals {
        GlobalTotals {
            confirmed: c,
            recovered: r,
            deaths: d,
            active: c - (r + d),
            time_series_total_cases_by_date: vec![],
            all_countries: vec![],
            timestamp: Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn permitted_when_all_conditions_hold() {
        let g = check_publish_gate(1, &totals(100, 50, 5), &JoinReport::default());
        assert!(g.is_permitted());
        assert!(g.reasons().is_empty());
    }

    #[test]
    fn blocked_on_empty_locations() {
        let g = check_publish_gate(0, &totals(100, 50, 5), &JoinReport::default());
        assert_eq!(
            g,
            PublishGate::Blocked {
                reasons: vec![GateReason::NoLocations]
            }
        );
    }

    #[test]
    fn every_zero_total_is_named() {
        let g = check_publish_gate(3, &totals(10, 0, -1), &JoinReport::default());
        assert!(g.is_blocked());
        assert_eq!(
            g.reasons(),
            &[
                GateReason::NonPositiveTotal(Metric::Recovered),
                GateReason::NonPositiveTotal(Metric::Deaths),
            ]
        );
    }

    #[test]
    fn duplicate_keys_block() {
        let join = JoinReport {
            duplicate_series_keys: vec![DuplicateKey {
                key: LocationKey::new("A", None),
                count: 2,
            }],
            ..JoinReport::default()
        };
        let g = check_publish_gate(1, &totals(1, 1, 1), &join);
        assert_eq!(g.reasons(), &[GateReason::DuplicateSeriesKeys(1)]);
    }

    #[test]
    fn id_key_collision_blocks() {
        let join = JoinReport {
            id_key_collisions: vec![IdKeyCollision {
                id_key: "korea-south".to_string(),
                keys: vec![
                    LocationKey::new("Korea South", None),
                    LocationKey::new("Korea, South", None),
                ],
            }],
            ..JoinReport::default()
        };
        let g = check_publish_gate(2, &totals(1, 1, 1), &join);
        assert_eq!(g.reasons(), &[GateReason::IdKeyCollisions(1)]);
        assert_eq!(
            g.reasons()[0].to_string(),
            "1 id key(s) shared by distinct locations"
        );
    }

    #[test]
    fn reason_display_and_wire_shape() {
        let r = GateReason::NonPositiveTotal(Metric::Deaths);
        assert_eq!(r.to_string(), "global deaths total is not positive");
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["reason"], "non_positive_total");
        assert_eq!(v["detail"], "deaths");
    }
}
