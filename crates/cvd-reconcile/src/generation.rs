//! Generation assembly: combine → reconcile → totals → gate.
//!
//! `generated_at` is an input so identical feed payloads produce identical
//! generations.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use cvd_schemas::{derive_active, Generation, GlobalTotals, LocationSnapshot, RawSeriesRow};

use crate::combiner::{combine_metric_series, CombineReport};
use crate::gate::{check_publish_gate, PublishGate};
use crate::reconciler::{reconcile_locations, JoinReport};

/// Everything one run fetched, fully materialized.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationInputs {
    pub snapshots: Vec<LocationSnapshot>,
    pub confirmed_total: i64,
    pub recovered_total: i64,
    pub deaths_total: i64,
    pub confirmed_series: Vec<RawSeriesRow>,
    pub recovered_series: Vec<RawSeriesRow>,
    pub deaths_series: Vec<RawSeriesRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssembledGeneration {
    pub generation: Generation,
    pub combine_report: CombineReport,
    pub join_report: JoinReport,
    pub gate: PublishGate,
}

pub fn assemble_generation(
    inputs: &GenerationInputs,
    generated_at: DateTime<Utc>,
) -> AssembledGeneration {
    let combined = combine_metric_series(
        &inputs.confirmed_series,
        &inputs.recovered_series,
        &inputs.deaths_series,
    );
    let reconciliation = reconcile_locations(&inputs.snapshots, &combined.collections);

    let all_countries: Vec<String> = reconciliation
        .records
        .iter()
        .map(|r| r.country.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let totals = GlobalTotals {
        confirmed: inputs.confirmed_total,
        recovered: inputs.recovered_total,
        deaths: inputs.deaths_total,
        active: derive_active(
            inputs.confirmed_total,
            inputs.recovered_total,
            inputs.deaths_total,
        ),
        time_series_total_cases_by_date: combined.global,
        all_countries,
        timestamp: generated_at,
    };

    let gate = check_publish_gate(
        reconciliation.records.len(),
        &totals,
        &reconciliation.report,
    );

    AssembledGeneration {
        generation: Generation {
            totals,
            locations: reconciliation.records,
        },
        combine_report: combined.report,
        join_report: reconciliation.report,
        gate,
    }
}
