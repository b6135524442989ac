//! cvd-reconcile
//!
//! Reconciliation core:
//! - three cumulative metric streams merge into per-day records with deltas
//! - snapshot rows join to series by normalized (country, province)
//! - `null`, `""` and whitespace-only provinces are the same key
//! - a generation publishes only through a clean gate
//!
//! Deterministic, pure logic. No IO. No clock.

mod combiner;
mod gate;
mod generation;
mod location;
mod reconciler;

pub use combiner::{combine_metric_series, CombineReport, CombinedSeries, TimeSeriesCollection};
pub use gate::{check_publish_gate, GateReason, PublishGate};
pub use generation::{assemble_generation, AssembledGeneration, GenerationInputs};
pub use location::{normalize_country, normalize_province, LocationKey};
pub use reconciler::{
    reconcile_locations, DuplicateKey, IdKeyCollision, JoinReport, Reconciliation,
};
