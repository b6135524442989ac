//! Interval scheduler and run records.
//!
//! Runs never overlap within a process: the loop awaits each run before the
//! next tick is considered. A tick that fires while a run is still going is
//! skipped, not queued.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cvd_reconcile::GateReason;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};
use uuid::Uuid;

use crate::outcome::RunOutcome;
use crate::pipeline::Pipeline;

/// What one run did, as broadcast to listeners and served by `/v1/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub result: RunResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunResult {
    Published {
        locations_written: u64,
        generated_at: DateTime<Utc>,
    },
    Rejected {
        reasons: Vec<GateReason>,
    },
    Failed {
        stage: String,
        error: String,
    },
}

impl RunResult {
    pub fn is_published(&self) -> bool {
        matches!(self, RunResult::Published { .. })
    }
}

impl Pipeline {
    /// Run once stamped with the current time and fold the result into a
    /// [`RunRecord`]. Errors are already logged by the run itself.
    pub async fn run_recorded(&self) -> RunRecord {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let result = match self.run_with_id(run_id, started_at).await {
            Ok(RunOutcome::Published(summary)) => RunResult::Published {
                locations_written: summary.locations_written,
                generated_at: summary.generated_at,
            },
            Ok(RunOutcome::Rejected { reasons }) => RunResult::Rejected { reasons },
            Err(e) => RunResult::Failed {
                stage: e.stage().to_string(),
                error: e.to_string(),
            },
        };
        RunRecord {
            run_id,
            started_at,
            finished_at: Utc::now(),
            result,
        }
    }
}

/// Run immediately, then once per `interval`, until `shutdown` flips to
/// `true` or its sender is dropped.
pub async fn run_on_interval(
    pipeline: Arc<Pipeline>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
    events: broadcast::Sender<RunRecord>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(interval_secs = interval.as_secs(), "scheduler started");
    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            _ = ticker.tick() => {
                let record = pipeline.run_recorded().await;
                // No receivers is fine.
                if events.send(record).is_err() {
                    debug!("no run event listeners");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    info!("scheduler stopped");
}
