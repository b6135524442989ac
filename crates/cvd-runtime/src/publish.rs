//! PublishCoordinator: gate, then one transaction that replaces totals and
//! locations together.
//!
//! Any failure after `begin_publish` rolls the transaction back and is
//! returned as `RunError::Transaction`. There is no retry; the next
//! scheduled run is the recovery path.

use std::sync::Arc;

use anyhow::Result;
use cvd_db::{GenerationStore, PublishTxn};
use cvd_reconcile::{AssembledGeneration, PublishGate};
use cvd_schemas::Generation;
use tracing::{error, info, warn};

use crate::outcome::{PublishSummary, RunError, RunOutcome};

#[derive(Clone)]
pub struct PublishCoordinator {
    store: Arc<dyn GenerationStore>,
}

impl PublishCoordinator {
    pub fn new(store: Arc<dyn GenerationStore>) -> Self {
        Self { store }
    }

    pub async fn publish(&self, assembled: &AssembledGeneration) -> Result<RunOutcome, RunError> {
        if let PublishGate::Blocked { reasons } = &assembled.gate {
            let joined: Vec<String> = reasons.iter().map(ToString::to_string).collect();
            warn!(
                reasons = %joined.join("; "),
                records = assembled.generation.locations.len(),
                "publish gate rejected generation; prior generation kept"
            );
            return Ok(RunOutcome::Rejected {
                reasons: reasons.clone(),
            });
        }

        let mut txn = self
            .store
            .begin_publish()
            .await
            .map_err(RunError::Transaction)?;

        match write_generation(txn.as_mut(), &assembled.generation).await {
            Ok(written) => {
                txn.commit().await.map_err(|e| {
                    error!(error = %format!("{e:#}"), "publish commit failed");
                    RunError::Transaction(e)
                })?;
                let summary = PublishSummary {
                    locations_written: written,
                    generated_at: assembled.generation.totals.timestamp,
                };
                info!(
                    store = self.store.name(),
                    locations = written,
                    generated_at = %summary.generated_at,
                    "generation published"
                );
                Ok(RunOutcome::Published(summary))
            }
            Err(e) => {
                error!(error = %format!("{e:#}"), "publish failed; rolling back");
                if let Err(rb) = txn.rollback().await {
                    warn!(error = %format!("{rb:#}"), "rollback failed");
                }
                Err(RunError::Transaction(e))
            }
        }
    }
}

async fn write_generation(txn: &mut dyn PublishTxn, generation: &Generation) -> Result<u64> {
    txn.replace_totals(&generation.totals).await?;
    txn.replace_locations(&generation.locations).await
}
