//! Run outcome taxonomy.
//!
//! | Failure class       | Value                       | Store after the run |
//! |---------------------|-----------------------------|---------------------|
//! | FetchFailure        | `Err(RunError::Fetch)`      | untouched           |
//! | ValidationFailure   | `Ok(RunOutcome::Rejected)`  | untouched           |
//! | TransactionFailure  | `Err(RunError::Transaction)`| prior generation    |
//!
//! A rejected run is a skipped write, not an error.

use std::fmt;

use chrono::{DateTime, Utc};
use cvd_feeds::FeedError;
use cvd_reconcile::GateReason;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishSummary {
    pub locations_written: u64,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Published(PublishSummary),
    Rejected { reasons: Vec<GateReason> },
}

impl RunOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, RunOutcome::Published(_))
    }
}

#[derive(Debug)]
pub enum RunError {
    /// A feed call failed or returned malformed data. Nothing was written.
    Fetch(FeedError),
    /// The store aborted mid-publish. The transaction was rolled back.
    Transaction(anyhow::Error),
}

impl RunError {
    /// Short stage label for logs and run records.
    pub fn stage(&self) -> &'static str {
        match self {
            RunError::Fetch(_) => "fetch",
            RunError::Transaction(_) => "transaction",
        }
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::Fetch(e) => write!(f, "fetch failed: {e}"),
            RunError::Transaction(e) => write!(f, "publish transaction failed: {e:#}"),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RunError::Fetch(e) => Some(e),
            RunError::Transaction(e) => Some(&**e),
        }
    }
}

impl From<FeedError> for RunError {
    fn from(e: FeedError) -> Self {
        RunError::Fetch(e)
    }
}
