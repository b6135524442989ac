//! Store seam between the publish coordinator / read layer and the backing
//! database.
//!
//! A publish is one [`PublishTxn`]: nothing written through it is visible to
//! [`GenerationStore::load_generation`] until `commit` returns `Ok`. Dropping
//! or rolling back the txn leaves the previous generation authoritative.

use anyhow::Result;
use async_trait::async_trait;
use cvd_schemas::{Generation, GlobalTotals, ReconciledLocationRecord};

#[async_trait]
pub trait GenerationStore: Send + Sync {
    /// Short name used in logs (`"postgres"`, `"memory"`).
    fn name(&self) -> &'static str;

    /// Open a publish transaction. Concurrent publishers are serialized:
    /// a second caller waits until the first txn commits or rolls back.
    async fn begin_publish(&self) -> Result<Box<dyn PublishTxn>>;

    /// The currently published generation, read consistently.
    /// `None` before the first successful publish.
    async fn load_generation(&self) -> Result<Option<Generation>>;
}

#[async_trait]
pub trait PublishTxn: Send {
    /// Clear and re-insert the singleton totals document.
    async fn replace_totals(&mut self, totals: &GlobalTotals) -> Result<()>;

    /// Clear and re-insert every location record. Returns rows written.
    async fn replace_locations(&mut self, records: &[ReconciledLocationRecord]) -> Result<u64>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}
