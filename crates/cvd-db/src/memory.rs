//! In-memory [`GenerationStore`] for tests (feature `testkit`).
//!
//! Same contract as the Postgres store: writes are staged on the txn and
//! swapped in together at `commit`; a publish lock serializes publishers.
//! A [`FailPoint`] makes one step of the next publish return an error after
//! the earlier steps have already succeeded.

use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use cvd_schemas::{Generation, GlobalTotals, ReconciledLocationRecord};
use tokio::sync::OwnedMutexGuard;

use crate::store::{GenerationStore, PublishTxn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    ReplaceTotals,
    ReplaceLocations,
    Commit,
}

#[derive(Debug, Default)]
struct Committed {
    totals: Option<GlobalTotals>,
    locations: Vec<ReconciledLocationRecord>,
    commits: u64,
    rollbacks: u64,
    fail_point: Option<FailPoint>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<Committed>>,
    publish_lock: Arc<tokio::sync::Mutex<()>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store already holding `generation`, as if published earlier.
    pub fn with_generation(generation: Generation) -> Self {
        let store = Self::new();
        if let Ok(mut st) = store.state.lock() {
            st.totals = Some(generation.totals);
            st.locations = generation.locations;
        }
        store
    }

    /// Arm (or clear) the fail point. It stays armed until cleared.
    pub fn set_fail_point(&self, point: Option<FailPoint>) {
        if let Ok(mut st) = self.state.lock() {
            st.fail_point = point;
        }
    }

    /// Committed generation, read synchronously.
    pub fn snapshot(&self) -> Option<Generation> {
        let st = self.state.lock().ok()?;
        st.totals.as_ref().map(|totals| Generation {
            totals: totals.clone(),
            locations: st.locations.clone(),
        })
    }

    pub fn commits(&self) -> u64 {
        self.state.lock().map(|st| st.commits).unwrap_or(0)
    }

    pub fn rollbacks(&self) -> u64 {
        self.state.lock().map(|st| st.rollbacks).unwrap_or(0)
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, Committed>> {
        lock(&self.state)
    }
}

fn lock(state: &Mutex<Committed>) -> Result<MutexGuard<'_, Committed>> {
    state
        .lock()
        .map_err(|_| anyhow!("memory store state poisoned"))
}

#[async_trait]
impl GenerationStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn begin_publish(&self) -> Result<Box<dyn PublishTxn>> {
        let guard = self.publish_lock.clone().lock_owned().await;
        let fail_point = self.lock_state()?.fail_point;
        Ok(Box::new(MemoryPublishTxn {
            state: self.state.clone(),
            fail_point,
            staged_totals: None,
            staged_locations: None,
            _guard: guard,
        }))
    }

    async fn load_generation(&self) -> Result<Option<Generation>> {
        let st = self.lock_state()?;
        Ok(st.totals.as_ref().map(|totals| Generation {
            totals: totals.clone(),
            locations: st.locations.clone(),
        }))
    }
}

struct MemoryPublishTxn {
    state: Arc<Mutex<Committed>>,
    fail_point: Option<FailPoint>,
    staged_totals: Option<GlobalTotals>,
    staged_locations: Option<Vec<ReconciledLocationRecord>>,
    _guard: OwnedMutexGuard<()>,
}

impl MemoryPublishTxn {
    fn check(&self, point: FailPoint) -> Result<()> {
        if self.fail_point == Some(point) {
            bail!("injected failure at {point:?}");
        }
        Ok(())
    }
}

#[async_trait]
impl PublishTxn for MemoryPublishTxn {
    async fn replace_totals(&mut self, totals: &GlobalTotals) -> Result<()> {
        self.check(FailPoint::ReplaceTotals)?;
        self.staged_totals = Some(totals.clone());
        Ok(())
    }

    async fn replace_locations(&mut self, records: &[ReconciledLocationRecord]) -> Result<u64> {
        self.check(FailPoint::ReplaceLocations)?;
        self.staged_locations = Some(records.to_vec());
        Ok(records.len() as u64)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.check(FailPoint::Commit)?;
        let MemoryPublishTxn {
            state,
            staged_totals,
            staged_locations,
            _guard,
            ..
        } = *self;

        let mut st = lock(&state)?;
        if let Some(t) = staged_totals {
            st.totals = Some(t);
        }
        if let Some(l) = staged_locations {
            st.locations = l;
        }
        st.commits += 1;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        let mut st = lock(&self.state)?;
        st.rollbacks += 1;
        Ok(())
    }
}
