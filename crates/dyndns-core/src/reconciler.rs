//! Change detection
//!
//! The reconciler answers one question for the scheduler: given the address
//! record observed on this tick, which jobs still point somewhere else?

use std::sync::Arc;

use crate::error::Result;
use crate::traits::{SyncJob, SyncStore};

/// Computes the stale-job set for an observed address
///
/// Read-only: it never mutates the store and never touches the network.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn SyncStore>,
}

impl Reconciler {
    /// Create a reconciler reading from `store`
    pub fn new(store: Arc<dyn SyncStore>) -> Self {
        Self { store }
    }

    /// Every job whose last-applied address is absent or differs from `address_id`, ordered by id
    pub async fn stale_jobs(&self, address_id: u64) -> Result<Vec<SyncJob>> {
        let mut jobs = self.store.find_stale_jobs(address_id).await?;
        jobs.sort_by_key(|job| job.id);
        Ok(jobs)
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler").finish_non_exhaustive()
    }
}
