// # Memory Sync Store
//
// In-memory implementation of SyncStore.
//
// ## Crash Behavior
//
// - All jobs and observed addresses are lost on restart
// - Jobs must be provisioned again after every start
//
// ## When to Use
//
// - Testing environments
// - Short-lived deployments that provision jobs through the control API

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::StoreData;
use crate::Error;
use crate::traits::{NewSyncJob, ObservedAddress, SyncJob, SyncStore};

/// In-memory sync store implementation
///
/// # Example
///
/// ```rust,no_run
/// use dyndns_core::store::MemorySyncStore;
/// use dyndns_core::traits::{NewSyncJob, SyncStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemorySyncStore::new();
///     store
///         .create_job(NewSyncJob::new("dnsomatic", "a.example.com", serde_json::json!({})))
///         .await?;
///
///     let address = store.find_or_create_address("203.0.113.7").await?;
///     assert_eq!(store.find_stale_jobs(address.id).await?.len(), 1);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct MemorySyncStore {
    inner: Arc<RwLock<StoreData>>,
}

impl MemorySyncStore {
    /// Create a new empty memory store
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(StoreData::new())),
        }
    }

    /// Number of provisioned jobs
    pub async fn job_count(&self) -> usize {
        self.inner.read().await.jobs().len()
    }

    /// Look up a single job
    pub async fn job(&self, job_id: u64) -> Option<SyncJob> {
        self.inner
            .read()
            .await
            .jobs()
            .into_iter()
            .find(|job| job.id == job_id)
    }
}

impl Default for MemorySyncStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SyncStore for MemorySyncStore {
    async fn find_or_create_address(&self, address: &str) -> Result<ObservedAddress, Error> {
        let mut guard = self.inner.write().await;
        let (record, _) = guard.find_or_create_address(address);
        Ok(record)
    }

    async fn find_stale_jobs(&self, address_id: u64) -> Result<Vec<SyncJob>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.stale_jobs(address_id))
    }

    async fn set_job_address(&self, job_id: u64, address_id: u64) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.set_job_address(job_id, address_id)
    }

    async fn create_job(&self, job: NewSyncJob) -> Result<SyncJob, Error> {
        let mut guard = self.inner.write().await;
        Ok(guard.create_job(job))
    }

    async fn list_jobs(&self) -> Result<Vec<SyncJob>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.jobs())
    }

    async fn list_addresses(&self) -> Result<Vec<ObservedAddress>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.addresses())
    }

    async fn flush(&self) -> Result<(), Error> {
        // No-op for memory store (everything is already "persisted")
        Ok(())
    }
}
