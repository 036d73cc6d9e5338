// # File Sync Store
//
// File-based implementation of SyncStore with crash recovery.
//
// ## Purpose
//
// Keeps provisioned jobs and the address each one last applied across
// restarts, so a restart with an unchanged public address causes no
// provider traffic.
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "next_address_id": 2,
//   "next_job_id": 2,
//   "addresses": {
//     "1": { "id": 1, "address": "203.0.113.7", "created_at": "2025-01-09T12:00:00Z" }
//   },
//   "jobs": {
//     "1": {
//       "id": 1,
//       "provider": "dnsomatic",
//       "domain": "a.example.com",
//       "params": { "host": "a.example.com", "user": "u", "pass": "p" },
//       "address_id": 1
//     }
//   }
// }
// ```
//
// Jobs may be provisioned by editing this file while the daemon is stopped.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use super::StoreData;
use crate::Error;
use crate::persist;
use crate::traits::{NewSyncJob, ObservedAddress, SyncJob, SyncStore};

/// Store file format version
/// Used for future migration if format changes
const STORE_FILE_VERSION: &str = "1.0";

/// Serializable store file format
#[derive(Debug, Serialize, Deserialize)]
struct StoreFileFormat {
    version: String,
    #[serde(flatten)]
    data: StoreData,
}

/// File-based sync store with crash recovery
///
/// Every mutation is written to disk before the call returns. The write
/// lock is held across the write so that concurrent mutations reach the
/// file in the same order they were applied in memory.
///
/// # Example
///
/// ```rust,no_run
/// use dyndns_core::store::FileSyncStore;
/// use dyndns_core::traits::SyncStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileSyncStore::new("/var/lib/dyndns/store.json").await?;
///     let address = store.find_or_create_address("203.0.113.7").await?;
///     for job in store.find_stale_jobs(address.id).await? {
///         println!("{} needs an update", job.domain);
///     }
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileSyncStore {
    path: PathBuf,
    data: RwLock<StoreData>,
}

impl FileSyncStore {
    /// Create or load a file sync store
    ///
    /// This will:
    /// 1. Create parent directories if needed
    /// 2. Try to load the existing file
    /// 3. If corruption is detected, try to load from the backup
    /// 4. If both fail, start with empty tables
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        persist::ensure_parent_dir(&path).await?;

        let data = match persist::load_with_recovery::<StoreFileFormat>(&path).await? {
            Some(file) => {
                if file.version != STORE_FILE_VERSION {
                    tracing::warn!(
                        "Store file version mismatch: expected {}, got {}. \
                        Attempting to load anyway.",
                        STORE_FILE_VERSION,
                        file.version
                    );
                }
                let mut data = file.data;
                data.normalize();
                tracing::debug!(
                    "Loaded store from {}: {} job(s), {} address(es)",
                    path.display(),
                    data.jobs().len(),
                    data.addresses().len()
                );
                data
            }
            None => StoreData::new(),
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write(&self, data: &StoreData) -> Result<(), Error> {
        let file = StoreFileFormat {
            version: STORE_FILE_VERSION.to_string(),
            data: data.clone(),
        };
        persist::write_atomic(&self.path, &file).await
    }
}

#[async_trait]
impl SyncStore for FileSyncStore {
    async fn find_or_create_address(&self, address: &str) -> Result<ObservedAddress, Error> {
        let mut guard = self.data.write().await;
        let mut updated = guard.clone();
        let (record, created) = updated.find_or_create_address(address);
        if created {
            // Only publish the new record once it is on disk
            self.write(&updated).await?;
            *guard = updated;
        }
        Ok(record)
    }

    async fn find_stale_jobs(&self, address_id: u64) -> Result<Vec<SyncJob>, Error> {
        let guard = self.data.read().await;
        Ok(guard.stale_jobs(address_id))
    }

    async fn set_job_address(&self, job_id: u64, address_id: u64) -> Result<(), Error> {
        let mut guard = self.data.write().await;
        let mut updated = guard.clone();
        updated.set_job_address(job_id, address_id)?;
        self.write(&updated).await?;
        *guard = updated;
        Ok(())
    }

    async fn create_job(&self, job: NewSyncJob) -> Result<SyncJob, Error> {
        let mut guard = self.data.write().await;
        let mut updated = guard.clone();
        let created = updated.create_job(job);
        self.write(&updated).await?;
        *guard = updated;
        Ok(created)
    }

    async fn list_jobs(&self) -> Result<Vec<SyncJob>, Error> {
        let guard = self.data.read().await;
        Ok(guard.jobs())
    }

    async fn list_addresses(&self) -> Result<Vec<ObservedAddress>, Error> {
        let guard = self.data.read().await;
        Ok(guard.addresses())
    }

    async fn flush(&self) -> Result<(), Error> {
        let guard = self.data.read().await;
        self.write(&guard).await
    }
}
