// # Sync Store Implementations
//
// This module provides implementations of the SyncStore trait for
// different persistence strategies. Both share the same in-memory table
// layout, `StoreData`; the file store additionally writes it to disk after
// every mutation.

pub mod file;
pub mod memory;

pub use file::FileSyncStore;
pub use memory::MemorySyncStore;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::Error;
use crate::traits::{NewSyncJob, ObservedAddress, SyncJob};

/// Address and job tables with their id sequences
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct StoreData {
    #[serde(default = "first_id")]
    next_address_id: u64,
    #[serde(default = "first_id")]
    next_job_id: u64,
    #[serde(default)]
    addresses: BTreeMap<u64, ObservedAddress>,
    #[serde(default)]
    jobs: BTreeMap<u64, SyncJob>,
}

fn first_id() -> u64 {
    1
}

impl StoreData {
    pub(crate) fn new() -> Self {
        Self {
            next_address_id: first_id(),
            next_job_id: first_id(),
            ..Self::default()
        }
    }

    /// Returns the record and whether it was created by this call
    pub(crate) fn find_or_create_address(&mut self, address: &str) -> (ObservedAddress, bool) {
        if let Some(existing) = self.addresses.values().find(|a| a.address == address) {
            return (existing.clone(), false);
        }

        let record = ObservedAddress {
            id: self.next_address_id,
            address: address.to_string(),
            created_at: chrono::Utc::now(),
        };
        self.next_address_id += 1;
        self.addresses.insert(record.id, record.clone());
        (record, true)
    }

    pub(crate) fn stale_jobs(&self, address_id: u64) -> Vec<SyncJob> {
        self.jobs
            .values()
            .filter(|job| job.is_stale_for(address_id))
            .cloned()
            .collect()
    }

    pub(crate) fn set_job_address(&mut self, job_id: u64, address_id: u64) -> Result<(), Error> {
        if !self.addresses.contains_key(&address_id) {
            return Err(Error::persistence(format!(
                "address {} does not exist",
                address_id
            )));
        }

        let job = self
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| Error::persistence(format!("job {} does not exist", job_id)))?;
        job.address_id = Some(address_id);
        Ok(())
    }

    pub(crate) fn create_job(&mut self, new_job: NewSyncJob) -> SyncJob {
        let job = SyncJob {
            id: self.next_job_id,
            provider: new_job.provider,
            domain: new_job.domain,
            params: new_job.params,
            address_id: None,
        };
        self.next_job_id += 1;
        self.jobs.insert(job.id, job.clone());
        job
    }

    pub(crate) fn jobs(&self) -> Vec<SyncJob> {
        self.jobs.values().cloned().collect()
    }

    pub(crate) fn addresses(&self) -> Vec<ObservedAddress> {
        self.addresses.values().cloned().collect()
    }

    /// Repair id sequences after loading hand-edited data
    pub(crate) fn normalize(&mut self) {
        let max_address = self.addresses.keys().next_back().copied().unwrap_or(0);
        let max_job = self.jobs.keys().next_back().copied().unwrap_or(0);
        self.next_address_id = self.next_address_id.max(max_address + 1);
        self.next_job_id = self.next_job_id.max(max_job + 1);
    }
}
