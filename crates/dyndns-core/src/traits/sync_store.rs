// # Sync Store Trait
//
// Defines the persistence adapter for observed addresses and sync jobs.
//
// ## Purpose
//
// The store keeps:
// - Every distinct public address ever observed (natural key: the address text)
// - The administrator-provisioned sync jobs and, per job, the address that was
//   last applied successfully
//
// Staleness is derived from these two: a job is stale when its address
// reference is absent or differs from the current address record.
//
// ## Implementations
//
// - `MemorySyncStore`: in-memory, for tests and ephemeral deployments
// - `FileSyncStore`: JSON file with atomic writes and backup recovery

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A public address observed by the scheduler
///
/// Created the first time an address is seen and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedAddress {
    /// Unique identifier
    pub id: u64,
    /// Canonical IPv4/IPv6 literal
    pub address: String,
    /// When the address was first observed
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// An instruction to keep one provider-hosted hostname at the current address
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncJob {
    /// Unique identifier
    pub id: u64,
    /// Provider identifier (e.g. "dnsomatic")
    pub provider: String,
    /// Hostname managed by this job
    pub domain: String,
    /// Opaque provider-specific payload, decoded at dispatch time
    pub params: serde_json::Value,
    /// The last address record applied successfully
    #[serde(default)]
    pub address_id: Option<u64>,
}

impl SyncJob {
    /// Whether this job needs an update for the given address record
    pub fn is_stale_for(&self, address_id: u64) -> bool {
        self.address_id != Some(address_id)
    }
}

// params usually hold provider credentials
impl std::fmt::Debug for SyncJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncJob")
            .field("id", &self.id)
            .field("provider", &self.provider)
            .field("domain", &self.domain)
            .field("params", &"<REDACTED>")
            .field("address_id", &self.address_id)
            .finish()
    }
}

/// Provisioning input for a new sync job
#[derive(Clone, Serialize, Deserialize)]
pub struct NewSyncJob {
    /// Provider identifier
    pub provider: String,
    /// Hostname managed by the job
    pub domain: String,
    /// Provider-specific payload
    #[serde(default)]
    pub params: serde_json::Value,
}

impl NewSyncJob {
    /// Create a new provisioning request
    pub fn new(
        provider: impl Into<String>,
        domain: impl Into<String>,
        params: serde_json::Value,
    ) -> Self {
        Self {
            provider: provider.into(),
            domain: domain.into(),
            params,
        }
    }
}

impl std::fmt::Debug for NewSyncJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewSyncJob")
            .field("provider", &self.provider)
            .field("domain", &self.domain)
            .field("params", &"<REDACTED>")
            .finish()
    }
}

/// Trait for sync store implementations
///
/// All methods must be safe to call concurrently and each one is atomic on
/// its own. No transaction spans several calls.
///
/// # Trust Level: Trusted (Core Component)
///
/// ## Forbidden Capabilities
/// - ❌ Decide which jobs to update (owned by the `Reconciler`)
/// - ❌ Perform DNS updates (owned by `DnsProvider`)
/// - ❌ Spawn background tasks
#[async_trait]
pub trait SyncStore: Send + Sync {
    /// Return the record for `address`, creating it on first sight
    async fn find_or_create_address(&self, address: &str)
    -> Result<ObservedAddress, crate::Error>;

    /// Every job whose address reference is absent or differs from `address_id`
    async fn find_stale_jobs(&self, address_id: u64) -> Result<Vec<SyncJob>, crate::Error>;

    /// Record that `job_id` now points at `address_id`
    ///
    /// # Returns
    ///
    /// - `Err(Error::Persistence)`: the job does not exist or the write failed
    async fn set_job_address(&self, job_id: u64, address_id: u64) -> Result<(), crate::Error>;

    /// Provision a new job (no address reference, so it is stale immediately)
    async fn create_job(&self, job: NewSyncJob) -> Result<SyncJob, crate::Error>;

    /// List all jobs, ordered by id
    async fn list_jobs(&self) -> Result<Vec<SyncJob>, crate::Error>;

    /// List all observed addresses, ordered by id
    async fn list_addresses(&self) -> Result<Vec<ObservedAddress>, crate::Error>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<(), crate::Error>;
}
