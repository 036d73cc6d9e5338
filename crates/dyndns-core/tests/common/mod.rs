//! Test doubles and common utilities for contract tests
//!
//! The doubles record how they were called so tests can assert on what the
//! scheduler did, not only on what it returned.

#![allow(dead_code)]

use dyndns_core::config::{SchedulerConfig, Settings};
use dyndns_core::error::{Error, Result};
use dyndns_core::registry::ProviderRegistry;
use dyndns_core::scheduler::{Scheduler, SchedulerEvent};
use dyndns_core::settings::MemorySettingsStore;
use dyndns_core::store::MemorySyncStore;
use dyndns_core::traits::{
    DnsProvider, IpResolver, NewSyncJob, ObservedAddress, SettingsStore, SyncJob, SyncStore,
    UpdateResult,
};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{mpsc, watch};

/// An IpResolver whose answer the test controls
pub struct MockResolver {
    address: std::sync::Mutex<String>,
    failing: AtomicBool,
    /// Call counter for resolve()
    resolve_call_count: AtomicUsize,
    /// Last custom endpoint passed to resolve()
    last_endpoint: std::sync::Mutex<Option<String>>,
}

impl MockResolver {
    pub fn new(address: &str) -> Self {
        Self {
            address: std::sync::Mutex::new(address.to_string()),
            failing: AtomicBool::new(false),
            resolve_call_count: AtomicUsize::new(0),
            last_endpoint: std::sync::Mutex::new(None),
        }
    }

    /// Change the address returned from the next call on
    pub fn set_address(&self, address: &str) {
        *self.address.lock().unwrap() = address.to_string();
    }

    /// Make every call fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Get the number of times resolve() was called
    pub fn resolve_call_count(&self) -> usize {
        self.resolve_call_count.load(Ordering::SeqCst)
    }

    pub fn last_endpoint(&self) -> Option<String> {
        self.last_endpoint.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl IpResolver for MockResolver {
    async fn resolve(&self, custom_endpoint: Option<&str>) -> Result<String> {
        self.resolve_call_count.fetch_add(1, Ordering::SeqCst);
        *self.last_endpoint.lock().unwrap() = custom_endpoint.map(str::to_string);

        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::resolver("lookup service unreachable"));
        }
        Ok(self.address.lock().unwrap().clone())
    }
}

/// Parameter shape of [`MockDnsProvider`]
#[derive(Debug, Deserialize)]
pub struct MockParams {
    pub host: String,
}

/// A mock DnsProvider that tracks calls
pub struct MockDnsProvider {
    /// Call counter for update()
    update_call_count: Arc<AtomicUsize>,
    /// Hosts passed to update(), in call order
    updated_hosts: Arc<std::sync::Mutex<Vec<String>>>,
    /// Hosts for which update() fails
    failing_hosts: Arc<std::sync::Mutex<HashSet<String>>>,
    /// Provider name
    pub name: &'static str,
}

impl MockDnsProvider {
    pub fn new(name: &'static str) -> Self {
        Self {
            update_call_count: Arc::new(AtomicUsize::new(0)),
            updated_hosts: Arc::new(std::sync::Mutex::new(Vec::new())),
            failing_hosts: Arc::new(std::sync::Mutex::new(HashSet::new())),
            name,
        }
    }

    /// Create a new MockDnsProvider that shares counters with an existing one
    ///
    /// The registry takes providers by value; the test keeps the original.
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            update_call_count: Arc::clone(&other.update_call_count),
            updated_hosts: Arc::clone(&other.updated_hosts),
            failing_hosts: Arc::clone(&other.failing_hosts),
            name: other.name,
        }
    }

    /// Make update() fail for `host`
    pub fn fail_host(&self, host: &str) {
        self.failing_hosts.lock().unwrap().insert(host.to_string());
    }

    /// Make update() succeed for `host` again
    pub fn heal_host(&self, host: &str) {
        self.failing_hosts.lock().unwrap().remove(host);
    }

    /// Get the number of times update() was called
    pub fn update_call_count(&self) -> usize {
        self.update_call_count.load(Ordering::SeqCst)
    }

    /// Get the hosts that update() was called for
    pub fn updated_hosts(&self) -> Vec<String> {
        self.updated_hosts.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl DnsProvider for MockDnsProvider {
    type Params = MockParams;

    async fn update(&self, params: MockParams, address: &str) -> Result<UpdateResult> {
        self.update_call_count.fetch_add(1, Ordering::SeqCst);
        self.updated_hosts.lock().unwrap().push(params.host.clone());

        if self.failing_hosts.lock().unwrap().contains(&params.host) {
            return Err(Error::provider(self.name, "badauth"));
        }

        Ok(UpdateResult::Updated {
            address: address.to_string(),
        })
    }

    fn provider_name(&self) -> &'static str {
        self.name
    }
}

/// Provisioning request for a mock-provider job
pub fn mock_job(provider: &str, host: &str) -> NewSyncJob {
    NewSyncJob::new(provider, host, serde_json::json!({ "host": host }))
}

/// A SettingsStore that accepts any value, standing in for a hand-edited file
pub struct UncheckedSettingsStore {
    tx: watch::Sender<Settings>,
}

impl UncheckedSettingsStore {
    pub fn new(settings: Settings) -> Self {
        let (tx, _rx) = watch::channel(settings);
        Self { tx }
    }
}

#[async_trait::async_trait]
impl SettingsStore for UncheckedSettingsStore {
    fn get(&self) -> Settings {
        self.tx.borrow().clone()
    }

    async fn replace(&self, settings: Settings) -> Result<()> {
        self.tx.send_replace(settings);
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<Settings> {
        self.tx.subscribe()
    }
}

/// A MemorySyncStore whose writes can be made to fail
pub struct FlakySyncStore {
    inner: MemorySyncStore,
    fail_address_lookups: AtomicBool,
    failing_job_writes: std::sync::Mutex<HashSet<u64>>,
    /// Call counter for set_job_address()
    set_address_call_count: AtomicUsize,
}

impl FlakySyncStore {
    pub fn new() -> Self {
        Self {
            inner: MemorySyncStore::new(),
            fail_address_lookups: AtomicBool::new(false),
            failing_job_writes: std::sync::Mutex::new(HashSet::new()),
            set_address_call_count: AtomicUsize::new(0),
        }
    }

    /// Make find_or_create_address() fail (or succeed again)
    pub fn set_failing_address_lookups(&self, failing: bool) {
        self.fail_address_lookups.store(failing, Ordering::SeqCst);
    }

    /// Make set_job_address() fail for `job_id`
    pub fn fail_job_writes(&self, job_id: u64) {
        self.failing_job_writes.lock().unwrap().insert(job_id);
    }

    pub fn set_address_call_count(&self) -> usize {
        self.set_address_call_count.load(Ordering::SeqCst)
    }

    pub async fn job(&self, job_id: u64) -> Option<SyncJob> {
        self.inner.job(job_id).await
    }
}

#[async_trait::async_trait]
impl SyncStore for FlakySyncStore {
    async fn find_or_create_address(&self, address: &str) -> Result<ObservedAddress> {
        if self.fail_address_lookups.load(Ordering::SeqCst) {
            return Err(Error::persistence("database is locked"));
        }
        self.inner.find_or_create_address(address).await
    }

    async fn find_stale_jobs(&self, address_id: u64) -> Result<Vec<SyncJob>> {
        self.inner.find_stale_jobs(address_id).await
    }

    async fn set_job_address(&self, job_id: u64, address_id: u64) -> Result<()> {
        self.set_address_call_count.fetch_add(1, Ordering::SeqCst);
        if self.failing_job_writes.lock().unwrap().contains(&job_id) {
            return Err(Error::persistence("disk full"));
        }
        self.inner.set_job_address(job_id, address_id).await
    }

    async fn create_job(&self, job: NewSyncJob) -> Result<SyncJob> {
        self.inner.create_job(job).await
    }

    async fn list_jobs(&self) -> Result<Vec<SyncJob>> {
        self.inner.list_jobs().await
    }

    async fn list_addresses(&self) -> Result<Vec<ObservedAddress>> {
        self.inner.list_addresses().await
    }

    async fn flush(&self) -> Result<()> {
        self.inner.flush().await
    }
}

/// Everything a scheduler test needs to drive and observe one scheduler
pub struct Harness {
    pub scheduler: Scheduler,
    pub events: mpsc::Receiver<SchedulerEvent>,
    pub settings: Arc<dyn SettingsStore>,
    pub resolver: Arc<MockResolver>,
    pub store: Arc<FlakySyncStore>,
    pub provider: MockDnsProvider,
}

impl Harness {
    /// Scheduler with one registered "mock" provider and no jobs
    pub fn new(settings: Settings, address: &str) -> Self {
        Self::with_settings_store(Arc::new(MemorySettingsStore::new(settings)), address)
    }

    /// Same as [`Harness::new`], reading settings from `settings`
    pub fn with_settings_store(settings: Arc<dyn SettingsStore>, address: &str) -> Self {
        let resolver = Arc::new(MockResolver::new(address));
        let store = Arc::new(FlakySyncStore::new());
        let provider = MockDnsProvider::new("mock");

        let mut registry = ProviderRegistry::new();
        registry.register_provider(MockDnsProvider::sharing_counters_with(&provider));

        let (scheduler, events) = Scheduler::new(
            settings.clone(),
            resolver.clone(),
            store.clone(),
            Arc::new(registry),
            SchedulerConfig::default(),
        );

        Self {
            scheduler,
            events,
            settings,
            resolver,
            store,
            provider,
        }
    }

    /// Drain every event emitted so far
    pub fn drain_events(&mut self) -> Vec<SchedulerEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            drained.push(event);
        }
        drained
    }
}
