// # dyndns-core
//
// Core library for the dyndns public-IP synchronization daemon.
//
// ## Architecture Overview
//
// This library provides the synchronization engine:
// - **Scheduler**: Interval-driven poll loop with an explicit start/stop lifecycle
// - **Reconciler**: Decides which sync jobs are stale for the observed address
// - **ProviderRegistry**: Dispatch table from provider identifier to provider
// - **RateGuard**: Per-source token buckets for the control surface
//
// and the traits of its collaborators:
// - **IpResolver**: Looks up the public egress address
// - **DnsProvider**: Pushes an address to a dynamic-DNS provider
// - **SyncStore**: Persists observed addresses and sync jobs
// - **SettingsStore**: Concurrent-read / atomic-replace operator settings
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from implementations
// 2. **Idempotency**: A job is pushed only while its stored address differs
// 3. **Registry-Based**: Providers are looked up by identifier, no hard-coded if-else
// 4. **Library-First**: The daemon is thin wiring around this crate

pub mod config;
pub mod error;
pub mod guard;
pub mod reconciler;
pub mod registry;
pub mod scheduler;
pub mod settings;
pub mod store;
pub mod traits;

mod persist;

// Re-export core types for convenience
pub use config::{RateGuardConfig, SchedulerConfig, Settings};
pub use error::{Error, Result};
pub use guard::RateGuard;
pub use reconciler::Reconciler;
pub use registry::ProviderRegistry;
pub use scheduler::{Scheduler, SchedulerEvent, SchedulerState, TickReport};
pub use settings::{FileSettingsStore, MemorySettingsStore, SettingsOverrides};
pub use store::{FileSyncStore, MemorySyncStore};
pub use traits::{DnsProvider, IpResolver, SettingsStore, SyncStore, UpdateResult};
