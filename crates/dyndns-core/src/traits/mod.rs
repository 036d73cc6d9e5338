//! Core traits for the dyndns system
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`IpResolver`]: Look up the public egress address
//! - [`DnsProvider`]: Push an address to a dynamic-DNS provider
//! - [`SyncStore`]: Persist observed addresses and sync jobs
//! - [`SettingsStore`]: Concurrent-read, atomic-replace operator settings

pub mod dns_provider;
pub mod ip_resolver;
pub mod settings_store;
pub mod sync_store;

pub use dns_provider::{DnsProvider, UpdateResult};
pub use ip_resolver::IpResolver;
pub use settings_store::SettingsStore;
pub use sync_store::{NewSyncJob, ObservedAddress, SyncJob, SyncStore};
