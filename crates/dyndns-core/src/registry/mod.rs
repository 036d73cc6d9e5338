//! Provider dispatch table
//!
//! The registry maps a provider identifier (the `provider` field of a
//! [`SyncJob`](crate::traits::SyncJob)) to a provider capability, avoiding
//! hardcoded if-else chains in the scheduler.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dyndns_core::registry::ProviderRegistry;
//!
//! let mut registry = ProviderRegistry::new();
//! dyndns_provider_dnsomatic::register(&mut registry)?;
//!
//! let outcome = registry.dispatch("dnsomatic", &job.params, "203.0.113.7").await?;
//! ```
//!
//! ## Registration
//!
//! The table is assembled once while wiring the process and is read-only
//! afterwards. Provider crates expose a `register()` function:
//!
//! ```rust,ignore
//! pub fn register(registry: &mut ProviderRegistry) -> Result<()> {
//!     registry.register_provider(DnsOMaticProvider::new()?);
//!     Ok(())
//! }
//! ```
//!
//! ## Type Erasure
//!
//! Every provider declares its own `Params` type. The registry stores
//! providers behind an object-safe wrapper whose only job is to decode the
//! opaque JSON payload into that type before calling
//! [`DnsProvider::update`]. This is the only place where the payload's
//! concrete shape is known.

use crate::error::{Error, Result};
use crate::traits::{DnsProvider, UpdateResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Object-safe view of a [`DnsProvider`] that accepts the raw job payload
#[async_trait]
trait ErasedProvider: Send + Sync {
    async fn dispatch(&self, params: &serde_json::Value, address: &str) -> Result<UpdateResult>;
}

#[async_trait]
impl<P: DnsProvider> ErasedProvider for P {
    async fn dispatch(&self, params: &serde_json::Value, address: &str) -> Result<UpdateResult> {
        let decoded = P::Params::deserialize(params)
            .map_err(|e| Error::malformed_params(self.provider_name(), e.to_string()))?;
        self.update(decoded, address).await
    }
}

/// Provider registry for dispatching sync jobs to their provider
#[derive(Default)]
pub struct ProviderRegistry {
    /// Registered providers keyed by identifier
    providers: BTreeMap<String, Box<dyn ErasedProvider>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its [`DnsProvider::provider_name`]
    ///
    /// Registering a second provider with the same name replaces the first.
    pub fn register_provider<P: DnsProvider>(&mut self, provider: P) {
        let name = provider.provider_name().to_string();
        tracing::debug!("Registering provider {}", name);
        self.providers.insert(name, Box::new(provider));
    }

    /// Dispatch an update for one job
    ///
    /// # Parameters
    ///
    /// - `provider_id`: the job's provider identifier
    /// - `params`: the job's opaque payload
    /// - `address`: the address to push
    ///
    /// # Returns
    ///
    /// - `Ok(UpdateResult)`: the provider accepted the address
    /// - `Err(Error::UnknownProvider)`: nothing is registered under `provider_id`
    /// - `Err(Error::MalformedParams)`: `params` does not decode into the provider's shape
    /// - `Err(_)`: whatever the provider's update reported
    pub async fn dispatch(
        &self,
        provider_id: &str,
        params: &serde_json::Value,
        address: &str,
    ) -> Result<UpdateResult> {
        let provider = self
            .providers
            .get(provider_id)
            .ok_or_else(|| Error::unknown_provider(provider_id))?;

        provider.dispatch(params, address).await
    }

    /// List all registered provider identifiers, sorted
    pub fn list_providers(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    /// Check if a provider identifier is registered
    pub fn has_provider(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.list_providers())
            .finish()
    }
}
