// # DNS Provider Trait
//
// Defines the capability every dynamic-DNS provider implements.
//
// ## Implementations
//
// - DNS-O-Matic: `dyndns-provider-dnsomatic` crate
//
// ## Usage
//
// ```rust,ignore
// use dyndns_core::DnsProvider;
//
// let params: MyProviderParams = serde_json::from_value(job.params)?;
// provider.update(params, "203.0.113.7").await?;
// ```
//
// Providers are normally not called directly. The `ProviderRegistry`
// decodes the job's opaque payload into `Params` and calls `update`.

use async_trait::async_trait;
use serde::de::DeserializeOwned;

/// Result of a successful provider update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateResult {
    /// The provider changed the record to the new address
    Updated {
        /// The address that was pushed
        address: String,
    },
    /// The provider already had the address (no-op)
    Unchanged {
        /// The current address
        address: String,
    },
}

impl UpdateResult {
    /// The address the record now points to
    pub fn address(&self) -> &str {
        match self {
            UpdateResult::Updated { address } | UpdateResult::Unchanged { address } => address,
        }
    }
}

/// Trait for DNS provider implementations
///
/// Each provider owns its request construction, authentication embedding and
/// response classification, and exposes them through the single
/// `(params, address) -> success | failure` capability below.
///
/// # Trust Level: Untrusted
///
/// ## Allowed Capabilities
/// - ✅ Perform one HTTP/HTTPS request to the provider's own endpoint
/// - ✅ Parse and classify the provider's response
///
/// ## Forbidden Capabilities
/// - ❌ Spawn tasks or threads (violates shutdown determinism)
/// - ❌ Implement retry logic or backoff (the next scheduler tick is the retry)
/// - ❌ Access the sync store (owned by the `Scheduler`)
/// - ❌ Decide whether an update is needed (owned by the `Reconciler`)
/// - ❌ Log credentials carried in `Params`
#[async_trait]
pub trait DnsProvider: Send + Sync + 'static {
    /// Provider-specific parameter shape, decoded from the job's payload
    type Params: DeserializeOwned + Send + 'static;

    /// Push `address` to the record described by `params`
    ///
    /// # Returns
    ///
    /// - `Ok(UpdateResult)`: the provider accepted the address
    /// - `Err(Error::Provider)`: transport error, non-2xx status or an
    ///   unrecognised response body (carries the truncated body)
    async fn update(
        &self,
        params: Self::Params,
        address: &str,
    ) -> Result<UpdateResult, crate::Error>;

    /// Get the provider identifier (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}
