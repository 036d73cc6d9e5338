// # IP Resolver Trait
//
// Defines the interface for looking up the host's public egress address.
//
// ## Implementations
//
// - HTTP-based: `dyndns-ip-http` crate
//
// ## Usage
//
// ```rust,ignore
// use dyndns_core::IpResolver;
//
// let settings = settings_store.get();
// let address = resolver.resolve(settings.resolver.as_deref()).await?;
// ```

use async_trait::async_trait;

/// Trait for public-IP resolver implementations
///
/// # Trust Level: Semi-Trusted
///
/// ## Allowed Capabilities
/// - ✅ Perform outbound HTTP requests to IP lookup services
///
/// ## Forbidden Capabilities
/// - ❌ Retry or back off (the next scheduler tick is the retry)
/// - ❌ Spawn polling loops (owned by the `Scheduler`)
/// - ❌ Cache results across calls (every tick must observe the network)
#[async_trait]
pub trait IpResolver: Send + Sync {
    /// Resolve the current public IP address
    ///
    /// # Parameters
    ///
    /// - `custom_endpoint`: operator-configured lookup URL that overrides the
    ///   implementation's defaults when present
    ///
    /// # Returns
    ///
    /// - `Ok(String)`: the address as a canonical IPv4/IPv6 literal
    /// - `Err(Error::Resolver)`: the lookup failed
    async fn resolve(&self, custom_endpoint: Option<&str>) -> Result<String, crate::Error>;
}
