// # DNS-O-Matic Provider
//
// Dynamic-DNS provider for DNS-O-Matic (https://dnsomatic.com), which fans a
// single update out to every service configured in the account.
//
// ## Behavior
//
// - One authenticated GET per dispatch, no retries (the next scheduler tick is the retry)
// - HTTP timeout of 30 seconds
// - Wildcard, MX and backup-MX settings are left untouched (`NOCHG`)
//
// ## Architectural Constraints
//
// ### Trust Level: Untrusted (DNS Provider)
//
// **Allowed Capabilities**:
// - ✅ Perform HTTP/HTTPS calls to the DNS-O-Matic endpoint only
// - ✅ Parse and classify the response body
//
// **Forbidden Capabilities**:
// - ❌ Spawn tasks or threads
// - ❌ Implement retry logic (owned by the Scheduler)
// - ❌ Access the sync store (owned by the Scheduler)
//
// ## Security Requirements
//
// - The account password NEVER appears in logs or `Debug` output
// - Credentials are sent as HTTP basic auth, never in the query string
//
// ## API Reference
//
// - Update: GET `/nic/update?hostname=...&myip=...&wildcard=NOCHG&mx=NOCHG&backmx=NOCHG`
// - Success bodies start with `good <ip>` or `nochg <ip>`
// - Everything else (`badauth`, `notfqdn`, `nohost`, `abuse`, `dnserr`, `911`) is a failure

use async_trait::async_trait;
use dyndns_core::registry::ProviderRegistry;
use dyndns_core::traits::{DnsProvider, UpdateResult};
use dyndns_core::{Error, Result};
use serde::Deserialize;
use std::time::Duration;

/// Identifier jobs use to select this provider
pub const PROVIDER_NAME: &str = "dnsomatic";

/// DNS-O-Matic update endpoint base
const DNSOMATIC_API_BASE: &str = "https://updates.dnsomatic.com";

/// Default HTTP timeout for update requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest response excerpt carried in an error
const MAX_BODY_EXCERPT: usize = 200;

/// Per-job parameters, decoded from the job's opaque payload
#[derive(Clone, Deserialize)]
pub struct DnsOMaticParams {
    /// Hostname to update (`all.dnsomatic.com` updates every configured service)
    #[serde(alias = "Host")]
    pub host: String,

    /// Account user name
    #[serde(alias = "Username")]
    pub user: String,

    /// Account password
    /// ⚠️ NEVER log this value
    #[serde(alias = "Password")]
    pub pass: String,
}

// Custom Debug implementation that hides the password
impl std::fmt::Debug for DnsOMaticParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DnsOMaticParams")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("pass", &"<REDACTED>")
            .finish()
    }
}

/// DNS-O-Matic provider
///
/// Stateless apart from its HTTP client; one instance serves every job.
#[derive(Debug, Clone)]
pub struct DnsOMaticProvider {
    /// HTTP client for update requests
    client: reqwest::Client,

    /// Endpoint base, overridable for tests
    base_url: String,
}

impl DnsOMaticProvider {
    /// Create a provider talking to the public DNS-O-Matic endpoint
    pub fn new() -> Result<Self> {
        Self::with_base_url(DNSOMATIC_API_BASE)
    }

    /// Create a provider talking to `base_url` instead
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .user_agent(user_agent())
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn update_url(&self) -> String {
        format!("{}/nic/update", self.base_url)
    }
}

fn user_agent() -> String {
    format!("dyndns - dyndnsd - {}", env!("CARGO_PKG_VERSION"))
}

/// Cut a response body down to something that fits in a log line
fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= MAX_BODY_EXCERPT {
        return trimmed.to_string();
    }
    let mut cut: String = trimmed.chars().take(MAX_BODY_EXCERPT).collect();
    cut.push('…');
    cut
}

/// Map a 2xx response body to an outcome
fn classify(body: &str, address: &str) -> Result<UpdateResult> {
    if body.contains("good") {
        Ok(UpdateResult::Updated {
            address: address.to_string(),
        })
    } else if body.contains("nochg") {
        Ok(UpdateResult::Unchanged {
            address: address.to_string(),
        })
    } else {
        Err(Error::provider(
            PROVIDER_NAME,
            format!("update rejected: {}", excerpt(body)),
        ))
    }
}

#[async_trait]
impl DnsProvider for DnsOMaticProvider {
    type Params = DnsOMaticParams;

    async fn update(&self, params: DnsOMaticParams, address: &str) -> Result<UpdateResult> {
        tracing::debug!("Sending DNS-O-Matic update: {} -> {}", params.host, address);

        let response = self
            .client
            .get(self.update_url())
            .basic_auth(&params.user, Some(&params.pass))
            .query(&[
                ("hostname", params.host.as_str()),
                ("myip", address),
                ("wildcard", "NOCHG"),
                ("mx", "NOCHG"),
                ("backmx", "NOCHG"),
            ])
            .send()
            .await
            .map_err(|e| {
                // reqwest errors carry the URL, which never includes credentials here
                Error::provider(PROVIDER_NAME, format!("HTTP request failed: {}", e))
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read response body".to_string());

        if !status.is_success() {
            return Err(Error::provider(
                PROVIDER_NAME,
                format!("HTTP {}: {}", status, excerpt(&body)),
            ));
        }

        let outcome = classify(&body, address)?;
        match &outcome {
            UpdateResult::Updated { .. } => {
                tracing::info!("DNS-O-Matic updated {} -> {}", params.host, address)
            }
            UpdateResult::Unchanged { .. } => {
                tracing::debug!("DNS-O-Matic reports {} already at {}", params.host, address)
            }
        }
        Ok(outcome)
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }
}

/// Register the DNS-O-Matic provider with the registry
///
/// # Example
///
/// ```rust,ignore
/// let mut registry = ProviderRegistry::new();
/// dyndns_provider_dnsomatic::register(&mut registry)?;
/// ```
pub fn register(registry: &mut ProviderRegistry) -> Result<()> {
    registry.register_provider(DnsOMaticProvider::new()?);
    Ok(())
}
