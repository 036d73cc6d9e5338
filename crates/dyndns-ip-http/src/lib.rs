// # HTTP IP Resolver
//
// This crate provides an HTTP-based public-IP resolver for the dyndns system.
//
// ## Architecture
//
// Fetches the current egress address from plain-text "what is my IP"
// services. Each call is a fresh lookup: nothing is cached and nothing polls
// in the background. The scheduler decides when to ask.
//
// ## Endpoint Selection
//
// - If the operator configured a custom endpoint, only that endpoint is used
// - Otherwise the default services are tried in order until one answers
//   with a valid address

use dyndns_core::traits::IpResolver;
use dyndns_core::{Error, Result};

use std::net::IpAddr;
use std::time::Duration;

/// Default HTTP timeout per lookup
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default IP check services, tried in order
pub const DEFAULT_IP_SERVICES: &[&str] = &[
    "https://api.ipify.org",  // returns plain text IP
    "https://ifconfig.me/ip", // No rate limit documented
    "https://icanhazip.com",  // No rate limit documented
];

/// HTTP-based public-IP resolver
#[derive(Debug, Clone)]
pub struct HttpIpResolver {
    /// Services consulted when no custom endpoint is given
    services: Vec<String>,

    /// HTTP client
    client: reqwest::Client,
}

impl HttpIpResolver {
    /// Create a resolver using [`DEFAULT_IP_SERVICES`]
    pub fn new() -> Result<Self> {
        Self::with_services(DEFAULT_IP_SERVICES.iter().map(|s| s.to_string()).collect())
    }

    /// Create a resolver with its own fallback list
    pub fn with_services(services: Vec<String>) -> Result<Self> {
        if services.is_empty() {
            return Err(Error::config("HTTP resolver needs at least one service"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { services, client })
    }

    /// Fetch and parse the address from one service
    async fn fetch_ip(&self, url: &str) -> Result<IpAddr> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::resolver(format!("Request to {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(Error::resolver(format!(
                "{} answered HTTP {}",
                url,
                response.status()
            )));
        }

        let ip_text = response
            .text()
            .await
            .map_err(|e| Error::resolver(format!("Failed to read response from {}: {}", url, e)))?;

        let ip_text = ip_text.trim();

        ip_text
            .parse()
            .map_err(|_| Error::resolver(format!("{} returned an invalid IP address: {}", url, ip_text)))
    }
}

#[async_trait::async_trait]
impl IpResolver for HttpIpResolver {
    async fn resolve(&self, custom_endpoint: Option<&str>) -> Result<String> {
        if let Some(endpoint) = custom_endpoint.filter(|e| !e.trim().is_empty()) {
            let ip = self.fetch_ip(endpoint.trim()).await?;
            tracing::debug!("Resolved public IP {} via {}", ip, endpoint);
            return Ok(ip.to_string());
        }

        let mut last_error = None;
        for service in &self.services {
            match self.fetch_ip(service).await {
                Ok(ip) => {
                    tracing::debug!("Resolved public IP {} via {}", ip, service);
                    return Ok(ip.to_string());
                }
                Err(e) => {
                    tracing::warn!("IP lookup failed, trying next service: {}", e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::resolver("no IP lookup service configured")))
    }
}
