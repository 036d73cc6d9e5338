//! Daemon configuration, read from environment variables only

use anyhow::Result;
use dyndns_core::config::{MAX_INTERVAL_SECS, MIN_INTERVAL_SECS};
use dyndns_core::settings::SettingsOverrides;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::PathBuf;

const DEFAULT_SETTINGS_PATH: &str = "/var/lib/dyndns/settings.json";
const DEFAULT_STORE_PATH: &str = "/var/lib/dyndns/store.json";

/// Where sync jobs and observed addresses live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreType {
    File,
    Memory,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub settings_path: PathBuf,
    pub store_type: StoreType,
    pub store_path: PathBuf,
    pub listen_host: IpAddr,
    /// Peers allowed to name the caller via `X-Real-IP` / `X-Forwarded-For`
    pub trusted_proxies: Vec<IpAddr>,
    /// `DDNS_PORT`, `DDNS_INTERVAL`, `DDNS_RESOLVER`
    pub overrides: SettingsOverrides,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let store_type = match var("DDNS_STORE_TYPE").as_deref().map(str::trim) {
            None | Some("file") => StoreType::File,
            Some("memory") => StoreType::Memory,
            Some(other) => anyhow::bail!(
                "DDNS_STORE_TYPE '{}' is not supported. \
                Supported types: file, memory",
                other
            ),
        };

        let listen_host = match var("DDNS_LISTEN_HOST") {
            Some(host) => host.trim().parse().map_err(|e| {
                anyhow::anyhow!("DDNS_LISTEN_HOST '{}' is not an IP address: {}", host, e)
            })?,
            None => IpAddr::from([0, 0, 0, 0]),
        };

        let trusted_proxies = match var("DDNS_TRUSTED_PROXIES") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(|entry| {
                    entry.parse::<IpAddr>().map_err(|e| {
                        anyhow::anyhow!(
                            "DDNS_TRUSTED_PROXIES entry '{}' is not an IP address: {}",
                            entry,
                            e
                        )
                    })
                })
                .collect::<Result<Vec<_>>>()?,
            None => vec![IpAddr::V4(Ipv4Addr::LOCALHOST), IpAddr::V6(Ipv6Addr::LOCALHOST)],
        };

        // Uses the same lookup so tests see a consistent environment
        let overrides = SettingsOverrides::from_lookup(&lookup)?;

        Ok(Self {
            settings_path: var("DDNS_SETTINGS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_PATH)),
            store_type,
            store_path: var("DDNS_STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PATH)),
            listen_host,
            trusted_proxies,
            overrides,
            log_level: var("DDNS_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    ///
    /// Override values are checked with the same rules the control API
    /// applies, so a typo fails at startup instead of on the first tick.
    pub fn validate(&self) -> Result<()> {
        if let Some(port) = self.overrides.port
            && port == 0
        {
            anyhow::bail!("DDNS_PORT must be between 1 and 65535");
        }

        if let Some(interval) = self.overrides.interval
            && !(MIN_INTERVAL_SECS..=MAX_INTERVAL_SECS).contains(&interval)
        {
            anyhow::bail!(
                "DDNS_INTERVAL must be between {} and {} seconds. Got: {}",
                MIN_INTERVAL_SECS,
                MAX_INTERVAL_SECS,
                interval
            );
        }

        if let Some(resolver) = &self.overrides.resolver {
            dyndns_core::config::validate_resolver_url(resolver)
                .map_err(|e| anyhow::anyhow!("DDNS_RESOLVER is not usable: {}", e))?;
        }

        if self.store_type == StoreType::File
            && let Some(parent) = self.store_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            anyhow::bail!(
                "DDNS_STORE_PATH parent directory does not exist: {}. \
                    Create it first: sudo mkdir -p {}",
                parent.display(),
                parent.display()
            );
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "DDNS_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(move |key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.store_type, StoreType::File);
        assert_eq!(config.settings_path, PathBuf::from(DEFAULT_SETTINGS_PATH));
        assert_eq!(config.listen_host, IpAddr::from([0, 0, 0, 0]));
        assert_eq!(config.log_level, "info");
        assert!(config.overrides.is_empty());
        assert_eq!(
            config.trusted_proxies,
            vec![IpAddr::from([127, 0, 0, 1]), "::1".parse::<IpAddr>().unwrap()]
        );
    }

    #[test]
    fn test_trusted_proxies_list() {
        let config = config_from(&[("DDNS_TRUSTED_PROXIES", "10.0.0.1, 2001:db8::1,")]).unwrap();
        assert_eq!(
            config.trusted_proxies,
            vec![
                IpAddr::from([10, 0, 0, 1]),
                "2001:db8::1".parse::<IpAddr>().unwrap()
            ]
        );

        assert!(config_from(&[("DDNS_TRUSTED_PROXIES", "10.0.0.0/8")]).is_err());
    }

    #[test]
    fn test_memory_store_and_overrides() {
        let config = config_from(&[
            ("DDNS_STORE_TYPE", "memory"),
            ("DDNS_LISTEN_HOST", "127.0.0.1"),
            ("DDNS_PORT", "8080"),
            ("DDNS_INTERVAL", "60"),
        ])
        .unwrap();

        assert_eq!(config.store_type, StoreType::Memory);
        assert_eq!(config.listen_host, IpAddr::from([127, 0, 0, 1]));
        assert_eq!(config.overrides.port, Some(8080));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_store_type_rejected() {
        assert!(config_from(&[("DDNS_STORE_TYPE", "sqlite")]).is_err());
    }

    #[test]
    fn test_short_interval_fails_validation() {
        let config = config_from(&[("DDNS_STORE_TYPE", "memory"), ("DDNS_INTERVAL", "5")]).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_huge_interval_fails_validation() {
        let config = config_from(&[
            ("DDNS_STORE_TYPE", "memory"),
            ("DDNS_INTERVAL", "18446744073709551615"),
        ])
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_log_level_fails_validation() {
        let config =
            config_from(&[("DDNS_STORE_TYPE", "memory"), ("DDNS_LOG_LEVEL", "verbose")]).unwrap();
        assert!(config.validate().is_err());
    }
}
