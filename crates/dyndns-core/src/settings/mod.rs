// # Settings Store Implementations
//
// Both implementations keep the current value in a `tokio::sync::watch`
// channel: readers borrow a whole `Settings` value and `replace()` swaps it in
// one step, so a reader never observes a half-applied update.
//
// ## Environment Overrides
//
// `DDNS_PORT`, `DDNS_INTERVAL` and `DDNS_RESOLVER` override the loaded values
// in memory only. They are never written back to the settings file.

pub mod file;
pub mod memory;

pub use file::FileSettingsStore;
pub use memory::MemorySettingsStore;

use crate::Error;
use crate::config::Settings;

/// Values that take precedence over the persisted settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsOverrides {
    /// Overrides [`Settings::port`]
    pub port: Option<u16>,
    /// Overrides [`Settings::interval`]
    pub interval: Option<u64>,
    /// Overrides [`Settings::resolver`]
    pub resolver: Option<String>,
}

impl SettingsOverrides {
    /// Read `DDNS_PORT`, `DDNS_INTERVAL` and `DDNS_RESOLVER`
    ///
    /// Unset or empty variables are ignored. A value that does not parse is a
    /// configuration error.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`SettingsOverrides::from_env`], reading through `lookup`
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let port = var("DDNS_PORT")
            .map(|value| {
                value
                    .trim()
                    .parse::<u16>()
                    .map_err(|e| Error::config(format!("Invalid DDNS_PORT '{}': {}", value, e)))
            })
            .transpose()?;

        let interval = var("DDNS_INTERVAL")
            .map(|value| {
                value.trim().parse::<u64>().map_err(|e| {
                    Error::config(format!("Invalid DDNS_INTERVAL '{}': {}", value, e))
                })
            })
            .transpose()?;

        let resolver = var("DDNS_RESOLVER").map(|value| value.trim().to_string());

        Ok(Self {
            port,
            interval,
            resolver,
        })
    }

    /// Whether no override is set
    pub fn is_empty(&self) -> bool {
        self.port.is_none() && self.interval.is_none() && self.resolver.is_none()
    }

    /// Apply the overrides on top of `settings`
    pub fn apply(&self, mut settings: Settings) -> Settings {
        if let Some(port) = self.port {
            settings.port = port;
        }
        if let Some(interval) = self.interval {
            settings.interval = interval;
        }
        if let Some(resolver) = &self.resolver {
            settings.resolver = Some(resolver.clone());
        }
        settings
    }
}
