//! Configuration types for the dyndns system
//!
//! This module defines the runtime-replaceable [`Settings`] and the static
//! tuning knobs of the scheduler and the rate guard.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Smallest poll interval an operator may configure (in seconds)
pub const MIN_INTERVAL_SECS: u64 = 10;

/// Largest poll interval an operator may configure (one year, in seconds)
pub const MAX_INTERVAL_SECS: u64 = 365 * 24 * 60 * 60;

/// Poll interval used when nothing else is configured (in seconds)
pub const DEFAULT_INTERVAL_SECS: u64 = 600;

/// Listen port used when nothing else is configured
pub const DEFAULT_PORT: u16 = 80;

/// Operator-facing settings
///
/// Loaded once at process start and replaced wholesale by the control API.
/// The scheduler re-reads them on every tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Port the control API listens on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Poll interval in seconds
    ///
    /// A value of 0 never re-arms the scheduler timer.
    #[serde(default = "default_interval")]
    pub interval: u64,

    /// Optional custom public-IP resolution endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolver: Option<String>,
}

impl Settings {
    /// Create settings with an explicit port and interval and no resolver override
    pub fn new(port: u16, interval: u64) -> Self {
        Self {
            port,
            interval,
            resolver: None,
        }
    }

    /// Set the resolver override
    pub fn with_resolver(mut self, resolver: impl Into<String>) -> Self {
        self.resolver = Some(resolver.into());
        self
    }

    /// Poll interval as a [`Duration`]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }

    /// Validate operator-supplied settings
    ///
    /// - port must be in 1..=65535
    /// - interval must be between [`MIN_INTERVAL_SECS`] and [`MAX_INTERVAL_SECS`]
    /// - resolver, if present, must be an absolute http(s) URL
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.port == 0 {
            return Err(crate::Error::validation("port must be between 1 and 65535"));
        }

        if self.interval < MIN_INTERVAL_SECS {
            return Err(crate::Error::validation(format!(
                "interval must be at least {} seconds, got {}",
                MIN_INTERVAL_SECS, self.interval
            )));
        }

        if self.interval > MAX_INTERVAL_SECS {
            return Err(crate::Error::validation(format!(
                "interval must be at most {} seconds, got {}",
                MAX_INTERVAL_SECS, self.interval
            )));
        }

        if let Some(resolver) = &self.resolver {
            validate_resolver_url(resolver)?;
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new(DEFAULT_PORT, DEFAULT_INTERVAL_SECS)
    }
}

/// Check that a resolver override is a well-formed absolute http(s) URL
pub fn validate_resolver_url(resolver: &str) -> Result<(), crate::Error> {
    let parsed = url::Url::parse(resolver)
        .map_err(|e| crate::Error::validation(format!("resolver is not a valid URL: {}", e)))?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(crate::Error::validation(format!(
                "resolver must use http or https, got {}",
                other
            )));
        }
    }

    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(crate::Error::validation("resolver URL has no host"));
    }

    Ok(())
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_interval() -> u64 {
    DEFAULT_INTERVAL_SECS
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Capacity of the scheduler event channel
    ///
    /// When full, new events are dropped with a warning log.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_event_channel_capacity() -> usize {
    1000
}

/// Rate guard configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateGuardConfig {
    /// Burst capacity per source address
    #[serde(default = "default_capacity")]
    pub capacity: u32,

    /// Tokens refilled per second
    #[serde(default = "default_refill_per_sec")]
    pub refill_per_sec: u32,

    /// Number of tracked sources above which idle buckets are swept
    #[serde(default = "default_max_tracked_sources")]
    pub max_tracked_sources: usize,
}

impl RateGuardConfig {
    /// Validate the rate guard configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.capacity == 0 {
            return Err(crate::Error::config("rate guard capacity must be > 0"));
        }
        if self.refill_per_sec == 0 {
            return Err(crate::Error::config("rate guard refill rate must be > 0"));
        }
        if self.max_tracked_sources == 0 {
            return Err(crate::Error::config(
                "rate guard must track at least one source",
            ));
        }
        Ok(())
    }
}

impl Default for RateGuardConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            refill_per_sec: default_refill_per_sec(),
            max_tracked_sources: default_max_tracked_sources(),
        }
    }
}

fn default_capacity() -> u32 {
    8
}

fn default_refill_per_sec() -> u32 {
    1
}

fn default_max_tracked_sources() -> usize {
    4096
}
