//! Per-source admission control for the mutating control endpoints
//!
//! Each distinct source address gets its own token bucket (GCRA under the
//! hood). Buckets are created on first sight and dropped again by a sweep
//! once the table grows past [`RateGuardConfig::max_tracked_sources`], so a
//! flood of distinct sources cannot grow it without bound.
//!
//! The sweep walks the whole table, so it runs at most once per refill
//! window (the time an empty bucket needs to fill up again, and never less
//! than [`MIN_SWEEP_INTERVAL`]).

use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::config::RateGuardConfig;
use crate::error::{Error, Result};

/// Shortest gap between two sweeps of the bucket table
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Keyed token-bucket rate guard
pub struct RateGuard {
    limiter: DefaultKeyedRateLimiter<IpAddr>,
    max_tracked_sources: usize,
    sweep_interval: Duration,
    epoch: Instant,
    /// Milliseconds after `epoch` before which no sweep may start
    next_sweep_ms: AtomicU64,
}

impl RateGuard {
    /// Build a guard from validated configuration
    pub fn new(config: &RateGuardConfig) -> Result<Self> {
        config.validate()?;

        let capacity = NonZeroU32::new(config.capacity)
            .ok_or_else(|| Error::config("rate guard capacity must be > 0"))?;
        let refill = NonZeroU32::new(config.refill_per_sec)
            .ok_or_else(|| Error::config("rate guard refill rate must be > 0"))?;

        let quota = Quota::per_second(refill).allow_burst(capacity);
        let full_refill = Duration::from_secs(u64::from(capacity.get())) / refill.get();

        Ok(Self {
            limiter: RateLimiter::keyed(quota),
            max_tracked_sources: config.max_tracked_sources,
            sweep_interval: full_refill.max(MIN_SWEEP_INTERVAL),
            epoch: Instant::now(),
            next_sweep_ms: AtomicU64::new(0),
        })
    }

    /// Take one token from `source`'s bucket
    ///
    /// A denied request does not consume anything.
    pub fn admit(&self, source: IpAddr) -> Result<()> {
        let decision = self.limiter.check_key(&source);
        self.sweep_if_needed();

        decision.map_err(|_| {
            tracing::debug!(%source, "Rate guard denied request");
            Error::rate_exceeded(format!("too many requests from {}", source))
        })
    }

    /// Number of sources currently holding a bucket
    pub fn tracked_sources(&self) -> usize {
        self.limiter.len()
    }

    fn sweep_if_needed(&self) {
        let before = self.limiter.len();
        if before <= self.max_tracked_sources {
            return;
        }

        let now_ms = millis(self.epoch.elapsed());
        let due_ms = self.next_sweep_ms.load(Ordering::Relaxed);
        if now_ms < due_ms {
            return;
        }

        // One caller per window wins the sweep
        let next_ms = now_ms.saturating_add(millis(self.sweep_interval));
        if self
            .next_sweep_ms
            .compare_exchange(due_ms, next_ms, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return;
        }

        // Drop buckets that have refilled completely
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
        tracing::debug!(
            "Rate guard swept {} idle source(s), {} remain",
            before.saturating_sub(self.limiter.len()),
            self.limiter.len()
        );
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl std::fmt::Debug for RateGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateGuard")
            .field("tracked_sources", &self.tracked_sources())
            .field("max_tracked_sources", &self.max_tracked_sources)
            .field("sweep_interval", &self.sweep_interval)
            .finish()
    }
}
