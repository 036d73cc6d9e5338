//! Poll loop
//!
//! The Scheduler is responsible for:
//! - Firing on the interval currently held in [`Settings`](crate::config::Settings)
//! - Resolving the public address and recording it in the sync store
//! - Asking the [`Reconciler`] which jobs are stale
//! - Dispatching each stale job through the [`ProviderRegistry`]
//! - Recording the new address on every job that was updated successfully
//!
//! ## Architecture
//!
//! ```text
//!        ┌──────────────┐
//!        │ SettingsStore│◄──── replace() from the control API
//!        └──────────────┘
//!               │ interval, resolver (re-read every tick)
//!               ▼
//!        ┌──────────────┐      ┌─────────────┐
//!  timer │  Scheduler   │─────►│ IpResolver  │
//!  ─────►│  (one task)  │      └─────────────┘
//!        └──────────────┘
//!               │
//!     ┌─────────┼──────────────────┬────────────────────┐
//!     ▼         ▼                  ▼                    ▼
//! ┌─────────┐ ┌────────────┐ ┌──────────────────┐ ┌──────────┐
//! │SyncStore│ │ Reconciler │ │ ProviderRegistry │ │  Events  │
//! └─────────┘ └────────────┘ └──────────────────┘ └──────────┘
//! ```
//!
//! ## Tick
//!
//! 1. Re-read settings; re-arm the timer if the interval changed (non-zero and in range)
//! 2. Resolve the public address (custom endpoint from settings if set)
//! 3. Find or create the address record
//! 4. Compute the stale set; nothing to do if it is empty
//! 5. Dispatch each stale job; on success store the new address reference
//!
//! Every failure is contained to its tick (or to its job) and retried by
//! the next fire. There is no backoff.

use crate::config::{DEFAULT_INTERVAL_SECS, MAX_INTERVAL_SECS, SchedulerConfig};
use crate::error::{Error, Result};
use crate::reconciler::Reconciler;
use crate::registry::ProviderRegistry;
use crate::traits::{IpResolver, ObservedAddress, SettingsStore, SyncStore, UpdateResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Events emitted by the Scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    /// Poll loop started
    Started {
        interval_secs: u64,
    },

    /// Public address resolved and recorded
    AddressObserved {
        address: String,
        address_id: u64,
    },

    /// Tick ended early (resolver or store failure, or nothing stale)
    TickSkipped {
        reason: String,
    },

    /// Provider accepted the address for a job
    JobUpdated {
        job_id: u64,
        provider: String,
        domain: String,
        address: String,
        /// `false` when the provider reported the record already matched
        changed: bool,
    },

    /// Job left stale, retried next tick
    JobFailed {
        job_id: u64,
        provider: String,
        domain: String,
        error: String,
    },

    /// Timer re-armed to a new period
    IntervalChanged {
        from_secs: u64,
        to_secs: u64,
    },

    /// Poll loop exited
    Stopped,
}

/// Outcome of a single tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// Address observed on this tick
    pub address: ObservedAddress,
    /// Jobs whose address reference now points at `address`
    pub updated: Vec<u64>,
    /// Jobs that stayed stale, with the reason
    pub failed: Vec<(u64, String)>,
}

impl TickReport {
    fn new(address: ObservedAddress) -> Self {
        Self {
            address,
            updated: Vec::new(),
            failed: Vec::new(),
        }
    }

    /// Whether no job needed an update
    pub fn is_idle(&self) -> bool {
        self.updated.is_empty() && self.failed.is_empty()
    }
}

/// Observable lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    NotStarted,
    Running,
    Stopped,
}

enum Lifecycle {
    NotStarted,
    Running {
        shutdown_tx: watch::Sender<bool>,
        handle: JoinHandle<()>,
    },
    Stopped,
}

/// Interval-driven synchronization scheduler
///
/// ## Lifecycle
///
/// 1. Create with [`Scheduler::new()`] while wiring the process
/// 2. Start the poll loop with [`Scheduler::start()`] (once)
/// 3. Stop it with [`Scheduler::stop()`], which waits for the loop task
///
/// A stopped scheduler cannot be restarted. [`Scheduler::run_once()`] runs
/// a single tick on the caller's task and may be used with or without the
/// loop; ticks never overlap.
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
    lifecycle: Mutex<Lifecycle>,
}

struct SchedulerInner {
    settings: Arc<dyn SettingsStore>,
    resolver: Arc<dyn IpResolver>,
    store: Arc<dyn SyncStore>,
    reconciler: Reconciler,
    providers: Arc<ProviderRegistry>,
    event_tx: mpsc::Sender<SchedulerEvent>,
    /// Held for the duration of a tick
    tick_lock: Mutex<()>,
}

impl Scheduler {
    /// Create a new scheduler
    ///
    /// # Returns
    ///
    /// A tuple of (scheduler, event_receiver) where event_receiver yields scheduler events
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        resolver: Arc<dyn IpResolver>,
        store: Arc<dyn SyncStore>,
        providers: Arc<ProviderRegistry>,
        config: SchedulerConfig,
    ) -> (Self, mpsc::Receiver<SchedulerEvent>) {
        let (tx, rx) = mpsc::channel(config.event_channel_capacity.max(1));

        let inner = SchedulerInner {
            reconciler: Reconciler::new(Arc::clone(&store)),
            settings,
            resolver,
            store,
            providers,
            event_tx: tx,
            tick_lock: Mutex::new(()),
        };

        let scheduler = Self {
            inner: Arc::new(inner),
            lifecycle: Mutex::new(Lifecycle::NotStarted),
        };

        (scheduler, rx)
    }

    /// Spawn the poll loop
    ///
    /// The first tick runs immediately.
    ///
    /// # Returns
    ///
    /// - `Err(Error::Lifecycle)`: already running, or stopped
    pub async fn start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        match *lifecycle {
            Lifecycle::NotStarted => {}
            Lifecycle::Running { .. } => {
                return Err(Error::lifecycle("scheduler is already running"));
            }
            Lifecycle::Stopped => {
                return Err(Error::lifecycle("scheduler was stopped and cannot be restarted"));
            }
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move { inner.run_loop(shutdown_rx).await });

        *lifecycle = Lifecycle::Running {
            shutdown_tx,
            handle,
        };
        Ok(())
    }

    /// Signal the poll loop to exit and wait until it has
    ///
    /// A pending timer wait is abandoned immediately; a tick that is already
    /// running is allowed to finish. Stopping a scheduler that is not
    /// running only marks it stopped.
    pub async fn stop(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        let previous = std::mem::replace(&mut *lifecycle, Lifecycle::Stopped);

        let Lifecycle::Running {
            shutdown_tx,
            handle,
        } = previous
        else {
            debug!("Scheduler stop requested while not running");
            return Ok(());
        };

        // The loop may already be gone if it panicked
        let _ = shutdown_tx.send(true);

        handle.await.map_err(|e| {
            error!("Scheduler task did not exit cleanly: {}", e);
            Error::lifecycle(format!("scheduler task failed: {}", e))
        })
    }

    /// Current lifecycle state
    pub async fn state(&self) -> SchedulerState {
        match *self.lifecycle.lock().await {
            Lifecycle::NotStarted => SchedulerState::NotStarted,
            Lifecycle::Running { .. } => SchedulerState::Running,
            Lifecycle::Stopped => SchedulerState::Stopped,
        }
    }

    /// Run exactly one tick to completion
    ///
    /// # Returns
    ///
    /// - `Ok(TickReport)`: the address was observed; per-job failures are in the report
    /// - `Err(_)`: the tick was skipped (resolver or store failure)
    pub async fn run_once(&self) -> Result<TickReport> {
        self.inner.tick().await
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("providers", &self.inner.providers)
            .finish_non_exhaustive()
    }
}

/// Timer period for a configured interval
///
/// `None` for zero and for anything beyond [`MAX_INTERVAL_SECS`]; neither
/// may arm the timer.
fn armable_period(interval_secs: u64) -> Option<Duration> {
    (interval_secs != 0 && interval_secs <= MAX_INTERVAL_SECS)
        .then(|| Duration::from_secs(interval_secs))
}

fn initial_period(interval_secs: u64) -> Duration {
    armable_period(interval_secs).unwrap_or_else(|| {
        if interval_secs != 0 {
            warn!(
                "Configured interval {}s is out of range, using {}s",
                interval_secs, DEFAULT_INTERVAL_SECS
            );
        }
        Duration::from_secs(DEFAULT_INTERVAL_SECS)
    })
}

fn new_timer(start: Instant, period: Duration) -> tokio::time::Interval {
    let mut timer = tokio::time::interval_at(start, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

impl SchedulerInner {
    async fn run_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let mut period = initial_period(self.settings.get().interval);
        let mut timer = new_timer(Instant::now(), period);

        info!("Scheduler started, polling every {}s", period.as_secs());
        self.emit_event(SchedulerEvent::Started {
            interval_secs: period.as_secs(),
        });

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Shutdown signal received");
                        break;
                    }
                    continue;
                }

                _ = timer.tick() => {}
            }

            let configured = self.settings.get().interval;
            match armable_period(configured) {
                Some(next) if next != period => match Instant::now().checked_add(next) {
                    Some(start) => {
                        info!(
                            "Poll interval changed from {}s to {}s",
                            period.as_secs(),
                            next.as_secs()
                        );
                        self.emit_event(SchedulerEvent::IntervalChanged {
                            from_secs: period.as_secs(),
                            to_secs: next.as_secs(),
                        });
                        period = next;
                        timer = new_timer(start, period);
                    }
                    None => warn!(
                        "Cannot schedule a {}s wait, keeping {}s",
                        next.as_secs(),
                        period.as_secs()
                    ),
                },
                Some(_) => {}
                None if configured == 0 => {}
                None => warn!(
                    "Ignoring out-of-range interval {}s, keeping {}s",
                    configured,
                    period.as_secs()
                ),
            }

            // Errors were already logged and reported as events
            let _ = self.tick().await;
        }

        if let Err(e) = self.store.flush().await {
            warn!("Failed to flush sync store on shutdown: {}", e);
        }

        self.emit_event(SchedulerEvent::Stopped);
        info!("Scheduler stopped");
    }

    async fn tick(&self) -> Result<TickReport> {
        let _guard = self.tick_lock.lock().await;

        match self.reconcile_and_dispatch().await {
            Ok(report) => Ok(report),
            Err(e) => {
                warn!("Tick skipped: {}", e);
                self.emit_event(SchedulerEvent::TickSkipped {
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn reconcile_and_dispatch(&self) -> Result<TickReport> {
        let settings = self.settings.get();

        let address = self.resolver.resolve(settings.resolver.as_deref()).await?;
        let record = self.store.find_or_create_address(&address).await?;
        debug!("Observed address {} (id {})", record.address, record.id);
        self.emit_event(SchedulerEvent::AddressObserved {
            address: record.address.clone(),
            address_id: record.id,
        });

        let stale = self.reconciler.stale_jobs(record.id).await?;
        let mut report = TickReport::new(record);

        if stale.is_empty() {
            debug!("All jobs already point at {}", report.address.address);
            self.emit_event(SchedulerEvent::TickSkipped {
                reason: "no stale jobs".to_string(),
            });
            return Ok(report);
        }

        info!(
            "{} job(s) out of date with {}",
            stale.len(),
            report.address.address
        );

        for job in stale {
            let dispatched = self
                .providers
                .dispatch(&job.provider, &job.params, &report.address.address)
                .await;

            let outcome = match dispatched {
                Ok(outcome) => self
                    .store
                    .set_job_address(job.id, report.address.id)
                    .await
                    .map(|()| outcome),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(outcome) => {
                    let changed = matches!(outcome, UpdateResult::Updated { .. });
                    info!(
                        job_id = job.id,
                        provider = %job.provider,
                        domain = %job.domain,
                        changed,
                        "Job now points at {}",
                        outcome.address()
                    );
                    self.emit_event(SchedulerEvent::JobUpdated {
                        job_id: job.id,
                        provider: job.provider,
                        domain: job.domain,
                        address: report.address.address.clone(),
                        changed,
                    });
                    report.updated.push(job.id);
                }
                Err(e) => {
                    warn!(
                        job_id = job.id,
                        provider = %job.provider,
                        domain = %job.domain,
                        "Job update failed: {}",
                        e
                    );
                    self.emit_event(SchedulerEvent::JobFailed {
                        job_id: job.id,
                        provider: job.provider,
                        domain: job.domain,
                        error: e.to_string(),
                    });
                    report.failed.push((job.id, e.to_string()));
                }
            }
        }

        Ok(report)
    }

    fn emit_event(&self, event: SchedulerEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    "Scheduler event channel full, dropping event. \
                     Consider increasing event_channel_capacity."
                );
            }
            // Nobody is listening
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}
