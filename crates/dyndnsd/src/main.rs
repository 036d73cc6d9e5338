// # dyndnsd - Dynamic DNS Daemon
//
// Thin integration layer: reads configuration from the environment, wires the
// dyndns-core components to their implementations and runs the scheduler next
// to the control API until SIGTERM/SIGINT.
//
// All synchronization logic lives in dyndns-core.
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Files
// - `DDNS_SETTINGS_PATH`: Settings file (default `/var/lib/dyndns/settings.json`)
// - `DDNS_STORE_TYPE`: Sync store type (file, memory; default file)
// - `DDNS_STORE_PATH`: Sync store file (default `/var/lib/dyndns/store.json`)
//
// ### Settings overrides (never written back)
// - `DDNS_PORT`: Control API port
// - `DDNS_INTERVAL`: Poll interval in seconds
// - `DDNS_RESOLVER`: Custom public-IP endpoint
//
// ### Daemon
// - `DDNS_LISTEN_HOST`: Control API bind address (default 0.0.0.0)
// - `DDNS_TRUSTED_PROXIES`: Comma-separated proxy addresses whose
//   `X-Real-IP` / `X-Forwarded-For` headers are believed (default 127.0.0.1,::1)
// - `DDNS_LOG_LEVEL`: trace, debug, info, warn, error (default info)
//
// ## Example
//
// ```bash
// export DDNS_SETTINGS_PATH=/var/lib/dyndns/settings.json
// export DDNS_STORE_PATH=/var/lib/dyndns/store.json
// export DDNS_INTERVAL=300
//
// dyndnsd
// ```

mod api;
mod config;

use anyhow::Result;
use config::{Config, StoreType};
use dyndns_core::config::{RateGuardConfig, SchedulerConfig};
use dyndns_core::settings::FileSettingsStore;
use dyndns_core::store::{FileSyncStore, MemorySyncStore};
use dyndns_core::traits::{SettingsStore, SyncStore};
use dyndns_core::{ProviderRegistry, RateGuard, Scheduler, SchedulerEvent};
use dyndns_ip_http::HttpIpResolver;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// How long in-flight control requests get to finish after shutdown starts
const SERVER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum DdnsExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<DdnsExitCode> for ExitCode {
    fn from(code: DdnsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Startup failures are configuration errors; anything after is a runtime error
enum DaemonError {
    Startup(anyhow::Error),
    Runtime(anyhow::Error),
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return DdnsExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return DdnsExitCode::ConfigError.into();
    }

    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DdnsExitCode::ConfigError.into();
    }

    info!("Starting dyndnsd {}", env!("CARGO_PKG_VERSION"));

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DdnsExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        match run_daemon(config).await {
            Ok(()) => DdnsExitCode::CleanShutdown,
            Err(DaemonError::Startup(e)) => {
                error!("Startup failed: {:#}", e);
                DdnsExitCode::ConfigError
            }
            Err(DaemonError::Runtime(e)) => {
                error!("Daemon error: {:#}", e);
                DdnsExitCode::RuntimeError
            }
        }
    });

    result.into()
}

/// Run the daemon
async fn run_daemon(config: Config) -> Result<(), DaemonError> {
    let components = build_components(&config)
        .await
        .map_err(DaemonError::Startup)?;

    let settings = components.settings.get();
    let listen_addr = SocketAddr::new(config.listen_host, settings.port);
    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .map_err(|e| {
            DaemonError::Startup(anyhow::anyhow!("Failed to bind {}: {}", listen_addr, e))
        })?;
    info!("Control API listening on {}", listen_addr);

    let (scheduler, events) = Scheduler::new(
        Arc::clone(&components.settings),
        components.resolver,
        Arc::clone(&components.store),
        Arc::clone(&components.providers),
        SchedulerConfig::default(),
    );
    let event_task = tokio::spawn(log_events(events));

    scheduler
        .start()
        .await
        .map_err(|e| DaemonError::Startup(e.into()))?;

    debug!("Trusted proxies: {:?}", config.trusted_proxies);
    let app = api::create_router(api::AppState {
        settings: components.settings,
        store: components.store,
        providers: components.providers,
        guard: components.guard,
        trusted_proxies: Arc::from(config.trusted_proxies),
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut server_handle = tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let mut shutdown_rx = shutdown_rx;
            loop {
                if *shutdown_rx.borrow() {
                    break;
                }
                if shutdown_rx.changed().await.is_err() {
                    break;
                }
            }
            info!("Control API shutting down");
        })
        .await
    });

    let mut outcome = Ok(());
    let mut server_done = false;
    tokio::select! {
        received = wait_for_shutdown() => match received {
            Ok(name) => info!("Received shutdown signal: {}", name),
            Err(e) => {
                error!("Shutdown error: {}", e);
                outcome = Err(DaemonError::Runtime(e));
            }
        },
        result = &mut server_handle => {
            server_done = true;
            match result {
                Ok(Ok(())) => warn!("Control API exited unexpectedly"),
                Ok(Err(e)) => {
                    error!("Control API error: {}", e);
                    outcome = Err(DaemonError::Runtime(e.into()));
                }
                Err(e) => {
                    error!("Control API task panicked: {}", e);
                    outcome = Err(DaemonError::Runtime(e.into()));
                }
            }
        }
    }

    info!("Shutting down daemon");
    let _ = shutdown_tx.send(true);

    if let Err(e) = scheduler.stop().await {
        error!("Scheduler did not stop cleanly: {}", e);
    }

    if !server_done
        && tokio::time::timeout(SERVER_SHUTDOWN_TIMEOUT, server_handle)
            .await
            .is_err()
    {
        warn!(
            "Control API did not finish within {:?}",
            SERVER_SHUTDOWN_TIMEOUT
        );
    }

    // Dropping the scheduler closes the event channel
    drop(scheduler);
    let _ = event_task.await;

    info!("dyndnsd stopped");
    outcome
}

struct Components {
    settings: Arc<dyn SettingsStore>,
    store: Arc<dyn SyncStore>,
    resolver: Arc<dyn dyndns_core::IpResolver>,
    providers: Arc<ProviderRegistry>,
    guard: Arc<RateGuard>,
}

async fn build_components(config: &Config) -> Result<Components> {
    let settings =
        FileSettingsStore::load(&config.settings_path, config.overrides.clone()).await?;
    info!("Settings loaded from {}", settings.path().display());
    if !config.overrides.is_empty() {
        info!("Environment overrides applied: {:?}", config.overrides);
    }

    let store: Arc<dyn SyncStore> = match config.store_type {
        StoreType::File => {
            let store = FileSyncStore::new(&config.store_path).await?;
            info!("Sync store: {}", store.path().display());
            Arc::new(store)
        }
        StoreType::Memory => {
            warn!("Using in-memory sync store; jobs are lost on restart");
            Arc::new(MemorySyncStore::new())
        }
    };

    let mut providers = ProviderRegistry::new();
    dyndns_provider_dnsomatic::register(&mut providers)?;
    info!("Registered providers: {}", providers.list_providers().join(", "));

    let resolver = HttpIpResolver::new()?;
    let guard = RateGuard::new(&RateGuardConfig::default())?;

    Ok(Components {
        settings: Arc::new(settings),
        store,
        resolver: Arc::new(resolver),
        providers: Arc::new(providers),
        guard: Arc::new(guard),
    })
}

async fn log_events(mut events: mpsc::Receiver<SchedulerEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            SchedulerEvent::JobFailed {
                job_id,
                provider,
                domain,
                error,
            } => warn!(
                "Job {} ({} / {}) failed: {}",
                job_id, provider, domain, error
            ),
            SchedulerEvent::IntervalChanged { from_secs, to_secs } => {
                info!("Poll interval changed from {}s to {}s", from_secs, to_secs)
            }
            other => debug!("Scheduler event: {:?}", other),
        }
    }
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let name = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(name)
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
