// # File Settings Store
//
// JSON-file implementation of SettingsStore.
//
// ## File Format
//
// ```json
// {
//   "port": 80,
//   "interval": 600,
//   "resolver": "https://api.ipify.org"
// }
// ```
//
// Missing fields take their defaults. A default file is written on first
// start. Writes use the same write-then-rename and `.backup` scheme as the
// file sync store.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, watch};

use super::SettingsOverrides;
use crate::Error;
use crate::config::Settings;
use crate::persist;
use crate::traits::SettingsStore;

/// File-backed settings store
#[derive(Debug)]
pub struct FileSettingsStore {
    path: PathBuf,
    tx: watch::Sender<Settings>,
    /// Serializes file writes so the file ends up holding the last published value
    write_lock: Mutex<()>,
}

impl FileSettingsStore {
    /// Load settings from `path`, then apply `overrides` in memory
    ///
    /// Creates the file with [`Settings::default`] if it does not exist. A
    /// corrupted file is recovered from its backup when possible and
    /// otherwise left untouched while defaults are used.
    pub async fn load<P: AsRef<Path>>(path: P, overrides: SettingsOverrides) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        persist::ensure_parent_dir(&path).await?;

        let existed = path.exists();
        let loaded = match persist::load_with_recovery::<Settings>(&path).await? {
            Some(settings) => settings,
            None if existed => {
                tracing::warn!(
                    "Settings file {} is unusable, continuing with defaults",
                    path.display()
                );
                Settings::default()
            }
            None => {
                let defaults = Settings::default();
                persist::write_atomic(&path, &defaults).await?;
                tracing::info!("Created default settings file {}", path.display());
                defaults
            }
        };

        let settings = overrides.apply(loaded);
        if let Err(e) = settings.validate() {
            tracing::warn!("Loaded settings are not valid for replacement: {}", e);
        }

        tracing::debug!(
            port = settings.port,
            interval = settings.interval,
            resolver = settings.resolver.as_deref().unwrap_or("<default>"),
            "Loaded settings from {}",
            path.display()
        );

        let (tx, _rx) = watch::channel(settings);
        Ok(Self {
            path,
            tx,
            write_lock: Mutex::new(()),
        })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SettingsStore for FileSettingsStore {
    fn get(&self) -> Settings {
        self.tx.borrow().clone()
    }

    async fn replace(&self, settings: Settings) -> Result<(), Error> {
        settings.validate()?;

        let _guard = self.write_lock.lock().await;
        persist::write_atomic(&self.path, &settings).await?;
        self.tx.send_replace(settings);
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<Settings> {
        self.tx.subscribe()
    }
}
