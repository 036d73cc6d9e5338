// # Memory Settings Store
//
// In-memory implementation of SettingsStore. Replacements are lost on
// restart.

use async_trait::async_trait;
use tokio::sync::watch;

use crate::Error;
use crate::config::Settings;
use crate::traits::SettingsStore;

/// In-memory settings store
#[derive(Debug)]
pub struct MemorySettingsStore {
    tx: watch::Sender<Settings>,
}

impl MemorySettingsStore {
    /// Create a store holding `initial`
    ///
    /// `initial` is not validated, so tests may start from values the control
    /// API would reject.
    pub fn new(initial: Settings) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }
}

impl Default for MemorySettingsStore {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    fn get(&self) -> Settings {
        self.tx.borrow().clone()
    }

    async fn replace(&self, settings: Settings) -> Result<(), Error> {
        settings.validate()?;
        self.tx.send_replace(settings);
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<Settings> {
        self.tx.subscribe()
    }
}
