// # Settings Store Trait
//
// Defines concurrent-read / atomic-replace access to the operator settings.
//
// The scheduler calls `get()` on every tick while the control API calls
// `replace()` occasionally. A reader always sees either the old or the new
// value as a whole.

use async_trait::async_trait;
use tokio::sync::watch;

use crate::config::Settings;

/// Trait for settings store implementations
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Snapshot of the current settings
    fn get(&self) -> Settings;

    /// Validate and atomically replace the settings
    ///
    /// # Returns
    ///
    /// - `Err(Error::Validation)`: rejected, the current value is unchanged
    /// - `Err(Error::Persistence)`: could not be persisted, the current value is unchanged
    async fn replace(&self, settings: Settings) -> Result<(), crate::Error>;

    /// Receiver notified on every successful `replace()`
    fn subscribe(&self) -> watch::Receiver<Settings>;
}
