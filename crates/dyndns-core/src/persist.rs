// # Atomic JSON Files
//
// Shared write-then-rename and backup recovery used by the file-backed stores.
//
// ## Crash Recovery
//
// - Atomic writes: new content goes to `<path>.tmp`, then is renamed over `<path>`
// - Backup: the previous content is copied to `<path>.backup` before each rename
// - Recovery: if `<path>` does not parse, `<path>.backup` is tried and restored

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::Error;

/// Create the parent directory of `path` if it does not exist yet
pub(crate) async fn ensure_parent_dir(path: &Path) -> Result<(), Error> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent).await.map_err(|e| {
            Error::persistence(format!(
                "Failed to create directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }
    Ok(())
}

/// Load a JSON document, falling back to the backup file if the main file is corrupted
///
/// Returns `Ok(None)` if neither file holds a usable document.
pub(crate) async fn load_with_recovery<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, Error> {
    match load(path).await {
        Ok(value) => Ok(value),
        Err(LoadError::Read(e)) => Err(e),
        Err(LoadError::Corrupted(e)) => {
            tracing::warn!(
                "{} appears corrupted: {}. Attempting recovery from backup.",
                path.display(),
                e
            );

            let backup = backup_path(path);
            if !backup.exists() {
                tracing::warn!("No backup file found for {}", path.display());
                return Ok(None);
            }

            match load(&backup).await {
                Ok(Some(value)) => {
                    tracing::info!("Recovered {} from backup", path.display());
                    if let Err(restore_err) = fs::copy(&backup, path).await {
                        tracing::error!(
                            "Failed to restore {} from backup: {}",
                            path.display(),
                            restore_err
                        );
                    }
                    Ok(Some(value))
                }
                Ok(None) => Ok(None),
                Err(LoadError::Read(e)) | Err(LoadError::Corrupted(e)) => {
                    tracing::error!("Backup of {} is unusable: {}", path.display(), e);
                    Ok(None)
                }
            }
        }
    }
}

enum LoadError {
    Read(Error),
    Corrupted(Error),
}

async fn load<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, LoadError> {
    if !path.exists() {
        tracing::debug!("File does not exist: {}", path.display());
        return Ok(None);
    }

    let content = fs::read_to_string(path).await.map_err(|e| {
        LoadError::Read(Error::persistence(format!(
            "Failed to read {}: {}",
            path.display(),
            e
        )))
    })?;

    serde_json::from_str(&content).map(Some).map_err(|e| {
        LoadError::Corrupted(Error::persistence(format!(
            "Failed to parse {}: {}",
            path.display(),
            e
        )))
    })
}

/// Serialize `value` and atomically replace `path` with it
pub(crate) async fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), Error> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| Error::persistence(format!("Failed to serialize: {}", e)))?;

    let temp = temp_path(path);
    {
        let mut file = fs::File::create(&temp).await.map_err(|e| {
            Error::persistence(format!(
                "Failed to create temp file {}: {}",
                temp.display(),
                e
            ))
        })?;

        file.write_all(json.as_bytes()).await.map_err(|e| {
            Error::persistence(format!("Failed to write temp file {}: {}", temp.display(), e))
        })?;

        file.sync_all().await.map_err(|e| {
            Error::persistence(format!("Failed to sync temp file {}: {}", temp.display(), e))
        })?;
    }

    if path.exists() {
        if let Err(e) = fs::copy(path, backup_path(path)).await {
            tracing::warn!("Failed to create backup of {}: {}", path.display(), e);
        }
    }

    fs::rename(&temp, path).await.map_err(|e| {
        Error::persistence(format!(
            "Failed to rename {} to {}: {}",
            temp.display(),
            path.display(),
            e
        ))
    })?;

    tracing::trace!("Wrote {}", path.display());
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut temp = path.to_path_buf();
    temp.set_extension("tmp");
    temp
}

/// Path of the backup file kept next to `path`
pub(crate) fn backup_path(path: &Path) -> PathBuf {
    let mut backup = path.to_path_buf();
    backup.set_extension("backup");
    backup
}
