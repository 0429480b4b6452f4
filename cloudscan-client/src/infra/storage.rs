//! Durable single-slot storage
//!
//! Backs the persistent job handle. A slot holds at most one string and
//! survives process restarts when file-backed.

use async_trait::async_trait;
use directories::ProjectDirs;
use parking_lot::Mutex;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

pub(crate) const ACTIVE_JOB_FILE: &str = "active_job";

/// Slot storage errors
#[derive(Debug, Error)]
pub enum HandleStoreError {
    #[error("failed to access job handle at {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to determine data directory")]
    NoDataDir,
}

impl HandleStoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        HandleStoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Durable key-value slot capability holding exactly one string
#[async_trait]
pub trait HandleSlot: Send + Sync + std::fmt::Debug {
    /// Read the stored value, if any
    async fn load(&self) -> Result<Option<String>, HandleStoreError>;

    /// Overwrite the slot. Must be durable once this returns.
    async fn store(&self, value: &str) -> Result<(), HandleStoreError>;

    /// Empty the slot. Emptying an empty slot is not an error.
    async fn remove(&self) -> Result<(), HandleStoreError>;
}

/// File-backed slot
#[derive(Debug, Clone)]
pub struct FileHandleSlot {
    path: PathBuf,
}

impl FileHandleSlot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Slot file inside a state directory
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(ACTIVE_JOB_FILE))
    }

    /// Slot file in the platform data directory
    pub fn default_location() -> Result<Self, HandleStoreError> {
        let proj_dirs = ProjectDirs::from("", "cloudscan", "cloudscan-client")
            .ok_or(HandleStoreError::NoDataDir)?;
        Ok(Self::in_dir(proj_dirs.data_dir()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        self.path.with_extension("tmp")
    }
}

#[async_trait]
impl HandleSlot for FileHandleSlot {
    async fn load(&self) -> Result<Option<String>, HandleStoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => {
                let value = content.trim();
                Ok((!value.is_empty()).then(|| value.to_string()))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(HandleStoreError::io(&self.path, err)),
        }
    }

    async fn store(&self, value: &str) -> Result<(), HandleStoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| HandleStoreError::io(parent, e))?;
        }

        // Write-then-rename so a crash never leaves a torn slot behind.
        let temp = self.temp_path();
        let mut file = tokio::fs::File::create(&temp)
            .await
            .map_err(|e| HandleStoreError::io(&temp, e))?;
        file.write_all(value.as_bytes())
            .await
            .map_err(|e| HandleStoreError::io(&temp, e))?;
        file.sync_all()
            .await
            .map_err(|e| HandleStoreError::io(&temp, e))?;
        drop(file);

        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| HandleStoreError::io(&self.path, e))?;

        #[cfg(unix)]
        {
            if let Some(parent) = self.path.parent()
                && let Ok(dir) = tokio::fs::File::open(parent).await
                && let Err(err) = dir.sync_all().await
            {
                tracing::debug!(
                    "[HandleSlot] Directory sync skipped for {}: {}",
                    parent.display(),
                    err
                );
            }
        }

        Ok(())
    }

    async fn remove(&self) -> Result<(), HandleStoreError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(HandleStoreError::io(&self.path, err)),
        }
    }
}

/// In-memory slot for ephemeral sessions and tests
#[derive(Debug, Default)]
pub struct MemoryHandleSlot {
    value: Mutex<Option<String>>,
    writes: Mutex<usize>,
}

impl MemoryHandleSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot pre-filled as if a previous process had written it
    pub fn with_value(value: impl Into<String>) -> Self {
        Self {
            value: Mutex::new(Some(value.into())),
            writes: Mutex::new(0),
        }
    }

    /// Number of successful `store` calls
    pub fn write_count(&self) -> usize {
        *self.writes.lock()
    }

    pub fn peek(&self) -> Option<String> {
        self.value.lock().clone()
    }
}

#[async_trait]
impl HandleSlot for MemoryHandleSlot {
    async fn load(&self) -> Result<Option<String>, HandleStoreError> {
        Ok(self.value.lock().clone())
    }

    async fn store(&self, value: &str) -> Result<(), HandleStoreError> {
        *self.value.lock() = Some(value.to_string());
        *self.writes.lock() += 1;
        Ok(())
    }

    async fn remove(&self) -> Result<(), HandleStoreError> {
        *self.value.lock() = None;
        Ok(())
    }
}
