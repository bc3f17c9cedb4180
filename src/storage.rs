//! Whole-state persistence. Stores load and save the complete state blob; there are no
//! partial updates and no transactions.

use crate::types::AppState;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("failed to access state file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("state blob is not valid: {0}")]
    Format(#[from] serde_json::Error),
    #[error("state store rejected the write: {0}")]
    Unavailable(String),
}

/// A place the application state is loaded from and saved to.
pub trait StateStore: Send + Sync {
    /// Loads the persisted state, or the default state when nothing was saved yet.
    fn load(&self) -> Result<AppState, StorageError>;

    /// Replaces the persisted state with `state`.
    fn save(&self, state: &AppState) -> Result<(), StorageError>;
}

/// Stores the state as pretty-printed JSON in a single file.
///
/// Writes go to a sibling temp file that is then renamed over the target, so a failed save
/// leaves the previous blob in place.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl StateStore for JsonFileStore {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    fn load(&self) -> Result<AppState, StorageError> {
        match fs::read_to_string(&self.path) {
            Ok(blob) => Ok(serde_json::from_str(&blob)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No state file yet, starting empty");
                Ok(AppState::default())
            }
            Err(e) => Err(self.io_error(e)),
        }
    }

    #[instrument(skip(self, state), fields(path = %self.path.display()))]
    fn save(&self, state: &AppState) -> Result<(), StorageError> {
        let blob = serde_json::to_string_pretty(state)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, blob).map_err(|e| self.io_error(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))?;

        debug!("State saved");
        Ok(())
    }
}

/// Keeps the serialized blob in memory. Saves can be made to fail for exercising rollback.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blob: Mutex<Option<String>>,
    fail_saves: Mutex<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `state`.
    pub fn with_state(state: &AppState) -> Result<Self, StorageError> {
        let store = Self::new();
        store.save(state)?;
        Ok(store)
    }

    /// Makes every following `save` fail until switched back.
    pub fn set_fail_saves(&self, fail: bool) {
        *self.fail_saves.lock().unwrap_or_else(PoisonError::into_inner) = fail;
    }

    /// The raw persisted blob, if anything was saved.
    pub fn blob(&self) -> Option<String> {
        self.blob.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl StateStore for MemoryStore {
    fn load(&self) -> Result<AppState, StorageError> {
        match self.blob() {
            Some(blob) => Ok(serde_json::from_str(&blob)?),
            None => Ok(AppState::default()),
        }
    }

    fn save(&self, state: &AppState) -> Result<(), StorageError> {
        if *self.fail_saves.lock().unwrap_or_else(PoisonError::into_inner) {
            return Err(StorageError::Unavailable("saves disabled".to_string()));
        }
        let blob = serde_json::to_string(state)?;
        *self.blob.lock().unwrap_or_else(PoisonError::into_inner) = Some(blob);
        Ok(())
    }
}
