//! Durable flag storage for the resident service.
//!
//! The only state that outlives the process is the `service_enabled` flag.
//! [`Settings`] is the handle threaded through the dispatcher and the state
//! machine; it wraps any [`FlagStore`] backend.

use crate::error::{Result, ServiceError};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Key of the flag recording whether the user turned the service on.
pub const SERVICE_ENABLED_KEY: &str = "service_enabled";

/// Durable boolean key-value storage.
///
/// `set_flag` must not return `Ok` before the value is committed.
pub trait FlagStore: Send + Sync {
    /// Read a flag. Missing keys read as `false`.
    fn get_flag(&self, key: &str) -> bool;

    /// Write a flag durably.
    fn set_flag(&self, key: &str, value: bool) -> Result<()>;
}

/// Shared handle to the flag store.
#[derive(Clone)]
pub struct Settings {
    store: Arc<dyn FlagStore>,
}

impl Settings {
    #[must_use]
    pub fn new(store: Arc<dyn FlagStore>) -> Self {
        Self { store }
    }

    /// Settings backed by a process-local [`MemoryFlagStore`].
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryFlagStore::default()))
    }

    /// Whether the service should be running.
    #[must_use]
    pub fn is_service_enabled(&self) -> bool {
        self.store.get_flag(SERVICE_ENABLED_KEY)
    }

    /// Record whether the service is enabled.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::FlagPersistence`] if the write did not commit.
    pub fn set_service_enabled(&self, enabled: bool) -> Result<()> {
        self.store.set_flag(SERVICE_ENABLED_KEY, enabled)
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("service_enabled", &self.is_service_enabled())
            .finish()
    }
}

/// In-process flag store. Survives nothing beyond the process.
#[derive(Debug, Default)]
pub struct MemoryFlagStore {
    flags: Mutex<BTreeMap<String, bool>>,
}

impl FlagStore for MemoryFlagStore {
    fn get_flag(&self, key: &str) -> bool {
        match self.flags.lock() {
            Ok(flags) => flags.get(key).copied().unwrap_or(false),
            Err(poisoned) => poisoned.into_inner().get(key).copied().unwrap_or(false),
        }
    }

    fn set_flag(&self, key: &str, value: bool) -> Result<()> {
        let mut flags = self
            .flags
            .lock()
            .map_err(|e| ServiceError::FlagPersistence(format!("flag store lock poisoned: {e}")))?;
        flags.insert(key.to_owned(), value);
        Ok(())
    }
}

/// JSON file flag store.
///
/// Every write rewrites the whole map through a temp file that is synced
/// before being renamed over the target. Writers serialize on `write_lock`;
/// the cache lock is only taken to copy or swap the map, so readers never
/// wait on disk I/O.
#[derive(Debug)]
pub struct FileFlagStore {
    path: PathBuf,
    flags: Mutex<BTreeMap<String, bool>>,
    write_lock: Mutex<()>,
}

impl FileFlagStore {
    /// Open the store at `path`. A missing or unreadable file starts empty.
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let flags = load_flags(&path);
        Self {
            path,
            flags: Mutex::new(flags),
            write_lock: Mutex::new(()),
        }
    }

    /// Open the store at the default location (`<config dir>/settings.json`).
    #[must_use]
    pub fn open_default() -> Self {
        Self::open(crate::config::StorageConfig::default().effective_settings_path())
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn cache(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, bool>>> {
        self.flags
            .lock()
            .map_err(|e| ServiceError::FlagPersistence(format!("flag cache lock poisoned: {e}")))
    }

    fn snapshot(&self) -> Result<BTreeMap<String, bool>> {
        Ok(self.cache()?.clone())
    }
}

impl FlagStore for FileFlagStore {
    fn get_flag(&self, key: &str) -> bool {
        match self.flags.lock() {
            Ok(flags) => flags.get(key).copied().unwrap_or(false),
            Err(poisoned) => poisoned.into_inner().get(key).copied().unwrap_or(false),
        }
    }

    fn set_flag(&self, key: &str, value: bool) -> Result<()> {
        let _writing = self
            .write_lock
            .lock()
            .map_err(|e| ServiceError::FlagPersistence(format!("flag store lock poisoned: {e}")))?;

        let mut next = self.snapshot()?;
        next.insert(key.to_owned(), value);
        write_flags(&self.path, &next)?;
        *self.cache()? = next;

        tracing::debug!(key, value, path = %self.path.display(), "flag committed");
        Ok(())
    }
}

fn load_flags(path: &Path) -> BTreeMap<String, bool> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
        Err(e) => {
            tracing::warn!("cannot read flag store at {}: {e}", path.display());
            return BTreeMap::new();
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(flags) => flags,
        Err(e) => {
            tracing::warn!("ignoring malformed flag store at {}: {e}", path.display());
            BTreeMap::new()
        }
    }
}

fn write_flags(path: &Path, flags: &BTreeMap<String, bool>) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            ServiceError::FlagPersistence(format!(
                "cannot create flag store directory {}: {e}",
                parent.display()
            ))
        })?;
    }

    let json = serde_json::to_vec_pretty(flags)
        .map_err(|e| ServiceError::FlagPersistence(format!("cannot serialize flags: {e}")))?;

    let tmp_path = path.with_extension("json.tmp");
    let mut file = std::fs::File::create(&tmp_path).map_err(|e| {
        ServiceError::FlagPersistence(format!(
            "cannot create temp file {}: {e}",
            tmp_path.display()
        ))
    })?;
    file.write_all(&json)
        .map_err(|e| ServiceError::FlagPersistence(format!("cannot write temp file: {e}")))?;
    file.sync_all()
        .map_err(|e| ServiceError::FlagPersistence(format!("cannot sync temp file: {e}")))?;

    std::fs::rename(&tmp_path, path).map_err(|e| {
        ServiceError::FlagPersistence(format!(
            "cannot rename {} to {}: {e}",
            tmp_path.display(),
            path.display()
        ))
    })
}
