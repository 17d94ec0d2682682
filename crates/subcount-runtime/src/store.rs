//! [`CounterStore`] implementations.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use subcount_core::{CounterStore, Counters, StoreError};
use tracing::debug;

/// Counters held in memory only.
#[derive(Default)]
pub struct MemoryStore {
    counters: Mutex<Counters>,
}

impl MemoryStore {
    /// Store seeded with `counters`.
    pub fn new(counters: Counters) -> Self {
        Self {
            counters: Mutex::new(counters),
        }
    }

    /// Last saved value.
    pub fn saved(&self) -> Counters {
        *self.counters.lock()
    }
}

impl CounterStore for MemoryStore {
    fn load(&self) -> Result<Counters, StoreError> {
        Ok(*self.counters.lock())
    }

    fn save(&self, counters: &Counters) -> Result<(), StoreError> {
        *self.counters.lock() = *counters;
        Ok(())
    }
}

/// Counters persisted as `{"follows": n, "subs": n}` in a JSON file.
///
/// Writes go to a sibling temp file that is then renamed over the target,
/// so a crash mid-write never leaves a truncated file behind.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Store backed by `path`. Nothing is read until [`CounterStore::load`].
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl CounterStore for JsonFileStore {
    fn load(&self) -> Result<Counters, StoreError> {
        if !self.path.exists() {
            debug!(path = ?self.path, "counter file not found, starting from zero");
            return Ok(Counters::default());
        }
        let content = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn save(&self, counters: &Counters) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.temp_path();
        std::fs::write(&tmp, serde_json::to_vec_pretty(counters)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
