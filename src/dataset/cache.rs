use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{Dataset, LoadError};

/// Explicit cache of loaded datasets, keyed by the ordered list of input paths.
///
/// Entries live until `invalidate` or `clear` is called; nothing expires on its own.
#[derive(Debug, Default)]
pub struct TableCache {
    entries: Mutex<HashMap<Vec<PathBuf>, Arc<Dataset>>>,
}

impl TableCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached dataset for `paths`, loading it on first use.
    pub fn get_or_load(&self, paths: &[PathBuf]) -> Result<Arc<Dataset>, LoadError> {
        self.get_or_load_with(paths, Dataset::open)
    }

    /// Like `get_or_load` but with a caller-supplied loader.
    pub fn get_or_load_with<F>(&self, paths: &[PathBuf], load: F) -> Result<Arc<Dataset>, LoadError>
    where
        F: FnOnce(&[PathBuf]) -> Result<Dataset, LoadError>,
    {
        if let Some(hit) = self.get(paths) {
            log::debug!("Table cache hit for {} path(s)", paths.len());
            return Ok(hit);
        }

        // Loading happens outside the lock; a racing loader for the same key
        // just overwrites with an identical table.
        let dataset = Arc::new(load(paths)?);
        self.lock().insert(paths.to_vec(), Arc::clone(&dataset));
        Ok(dataset)
    }

    pub fn get(&self, paths: &[PathBuf]) -> Option<Arc<Dataset>> {
        self.lock().get(paths).cloned()
    }

    /// Drop the entry for `paths`. Returns whether anything was cached.
    pub fn invalidate(&self, paths: &[PathBuf]) -> bool {
        let removed = self.lock().remove(paths).is_some();
        if removed {
            log::debug!("Invalidated cached table for {} path(s)", paths.len());
        }
        removed
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Vec<PathBuf>, Arc<Dataset>>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
