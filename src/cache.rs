//! In-process caching of parsed directory override layers
//!
//! Many documents in a corpus share the same nearest `.texcorpus.yaml`.
//! The cache keeps each file's parse result, successful or not, for the
//! lifetime of a [`ConfigStack`](crate::config::ConfigStack) so a batch
//! reads every override file once. Failed parses are cached as well, which
//! keeps the diagnostic identical for every document that depends on the
//! broken file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::config::LayerLoad;
use crate::error::{Error, Result};

/// Shared cache of directory override layers keyed by file path
#[derive(Debug, Clone, Default)]
pub struct LayerCache {
    entries: Arc<Mutex<HashMap<PathBuf, LayerLoad>>>,
}

impl LayerCache {
    /// Create a new empty layer cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a cached layer, or load and cache it if not present.
    ///
    /// The loader runs outside the lock; if two threads race on the same
    /// path, the first stored result wins.
    pub fn get_or_load<F>(&self, path: &Path, loader: F) -> Result<LayerLoad>
    where
        F: FnOnce() -> LayerLoad,
    {
        {
            let entries = self.entries.lock().map_err(|_| Error::LockPoisoned {
                context: "directory layer cache".to_string(),
            })?;
            if let Some(cached) = entries.get(path) {
                return Ok(cached.clone());
            }
        }

        let loaded = loader();

        let mut entries = self.entries.lock().map_err(|_| Error::LockPoisoned {
            context: "directory layer cache".to_string(),
        })?;
        Ok(entries
            .entry(path.to_path_buf())
            .or_insert(loaded)
            .clone())
    }

    /// Number of cached layer files
    pub fn len(&self) -> Result<usize> {
        let entries = self.entries.lock().map_err(|_| Error::LockPoisoned {
            context: "directory layer cache".to_string(),
        })?;
        Ok(entries.len())
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Forget every cached layer, e.g. after override files were edited
    pub fn clear(&self) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| Error::LockPoisoned {
            context: "directory layer cache".to_string(),
        })?;
        entries.clear();
        Ok(())
    }
}
