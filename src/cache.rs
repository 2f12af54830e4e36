//! Persisted state read at the start of a run and written at its end.
//!
//! - [`DecisionCache`]: `{file_key: track_id}` of fuzzy matches accepted in
//!   earlier runs. Never invalidated automatically; delete the file to force
//!   recomputation.
//! - [`ResponseCache`]: `{tracks, files}` fetched from the playlist service
//!   and the remote inventory, consulted before querying either.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{Error, Result};
use crate::models::{TrackId, TrackMap};

/// Default decision cache location (working directory).
pub const FUZZ_CACHE_FILE: &str = ".fuzz_cache.json";

/// Default response cache location (working directory).
pub const RESPONSE_CACHE_FILE: &str = ".cache.json";

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let value = serde_json::from_str(&content).map_err(|e| Error::json(path, e))?;
    Ok(Some(value))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    let json = serde_json::to_string_pretty(value).map_err(|e| Error::json(path, e))?;
    fs::write(path, json).map_err(|e| Error::io(path, e))
}

// ============================================================================
// Decision Cache
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct DecisionCache {
    path: PathBuf,
    entries: BTreeMap<String, TrackId>,
    appended: usize,
}

impl DecisionCache {
    /// Load the cache at `path`; a missing file is an empty cache.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries: BTreeMap<String, TrackId> = read_json(&path)?.unwrap_or_default();
        if !entries.is_empty() {
            info!("Ignoring {} fuzz results previously matched", entries.len());
        }
        Ok(Self {
            path,
            entries,
            appended: 0,
        })
    }

    /// Empty cache that will be written to `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn get(&self, key: &str) -> Option<&TrackId> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries added since load.
    pub fn appended(&self) -> usize {
        self.appended
    }

    /// Track identifiers accepted in earlier runs.
    pub fn matched_ids(&self) -> FxHashSet<&str> {
        self.entries.values().map(String::as_str).collect()
    }

    /// Record a new acceptance. Existing entries are never replaced.
    pub fn append(&mut self, key: String, track_id: TrackId) -> bool {
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, track_id);
        self.appended += 1;
        true
    }

    /// Overwrite the persisted cache with the full in-memory map.
    pub fn save(&self) -> Result<()> {
        write_json(&self.path, &self.entries)?;
        info!(
            "Saved {} fuzz results ({} new) to {}",
            self.entries.len(),
            self.appended,
            self.path.display()
        );
        Ok(())
    }
}

// ============================================================================
// Response Cache
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseCache {
    pub tracks: TrackMap,
    pub files: Vec<String>,
}

impl ResponseCache {
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let cache: Option<ResponseCache> = read_json(path)?;
        if let Some(ref cache) = cache {
            info!(
                "Retrieved {} tracks and {} files from cache",
                cache.tracks.len(),
                cache.files.len()
            );
        }
        Ok(cache)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json(path, self)
    }
}
