use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::types::{CacheEntry, SubmissionKey};
use crate::constants::TEMP_FILE_EXTENSION;
use crate::utils::{CacheError, Result};

/// How snapshots are written to disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// Write to a sibling temp file and rename it over the target
    pub atomic_writes: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            atomic_writes: true,
        }
    }
}

/// Whole-file JSON snapshot of the cache
#[derive(Debug)]
pub struct SnapshotStore {
    path: PathBuf,
    options: StoreOptions,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>, options: StoreOptions) -> Self {
        Self {
            path: path.into(),
            options,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot. Never fails: a missing file is an empty cache, and
    /// an unreadable or malformed one is logged and treated as empty.
    pub fn load(&self) -> HashMap<SubmissionKey, CacheEntry> {
        if !self.path.exists() {
            debug!("No cache snapshot at {}, starting empty", self.path.display());
            return HashMap::new();
        }

        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Could not read cache {}: {}. Starting with an empty cache.", self.path.display(), e);
                return HashMap::new();
            }
        };

        let document: Map<String, Value> = match serde_json::from_str(&raw) {
            Ok(document) => document,
            Err(e) => {
                warn!("Cache {} is corrupt: {}. Starting with an empty cache.", self.path.display(), e);
                return HashMap::new();
            }
        };

        let mut entries = HashMap::with_capacity(document.len());
        for (stored_key, value) in document {
            let entry: CacheEntry = match serde_json::from_value(value) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable cache entry {}: {}", stored_key, e);
                    continue;
                }
            };

            // Coordinates inside the entry are authoritative
            let key = entry.key();
            if key.to_string() != stored_key {
                debug!("Re-keying cache entry {} as {}", stored_key, key);
            }
            entries.insert(key, entry);
        }

        debug!("Loaded {} cache entries from {}", entries.len(), self.path.display());
        entries
    }

    /// Persist the full set of entries, replacing the previous snapshot
    pub fn save(&self, entries: &HashMap<SubmissionKey, CacheEntry>) -> Result<()> {
        let document: BTreeMap<String, &CacheEntry> = entries
            .iter()
            .map(|(key, entry)| (key.to_string(), entry))
            .collect();
        let json = serde_json::to_string_pretty(&document)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.persist_error(e))?;
        }

        if self.options.atomic_writes {
            self.write_atomic(json.as_bytes())?;
        } else {
            fs::write(&self.path, json).map_err(|e| self.persist_error(e))?;
        }

        debug!("Persisted {} cache entries to {}", entries.len(), self.path.display());
        Ok(())
    }

    /// Temp file in the same directory + fsync + rename
    fn write_atomic(&self, content: &[u8]) -> Result<()> {
        let temp_path = self.temp_path();

        let written = fs::File::create(&temp_path).and_then(|mut file| {
            file.write_all(content)?;
            file.sync_all()
        });
        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path);
            return Err(self.persist_error(e));
        }

        fs::rename(&temp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            self.persist_error(e)
        })
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".");
        name.push(TEMP_FILE_EXTENSION);
        self.path.with_file_name(name)
    }

    fn persist_error(&self, source: std::io::Error) -> CacheError {
        CacheError::Persist {
            path: self.path.clone(),
            source,
        }
    }
}
