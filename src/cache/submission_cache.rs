use chrono::Local;
use colored::Colorize;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::fingerprint::fingerprint_of;
use super::store::{SnapshotStore, StoreOptions};
use super::types::{CacheEntry, EntryFilter, SubmissionKey, SubmissionUpdate};
use crate::constants::RESERVED_FIELDS;
use crate::utils::Result;

/// Change-detection cache for LMS submissions
///
/// Remembers the fingerprint of the last processed state of every submission
/// slot so expensive work (downloads, model inference) runs once per distinct
/// state. Every mutation is flushed to disk before it returns. One process is
/// assumed to own the backing file.
#[derive(Debug)]
pub struct SubmissionCache {
    store: SnapshotStore,
    entries: Mutex<HashMap<SubmissionKey, CacheEntry>>,
}

impl SubmissionCache {
    /// Open the cache at `path` with atomic snapshot writes
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::with_options(path, StoreOptions::default())
    }

    pub fn with_options(path: impl Into<PathBuf>, options: StoreOptions) -> Self {
        let store = SnapshotStore::new(path, options);
        let entries = store.load();
        Self {
            store,
            entries: Mutex::new(entries),
        }
    }

    /// Whether `data` differs from the last recorded state of `key`.
    /// Unknown keys count as changed. Never records anything.
    pub fn has_changed<T: Serialize + ?Sized>(&self, key: &SubmissionKey, data: &T) -> Result<bool> {
        let new_hash = fingerprint_of(data)?;
        let entries = self.entries.lock();

        let changed = match entries.get(key) {
            Some(entry) => entry.fingerprint != new_hash,
            None => true,
        };
        debug!("{} changed={}", key, changed);
        Ok(changed)
    }

    /// Record `update.data` as the latest state of `update.key`
    ///
    /// `first_seen` survives from an earlier entry, and so do extension
    /// fields not named in this update. If the snapshot cannot be written
    /// the error is returned but the in-memory entry stays.
    pub fn update<T: Serialize + ?Sized>(&self, update: SubmissionUpdate<'_, T>) -> Result<()> {
        let new_hash = fingerprint_of(update.data)?;
        let now = Local::now();

        let mut extra = update.extra;
        extra.retain(|field, _| {
            let reserved = RESERVED_FIELDS.contains(&field.as_str());
            if reserved {
                warn!("Ignoring extension field '{}' on {}: name is reserved", field, update.key);
            }
            !reserved
        });

        let mut entries = self.entries.lock();
        let (first_seen_at, extra) = match entries.get(&update.key) {
            Some(previous) => {
                let mut merged = previous.extra.clone();
                merged.extend(extra);
                (previous.first_seen_at, merged)
            }
            None => (now, extra),
        };

        let entry = CacheEntry {
            course_id: update.key.course_id,
            assignment_id: update.key.assignment_id,
            student_id: update.key.student_id,
            student_username: update.student_username,
            assignment_name: update.assignment_name,
            assignment_type: update.key.assignment_type.clone(),
            fingerprint: new_hash,
            status: update.status,
            last_updated_at: now,
            first_seen_at,
            extra,
        };
        entries.insert(update.key, entry);

        self.store.save(&entries)
    }

    pub fn get_entry(&self, key: &SubmissionKey) -> Option<CacheEntry> {
        self.entries.lock().get(key).cloned()
    }

    /// Entries matching `filter`, in no particular order
    pub fn get_all_entries(&self, filter: &EntryFilter) -> Vec<CacheEntry> {
        self.entries
            .lock()
            .values()
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect()
    }

    /// Returns whether an entry was actually removed
    pub fn remove_entry(&self, key: &SubmissionKey) -> Result<bool> {
        let mut entries = self.entries.lock();
        if entries.remove(key).is_none() {
            return Ok(false);
        }
        self.store.save(&entries)?;
        debug!("Removed cache entry {}", key);
        Ok(true)
    }

    /// Drop every entry and persist the empty cache
    pub fn clear(&self) -> Result<()> {
        let mut entries = self.entries.lock();
        let removed = entries.len();
        entries.clear();
        self.store.save(&entries)?;
        info!("Cache cleared ({} entries removed)", removed);
        Ok(())
    }

    pub fn get_stats(&self) -> CacheStats {
        let entries = self.entries.lock();
        let mut stats = CacheStats {
            total_entries: entries.len(),
            ..CacheStats::default()
        };

        for entry in entries.values() {
            *stats.by_status.entry(entry.status.clone()).or_default() += 1;
            *stats.by_type.entry(entry.assignment_type.to_string()).or_default() += 1;
            *stats.by_course.entry(entry.course_id).or_default() += 1;
        }

        stats
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Location of the backing snapshot
    pub fn path(&self) -> &Path {
        self.store.path()
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_type: BTreeMap<String, usize>,
    pub by_course: BTreeMap<i64, usize>,
}

impl CacheStats {
    /// Format cache stats for display
    pub fn format(&self) -> String {
        let mut out = format!(
            "{}\n  Total submissions tracked: {}\n",
            "Submission Cache Statistics".bold(),
            self.total_entries
        );

        if !self.by_status.is_empty() {
            out.push_str("\n  By status:\n");
            for (status, count) in &self.by_status {
                out.push_str(&format!("    - {}: {}\n", status, count));
            }
        }

        if !self.by_type.is_empty() {
            out.push_str("\n  By assignment type:\n");
            for (kind, count) in &self.by_type {
                out.push_str(&format!("    - {}: {}\n", kind, count));
            }
        }

        if !self.by_course.is_empty() {
            out.push_str("\n  By course:\n");
            for (course_id, count) in &self.by_course {
                out.push_str(&format!("    - Course {}: {} submissions\n", course_id, count));
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::types::AssignmentType;
    use crate::utils::CacheError;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, SubmissionCache) {
        let temp_dir = TempDir::new().unwrap();
        let cache = SubmissionCache::open(temp_dir.path().join("submission_cache.json"));
        (temp_dir, cache)
    }

    fn record<T: Serialize + ?Sized>(cache: &SubmissionCache, key: &SubmissionKey, data: &T, status: &str) {
        cache
            .update(
                SubmissionUpdate::new(key.clone(), data)
                    .student_username(format!("user{}", key.student_id))
                    .assignment_name("Practice 1")
                    .status(status),
            )
            .unwrap();
    }

    #[test]
    fn test_unknown_key_has_changed() {
        let (_dir, cache) = open_temp();
        let key = SubmissionKey::new(10, 5, 1, "assign");
        assert!(cache.has_changed(&key, &json!({"anything": 1})).unwrap());
        assert!(cache.has_changed(&key, &json!(null)).unwrap());
    }

    #[test]
    fn test_has_changed_is_pure() {
        let (_dir, cache) = open_temp();
        let key = SubmissionKey::new(10, 5, 1, "assign");
        for _ in 0..3 {
            cache.has_changed(&key, &json!({"a": 1})).unwrap();
        }
        assert!(cache.get_entry(&key).is_none());
        assert!(cache.is_empty());
        assert!(!cache.path().exists());
    }

    #[test]
    fn test_timemodified_scenario() {
        let (_dir, cache) = open_temp();
        let key = SubmissionKey::new(10, 5, 1, "assign");
        let original = json!({"timemodified": 100, "status": "submitted"});
        let resubmitted = json!({"timemodified": 200, "status": "submitted"});

        record(&cache, &key, &original, "processed");
        assert!(!cache.has_changed(&key, &original).unwrap());

        record(&cache, &key, &resubmitted, "processed");
        assert!(cache.has_changed(&key, &original).unwrap());
        assert!(!cache.has_changed(&key, &resubmitted).unwrap());
    }

    #[test]
    fn test_file_list_order_does_not_matter() {
        let (_dir, cache) = open_temp();
        let key = SubmissionKey::new(10, 7, 2, AssignmentType::Vpl);
        record(&cache, &key, &["/dl/main.c", "/dl/util.h"], "processed");
        assert!(!cache.has_changed(&key, &["/dl/util.h", "/dl/main.c"]).unwrap());
        assert!(cache.has_changed(&key, &["/dl/main.c"]).unwrap());
    }

    #[test]
    fn test_types_are_independent() {
        let (_dir, cache) = open_temp();
        let vpl = SubmissionKey::new(10, 5, 1, "vpl");
        let assign = SubmissionKey::new(10, 5, 1, "assign");
        let data = json!({"timemodified": 1});

        record(&cache, &vpl, &data, "processed");
        assert!(!cache.has_changed(&vpl, &data).unwrap());
        assert!(cache.has_changed(&assign, &data).unwrap());

        record(&cache, &assign, &json!({"timemodified": 2}), "processed");
        assert!(!cache.has_changed(&vpl, &data).unwrap());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_first_seen_is_stable() {
        let (_dir, cache) = open_temp();
        let key = SubmissionKey::new(10, 5, 1, "quiz");

        record(&cache, &key, &json!({"grade": 4}), "processed");
        let first = cache.get_entry(&key).unwrap();

        std::thread::sleep(std::time::Duration::from_millis(5));
        record(&cache, &key, &json!({"grade": 8}), "processed");
        let second = cache.get_entry(&key).unwrap();

        assert_eq!(second.first_seen_at, first.first_seen_at);
        assert!(second.last_updated_at > first.last_updated_at);
        assert_ne!(second.fingerprint, first.fingerprint);
    }

    #[test]
    fn test_update_fills_entry() {
        let (_dir, cache) = open_temp();
        let key = SubmissionKey::new(10, 5, 1, "assign");
        let data = json!({"timemodified": 100});

        cache
            .update(
                SubmissionUpdate::new(key.clone(), &data)
                    .student_username("alice")
                    .assignment_name("Essay")
                    .status("error")
                    .field("files_downloaded", 3)
                    .field("suggested_grade", 6.5),
            )
            .unwrap();

        let entry = cache.get_entry(&key).unwrap();
        assert_eq!(entry.key(), key);
        assert_eq!(entry.student_username, "alice");
        assert_eq!(entry.assignment_name, "Essay");
        assert_eq!(entry.status, "error");
        assert_eq!(entry.fingerprint, crate::cache::fingerprint(&data).unwrap());
        assert_eq!(entry.extra.get("files_downloaded"), Some(&json!(3)));
        assert_eq!(entry.extra_f64("suggested_grade"), Some(6.5));
    }

    #[test]
    fn test_extension_fields_merge() {
        let (_dir, cache) = open_temp();
        let key = SubmissionKey::new(10, 5, 1, "assign");

        cache
            .update(
                SubmissionUpdate::new(key.clone(), &json!(1))
                    .field("suggested_grade", 5)
                    .field("ai_analyzed", true),
            )
            .unwrap();
        cache
            .update(SubmissionUpdate::new(key.clone(), &json!(2)).field("suggested_grade", 7))
            .unwrap();

        let entry = cache.get_entry(&key).unwrap();
        assert_eq!(entry.extra.get("suggested_grade"), Some(&json!(7)));
        assert_eq!(entry.extra.get("ai_analyzed"), Some(&json!(true)));
    }

    #[test]
    fn test_reserved_extension_fields_are_dropped() {
        let (_dir, cache) = open_temp();
        let key = SubmissionKey::new(10, 5, 1, "assign");

        cache
            .update(
                SubmissionUpdate::new(key.clone(), &json!(1))
                    .status("processed")
                    .field("status", "submitted")
                    .field("hash", "forged")
                    .field("grade", 9),
            )
            .unwrap();

        let entry = cache.get_entry(&key).unwrap();
        assert_eq!(entry.status, "processed");
        assert_ne!(entry.fingerprint, "forged");
        assert_eq!(entry.extra.len(), 1);

        let on_disk = fs::read_to_string(cache.path()).unwrap();
        assert_eq!(on_disk.matches("\"status\"").count(), 1);
    }

    #[test]
    fn test_round_trip_persistence() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("submission_cache.json");
        let key = SubmissionKey::new(10, 5, 1, AssignmentType::ForumTask);
        let data = json!({"total_words": 420, "last_post_time": 1700000000});

        let written = {
            let cache = SubmissionCache::open(&path);
            cache
                .update(
                    SubmissionUpdate::new(key.clone(), &data)
                        .student_username("iñaki")
                        .assignment_name("Debate")
                        .field("ai_analysis", json!({"status": "success", "urls_found": 2})),
                )
                .unwrap();
            cache.get_entry(&key).unwrap()
        };

        let reopened = SubmissionCache::open(&path);
        assert_eq!(reopened.get_entry(&key), Some(written));
        assert!(!reopened.has_changed(&key, &data).unwrap());
    }

    #[test]
    fn test_remove_entry() {
        let (_dir, cache) = open_temp();
        let present = SubmissionKey::new(10, 5, 1, "vpl");
        let absent = SubmissionKey::new(10, 5, 2, "vpl");
        record(&cache, &present, &json!(1), "processed");

        assert!(!cache.remove_entry(&absent).unwrap());
        assert_eq!(cache.len(), 1);

        assert!(cache.remove_entry(&present).unwrap());
        assert_eq!(cache.len(), 0);
        assert!(SubmissionCache::open(cache.path()).is_empty());
    }

    #[test]
    fn test_clear_persists() {
        let (_dir, cache) = open_temp();
        record(&cache, &SubmissionKey::new(1, 1, 1, "vpl"), &json!(1), "processed");
        record(&cache, &SubmissionKey::new(1, 1, 2, "vpl"), &json!(1), "processed");

        cache.clear().unwrap();
        assert!(cache.is_empty());
        assert!(SubmissionCache::open(cache.path()).is_empty());
    }

    #[test]
    fn test_filters() {
        let (_dir, cache) = open_temp();
        record(&cache, &SubmissionKey::new(10, 5, 1, "assign"), &json!(1), "processed");
        record(&cache, &SubmissionKey::new(10, 6, 1, "assign"), &json!(1), "processed");
        record(&cache, &SubmissionKey::new(11, 5, 1, "assign"), &json!(1), "processed");

        assert_eq!(cache.get_all_entries(&EntryFilter::all()).len(), 3);

        let course = cache.get_all_entries(&EntryFilter::all().course(10));
        assert_eq!(course.len(), 2);
        assert!(course.iter().all(|e| e.course_id == 10));

        let both = cache.get_all_entries(&EntryFilter::all().course(10).assignment(5));
        assert_eq!(both.len(), 1);
        assert_eq!((both[0].course_id, both[0].assignment_id), (10, 5));

        let assignment = cache.get_all_entries(&EntryFilter::all().assignment(5));
        assert_eq!(assignment.len(), 2);
    }

    #[test]
    fn test_stats() {
        let (_dir, cache) = open_temp();
        record(&cache, &SubmissionKey::new(10, 5, 1, "assign"), &json!(1), "processed");
        record(&cache, &SubmissionKey::new(10, 5, 2, "assign"), &json!(1), "processed");
        record(&cache, &SubmissionKey::new(10, 6, 1, "vpl"), &json!(1), "processed");
        record(&cache, &SubmissionKey::new(12, 6, 1, "vpl"), &json!(1), "error");

        let stats = cache.get_stats();
        assert_eq!(stats.total_entries, 4);
        assert_eq!(
            stats.by_status,
            BTreeMap::from([("error".to_string(), 1), ("processed".to_string(), 3)])
        );
        assert_eq!(
            stats.by_type,
            BTreeMap::from([("assign".to_string(), 2), ("vpl".to_string(), 2)])
        );
        assert_eq!(stats.by_course, BTreeMap::from([(10, 3), (12, 1)]));

        let text = stats.format();
        assert!(text.contains("Course 10: 3 submissions"));
    }

    #[test]
    fn test_persist_failure_keeps_memory_state() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        fs::write(&blocker, "x").unwrap();
        let cache = SubmissionCache::open(blocker.join("submission_cache.json"));
        let key = SubmissionKey::new(10, 5, 1, "assign");

        let result = cache.update(SubmissionUpdate::new(key.clone(), &json!(1)));
        assert!(matches!(result, Err(CacheError::Persist { .. })));
        assert!(cache.get_entry(&key).is_some());
        assert!(!cache.has_changed(&key, &json!(1)).unwrap());
    }

    #[test]
    fn test_shared_across_threads() {
        let (_dir, cache) = open_temp();
        let cache = std::sync::Arc::new(cache);

        let handles: Vec<_> = (0..4)
            .map(|student| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    let key = SubmissionKey::new(10, 5, student, "vpl");
                    cache.update(SubmissionUpdate::new(key, &json!(student))).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.len(), 4);
        assert_eq!(SubmissionCache::open(cache.path()).len(), 4);
    }
}
