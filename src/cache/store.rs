//! Cache store persisting resolved cities to a single JSON file
//!
//! Reads are lock-free and never fail: a missing or corrupt file reads as an
//! empty cache. Writes take the advisory lock at `<path>.lock` and replace the
//! whole document atomically.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::atomic::write_atomic;
use super::entry::{CacheDocument, CacheEntry};
use super::lock::{Deadline, FileLock, LockError, LockGuard, StopReason};
use crate::config::CacheConfig;

/// Errors surfaced by cache writes
#[derive(Debug, Error)]
pub enum CacheError {
    /// Another writer held the lock until the deadline or cancellation
    #[error("could not acquire cache lock {}: {reason}", .path.display())]
    LockTimeout { path: PathBuf, reason: StopReason },

    /// Filesystem failure while writing or removing the cache
    #[error("cache I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The document could not be encoded
    #[error("failed to serialize cache: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl From<LockError> for CacheError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Timeout { path, reason } => CacheError::LockTimeout { path, reason },
            LockError::Io { path, source } => CacheError::Io { path, source },
        }
    }
}

/// Owner of the on-disk city cache
#[derive(Debug, Clone)]
pub struct CacheStore {
    config: CacheConfig,
}

impl CacheStore {
    pub fn new(config: CacheConfig) -> Self {
        Self { config }
    }

    /// Store at `path` with default settings
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self::new(CacheConfig::with_path(path))
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Backing JSON file
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Marker file used as the write lock
    pub fn lock_path(&self) -> PathBuf {
        let mut name = self.config.path.clone().into_os_string();
        name.push(".lock");
        PathBuf::from(name)
    }

    fn dir(&self) -> PathBuf {
        match self.config.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    fn lock(&self) -> FileLock {
        FileLock::new(self.lock_path()).with_poll_interval(self.config.poll_interval)
    }

    /// Reads the cache from disk
    ///
    /// Never fails: a missing, unreadable or unparsable file yields an empty
    /// document so a broken cache only causes misses.
    pub fn load(&self) -> CacheDocument {
        let path = self.path();
        let content = match fs::read(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no cache file, starting empty");
                return CacheDocument::new();
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cache unreadable, starting empty");
                return CacheDocument::new();
            }
        };

        let doc: CacheDocument = match serde_json::from_slice(&content) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cache corrupt, starting empty");
                return CacheDocument::new();
            }
        };

        let mismatched = doc.mismatched_keys();
        if !mismatched.is_empty() {
            tracing::warn!(
                path = %path.display(),
                keys = ?mismatched,
                "cache entries stored under a key different from their normalized name"
            );
        }

        let invalid = doc.invalid_coordinates();
        if !invalid.is_empty() {
            tracing::warn!(
                path = %path.display(),
                keys = ?invalid,
                "cache entries with out-of-range coordinates"
            );
        }

        tracing::debug!(path = %path.display(), entries = doc.len(), "cache loaded");
        doc
    }

    /// Persists `doc`, waiting up to the configured lock timeout
    ///
    /// # Errors
    /// * `CacheError::LockTimeout` if another writer holds the lock too long
    /// * `CacheError::Io` if the file cannot be written
    pub fn save(&self, doc: &CacheDocument) -> Result<(), CacheError> {
        self.save_with(doc, &self.default_deadline())
    }

    /// Persists `doc`, waiting for the lock until `deadline`
    pub fn save_with(&self, doc: &CacheDocument, deadline: &Deadline) -> Result<(), CacheError> {
        let json = self.encode(doc)?;
        let guard = self.lock().acquire(deadline)?;
        self.write_locked(guard, &json, doc.len())
    }

    /// Loads the latest document, inserts `entry`, and saves it
    ///
    /// Reloading right before the write keeps updates from other processes
    /// that landed since this process last read the file. Returns the
    /// document that was written.
    pub fn upsert(&self, entry: CacheEntry) -> Result<CacheDocument, CacheError> {
        let mut doc = self.load();
        doc.upsert(entry);
        self.save(&doc)?;
        Ok(doc)
    }

    /// [`CacheStore::upsert`] for async callers
    ///
    /// The lock wait yields to the runtime and stops early when `deadline`
    /// is cancelled.
    pub async fn upsert_with(
        &self,
        entry: CacheEntry,
        deadline: &Deadline,
    ) -> Result<CacheDocument, CacheError> {
        let mut doc = self.load();
        doc.upsert(entry);
        let json = self.encode(&doc)?;
        let guard = self.lock().acquire_async(deadline).await?;
        self.write_locked(guard, &json, doc.len())?;
        Ok(doc)
    }

    /// A deadline of the configured lock timeout from now
    pub fn default_deadline(&self) -> Deadline {
        Deadline::after(self.config.lock_timeout)
    }

    /// Serializes `doc` and makes sure the cache directory exists
    fn encode(&self, doc: &CacheDocument) -> Result<Vec<u8>, CacheError> {
        let json = serde_json::to_vec_pretty(doc)?;
        let dir = self.dir();
        fs::create_dir_all(&dir).map_err(|source| CacheError::Io { path: dir, source })?;
        Ok(json)
    }

    fn write_locked(&self, guard: LockGuard, json: &[u8], entries: usize) -> Result<(), CacheError> {
        let result = write_atomic(&self.dir(), self.path(), json).map_err(|source| CacheError::Io {
            path: self.config.path.clone(),
            source,
        });
        guard.release();

        result?;
        tracing::info!(path = %self.path().display(), entries, "cache saved");
        Ok(())
    }

    /// Deletes the cache file
    ///
    /// Returns `Ok(false)` if there was nothing to delete.
    pub fn clear(&self) -> Result<bool, CacheError> {
        if !self.dir().is_dir() {
            return Ok(false);
        }
        let guard = self.lock().acquire(&self.default_deadline())?;
        let result = fs::remove_file(self.path());
        guard.release();

        match result {
            Ok(()) => {
                tracing::info!(path = %self.path().display(), "cache cleared");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(CacheError::Io {
                path: self.config.path.clone(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::entry::Coordinates;
    use chrono::Utc;
    use std::time::Duration as StdDuration;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    fn create_test_store() -> (CacheStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = CacheConfig::with_path(temp_dir.path().join("cache.json"))
            .lock_timeout(StdDuration::from_millis(100))
            .poll_interval(StdDuration::from_millis(10));
        (CacheStore::new(config), temp_dir)
    }

    fn entry(city: &str, lat: f64, lon: f64, tz: &str) -> CacheEntry {
        CacheEntry::new(
            city,
            format!("{} (test)", city),
            Coordinates::new(lat, lon).expect("Valid coordinates"),
            tz,
            Utc::now(),
        )
    }

    #[test]
    fn test_lock_path_appends_suffix() {
        let store = CacheStore::at("/home/user/.sunmoon-cache.json");
        assert_eq!(
            store.lock_path(),
            PathBuf::from("/home/user/.sunmoon-cache.json.lock")
        );
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let (store, _temp_dir) = create_test_store();
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_load_corrupt_file_is_empty() {
        let (store, _temp_dir) = create_test_store();

        for garbage in [&b"not json at all"[..], b"{\"entries\": 42}", b"\xff\xfe\x00", b""] {
            fs::write(store.path(), garbage).expect("Should write garbage");
            assert!(store.load().is_empty(), "Garbage {:?} should load empty", garbage);
        }
    }

    #[test]
    fn test_load_empty_object_is_empty() {
        let (store, _temp_dir) = create_test_store();
        fs::write(store.path(), "{}").expect("Should write");
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_load_keeps_out_of_range_entries() {
        let (store, _temp_dir) = create_test_store();
        fs::write(
            store.path(),
            r#"{"entries": {"atlantis": {
                "city": "Atlantis", "normalized": "atlantis", "display_name": "Atlantis",
                "lat": 31.0, "lon": -200.0, "timezone_id": "UTC",
                "updated_at": "2025-01-01T00:00:00Z"
            }}}"#,
        )
        .expect("Should write");

        let doc = store.load();

        assert_eq!(doc.len(), 1);
        assert_eq!(doc.invalid_coordinates(), vec!["atlantis"]);
    }

    #[test]
    fn test_save_then_load_roundtrip() {
        let (store, _temp_dir) = create_test_store();
        let mut doc = CacheDocument::new();
        doc.upsert(entry("Beijing", 39.9042, 116.4074, "Asia/Shanghai"));
        doc.upsert(entry("Paris", 48.8566, 2.3522, "Europe/Paris"));

        store.save(&doc).expect("Save should succeed");
        let loaded = store.load();

        assert_eq!(loaded, doc);
        assert!(!store.lock_path().exists(), "Lock should be released after save");
    }

    #[test]
    fn test_save_is_deterministic() {
        let (store, _temp_dir) = create_test_store();
        let mut doc = CacheDocument::new();
        doc.upsert(entry("Shanghai", 31.23, 121.47, "Asia/Shanghai"));
        doc.upsert(entry("Guangzhou", 23.13, 113.26, "Asia/Shanghai"));

        store.save(&doc).expect("First save should succeed");
        let first = fs::read(store.path()).expect("Should read");
        store.save(&store.load()).expect("Second save should succeed");
        let second = fs::read(store.path()).expect("Should read");

        assert_eq!(first, second);
    }

    #[test]
    fn test_save_times_out_when_locked() {
        let (store, _temp_dir) = create_test_store();
        fs::write(store.lock_path(), "pid=1").expect("Should create lock");
        let mut doc = CacheDocument::new();
        doc.upsert(entry("Paris", 48.8566, 2.3522, "Europe/Paris"));

        let result = store.save(&doc);

        assert!(matches!(result, Err(CacheError::LockTimeout { .. })));
        assert!(!store.path().exists(), "Nothing should be written without the lock");
        assert_eq!(doc.len(), 1, "Caller's document is untouched");
    }

    #[test]
    fn test_failed_save_keeps_previous_file() {
        let (store, _temp_dir) = create_test_store();
        let mut doc = CacheDocument::new();
        doc.upsert(entry("Paris", 48.8566, 2.3522, "Europe/Paris"));
        store.save(&doc).expect("Save should succeed");
        let before = fs::read(store.path()).expect("Should read");

        fs::write(store.lock_path(), "pid=1").expect("Should create lock");
        doc.upsert(entry("Oslo", 59.91, 10.75, "Europe/Oslo"));
        assert!(store.save(&doc).is_err());

        assert_eq!(fs::read(store.path()).expect("Should read"), before);
    }

    #[test]
    fn test_upsert_merges_with_disk() {
        let (store, _temp_dir) = create_test_store();
        let other = CacheStore::new(store.config().clone());

        other
            .upsert(entry("Paris", 48.8566, 2.3522, "Europe/Paris"))
            .expect("Upsert should succeed");
        let written = store
            .upsert(entry("Oslo", 59.91, 10.75, "Europe/Oslo"))
            .expect("Upsert should succeed");

        assert_eq!(written.len(), 2);
        assert_eq!(store.load().len(), 2);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_upsert_with_waits_for_holder_on_same_runtime() {
        let (store, _temp_dir) = create_test_store();
        let held = store
            .lock()
            .acquire(&store.default_deadline())
            .expect("Lock should be free");

        tokio::spawn(async move {
            tokio::time::sleep(StdDuration::from_millis(30)).await;
            held.release();
        });

        let written = store
            .upsert_with(
                entry("Paris", 48.8566, 2.3522, "Europe/Paris"),
                &Deadline::after(StdDuration::from_secs(2)),
            )
            .await
            .expect("Upsert should succeed once the holder releases");

        assert_eq!(written.len(), 1);
        assert_eq!(store.load(), written);
    }

    #[tokio::test]
    async fn test_upsert_with_cancelled_deadline_writes_nothing() {
        let (store, _temp_dir) = create_test_store();
        fs::write(store.lock_path(), "pid=1").expect("Should create lock");

        let token = CancellationToken::new();
        token.cancel();
        let deadline = Deadline::after(StdDuration::from_secs(60)).with_cancellation(token);
        let result = store
            .upsert_with(entry("Paris", 48.8566, 2.3522, "Europe/Paris"), &deadline)
            .await;

        assert!(matches!(
            result,
            Err(CacheError::LockTimeout {
                reason: StopReason::Cancelled,
                ..
            })
        ));
        assert!(!store.path().exists());
    }

    #[test]
    fn test_clear_removes_file() {
        let (store, _temp_dir) = create_test_store();
        store
            .upsert(entry("Paris", 48.8566, 2.3522, "Europe/Paris"))
            .expect("Upsert should succeed");

        assert!(store.clear().expect("Clear should succeed"));
        assert!(!store.path().exists());
        assert!(!store.clear().expect("Second clear should succeed"));
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_save_creates_parent_directory() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("nested").join("cache.json");
        let store = CacheStore::at(&path);

        store.save(&CacheDocument::new()).expect("Save should succeed");

        assert!(path.exists());
    }
}
