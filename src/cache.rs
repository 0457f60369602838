//! On-disk response cache.
//!
//! Each (query, filter set) pair maps to one JSON file in the cache
//! directory. The file name is the SHA-256 of the [`CacheKey`], so arbitrary
//! query text never reaches the filesystem. Entries embed an absolute
//! `expires_at`; stale entries are removed lazily on read or in bulk by
//! [`CacheStore::sweep`].
//!
//! Writes go to a temporary sibling first and are renamed into place, so a
//! concurrent reader sees either the old entry or the new one, never a torn
//! file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

use crate::filters::FilterSet;
use crate::record::Record;
use crate::ttl;

const ENTRY_EXTENSION: &str = "json";

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised by cache operations.
///
/// Only directory-level failures surface from [`CacheStore::get`]; unreadable
/// or corrupt entries are reported as misses.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to create cache directory {}: {source}", .path.display())]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("failed to list cache directory {}: {source}", .path.display())]
    List { path: PathBuf, source: io::Error },

    #[error("failed to serialize cache entry: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("failed to write cache entry {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to remove cache entry {}: {source}", .path.display())]
    Remove { path: PathBuf, source: io::Error },
}

// ============================================================================
// Keys and Entries
// ============================================================================

/// Deterministic identity of one cached response.
///
/// Rendered as a JSON array of the query followed by `[field, value]` pairs
/// in lexicographic field order, which keeps distinct inputs distinct even
/// when they contain separator characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn derive(query: &str, filters: &FilterSet) -> Self {
        let mut parts = Vec::with_capacity(filters.len() + 1);
        parts.push(Value::String(query.to_string()));
        for (field, value) in filters.iter() {
            parts.push(Value::Array(vec![
                Value::String(field.to_string()),
                Value::String(value.to_string()),
            ]));
        }
        Self(Value::Array(parts).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name of the entry stored under this key.
    pub fn file_name(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        format!("{}.{ENTRY_EXTENSION}", hex::encode(digest))
    }
}

/// A cached result set with its lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub records: Vec<Record>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(key: &CacheKey, records: Vec<Record>, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            key: key.as_str().to_string(),
            records,
            created_at: now,
            expires_at: ttl::compute_expires_at(now, ttl),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        ttl::is_expired(self.expires_at, now)
    }
}

// ============================================================================
// Cache Store
// ============================================================================

/// Flat-file cache rooted at a single directory.
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
    ttl: Duration,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            ttl,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Path of the entry file for a query.
    pub fn entry_path(&self, query: &str, filters: &FilterSet) -> PathBuf {
        self.dir.join(CacheKey::derive(query, filters).file_name())
    }

    /// Look up a cached result set. `None` is a miss.
    pub fn get(&self, query: &str, filters: &FilterSet) -> Result<Option<Vec<Record>>, CacheError> {
        self.get_at(query, filters, Utc::now())
    }

    /// [`get`](Self::get) evaluated at an explicit instant.
    ///
    /// An entry found expired at `now` is deleted before reporting the miss.
    pub fn get_at(
        &self,
        query: &str,
        filters: &FilterSet,
        now: DateTime<Utc>,
    ) -> Result<Option<Vec<Record>>, CacheError> {
        self.ensure_dir()?;

        let key = CacheKey::derive(query, filters);
        let path = self.dir.join(key.file_name());

        let Some(entry) = read_entry(&path) else {
            return Ok(None);
        };

        if entry.is_expired(now) {
            debug!(key = key.as_str(), expires_at = %entry.expires_at, "cache entry expired");
            if let Err(e) = remove_entry(&path) {
                warn!(error = %e, "failed to remove expired cache entry");
            }
            return Ok(None);
        }

        if entry.key != key.as_str() {
            warn!(
                path = %path.display(),
                stored = %entry.key,
                "cache entry key mismatch, ignoring"
            );
            return Ok(None);
        }

        Ok(Some(entry.records))
    }

    /// Store a result set, replacing any previous entry for the same key.
    pub fn put(&self, query: &str, filters: &FilterSet, records: &[Record]) -> Result<(), CacheError> {
        self.put_at(query, filters, records, Utc::now())
    }

    /// [`put`](Self::put) with an explicit creation instant.
    pub fn put_at(
        &self,
        query: &str,
        filters: &FilterSet,
        records: &[Record],
        now: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        self.ensure_dir()?;

        let key = CacheKey::derive(query, filters);
        let path = self.dir.join(key.file_name());
        // Match percentages are per-search and never persisted.
        let stored = records
            .iter()
            .cloned()
            .map(|mut record| {
                record.match_percent = None;
                record
            })
            .collect();
        let entry = CacheEntry::new(&key, stored, now, self.ttl);
        let bytes = serde_json::to_vec(&entry).map_err(CacheError::Serialize)?;

        let tmp = path.with_extension(format!("{}.tmp", std::process::id()));
        fs::write(&tmp, bytes).map_err(|source| CacheError::Write {
            path: tmp.clone(),
            source,
        })?;
        if let Err(source) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(CacheError::Write { path, source });
        }

        debug!(key = key.as_str(), records = records.len(), expires_at = %entry.expires_at, "cached result set");
        Ok(())
    }

    /// Remove every expired entry. Returns the number removed.
    pub fn sweep(&self) -> Result<usize, CacheError> {
        self.sweep_at(Utc::now())
    }

    /// [`sweep`](Self::sweep) evaluated at an explicit instant.
    ///
    /// Unreadable or corrupt entries are skipped and left in place.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> Result<usize, CacheError> {
        let mut removed = 0;
        for path in self.entry_files()? {
            let Some(entry) = read_entry(&path) else {
                continue;
            };
            if !entry.is_expired(now) {
                continue;
            }
            match remove_entry(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!(error = %e, "failed to remove expired cache entry"),
            }
        }
        debug!(removed, "swept expired cache entries");
        Ok(removed)
    }

    /// Delete every entry regardless of expiry. Returns the number removed.
    pub fn clear(&self) -> Result<usize, CacheError> {
        let mut removed = 0;
        for path in self.entry_files()? {
            remove_entry(&path)?;
            removed += 1;
        }
        debug!(removed, "cleared cache");
        Ok(removed)
    }

    fn ensure_dir(&self) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir).map_err(|source| CacheError::CreateDir {
            path: self.dir.clone(),
            source,
        })
    }

    fn entry_files(&self) -> Result<Vec<PathBuf>, CacheError> {
        self.ensure_dir()?;
        let list_err = |source| CacheError::List {
            path: self.dir.clone(),
            source,
        };

        let mut files = Vec::new();
        for dir_entry in fs::read_dir(&self.dir).map_err(list_err)? {
            let path = match dir_entry {
                Ok(dir_entry) => dir_entry.path(),
                Err(e) => {
                    warn!(error = %e, "skipping unreadable cache directory entry");
                    continue;
                }
            };
            if path.is_file() && path.extension().is_some_and(|ext| ext == ENTRY_EXTENSION) {
                files.push(path);
            }
        }
        Ok(files)
    }
}

/// Load an entry file. Missing, unreadable and corrupt files all read as `None`.
fn read_entry(path: &Path) -> Option<CacheEntry> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "unreadable cache entry");
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(entry) => Some(entry),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "corrupt cache entry");
            None
        }
    }
}

fn remove_entry(path: &Path) -> Result<(), CacheError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(CacheError::Remove {
            path: path.to_path_buf(),
            source,
        }),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::FilterSet;

    fn setup_store(ttl: Duration) -> (CacheStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().join("cache"), ttl);
        (store, dir)
    }

    fn state(code: &str) -> FilterSet {
        let mut filters = FilterSet::new();
        filters.insert("BN_STATE_OF_REG", code);
        filters
    }

    fn records(names: &[&str]) -> Vec<Record> {
        names
            .iter()
            .map(|n| Record {
                name: Some(n.to_string()),
                ..Record::default()
            })
            .collect()
    }

    // --- CacheKey ---

    #[test]
    fn test_key_is_deterministic() {
        let a = CacheKey::derive("acme", &state("NSW"));
        let b = CacheKey::derive("acme", &state("NSW"));
        assert_eq!(a, b);
        assert_eq!(a.file_name(), b.file_name());
    }

    #[test]
    fn test_key_ignores_filter_insertion_order() {
        let mut first = FilterSet::new();
        first.insert("BN_STATUS", "Registered");
        first.insert("BN_STATE_OF_REG", "NSW");
        let mut second = FilterSet::new();
        second.insert("BN_STATE_OF_REG", "NSW");
        second.insert("BN_STATUS", "Registered");
        assert_eq!(CacheKey::derive("acme", &first), CacheKey::derive("acme", &second));
    }

    #[test]
    fn test_distinct_inputs_do_not_collide() {
        let mut split = FilterSet::new();
        split.insert("b", "c");
        let inputs = vec![
            ("acme", state("NSW")),
            ("acme", state("VIC")),
            ("acme", FilterSet::new()),
            ("acme ", FilterSet::new()),
            ("Acme", FilterSet::new()),
            ("a_b_c", FilterSet::new()),
            ("a", split),
            ("", FilterSet::new()),
        ];
        let mut names: Vec<String> = inputs
            .iter()
            .map(|(q, f)| CacheKey::derive(q, f).file_name())
            .collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), inputs.len());
    }

    #[test]
    fn test_file_name_is_hex_json() {
        let name = CacheKey::derive("acme/../etc", &FilterSet::new()).file_name();
        assert!(name.ends_with(".json"));
        assert_eq!(name.len(), 64 + 5);
        assert!(name[..64].chars().all(|c| c.is_ascii_hexdigit()));
    }

    // --- get / put ---

    #[test]
    fn test_get_miss_on_empty_store() {
        let (store, _dir) = setup_store(Duration::minutes(10));
        assert!(store.get("acme", &FilterSet::new()).unwrap().is_none());
    }

    #[test]
    fn test_put_then_get_round_trip() {
        let (store, _dir) = setup_store(Duration::minutes(10));
        let filters = state("NSW");
        let data = records(&["Acme Pty Ltd", "Acme Holdings"]);

        store.put("acme", &filters, &data).unwrap();
        assert_eq!(store.get("acme", &filters).unwrap(), Some(data));
        assert!(store.get("acme", &state("VIC")).unwrap().is_none());
    }

    #[test]
    fn test_put_overwrites_previous_entry() {
        let (store, _dir) = setup_store(Duration::minutes(10));
        let filters = FilterSet::new();
        store.put("acme", &filters, &records(&["Old"])).unwrap();
        store.put("acme", &filters, &records(&["New"])).unwrap();
        assert_eq!(store.get("acme", &filters).unwrap(), Some(records(&["New"])));
    }

    #[test]
    fn test_entry_records_ttl() {
        let (store, _dir) = setup_store(Duration::minutes(7));
        let now = Utc::now();
        store.put_at("acme", &FilterSet::new(), &[], now).unwrap();

        let bytes = fs::read(store.entry_path("acme", &FilterSet::new())).unwrap();
        let entry: CacheEntry = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(entry.created_at, now);
        assert_eq!(entry.expires_at - entry.created_at, Duration::minutes(7));
    }

    #[test]
    fn test_get_valid_at_expiry_instant() {
        let (store, _dir) = setup_store(Duration::minutes(10));
        let now = Utc::now();
        store.put_at("acme", &FilterSet::new(), &records(&["A"]), now).unwrap();
        let at_deadline = now + Duration::minutes(10);
        assert!(store.get_at("acme", &FilterSet::new(), at_deadline).unwrap().is_some());
    }

    #[test]
    fn test_expired_get_is_miss_and_deletes_entry() {
        let (store, _dir) = setup_store(Duration::zero());
        let filters = state("NSW");
        let now = Utc::now();
        store.put_at("acme", &filters, &records(&["A"]), now).unwrap();
        let path = store.entry_path("acme", &filters);
        assert!(path.exists());

        let later = now + Duration::milliseconds(1);
        assert!(store.get_at("acme", &filters, later).unwrap().is_none());
        assert!(!path.exists());
    }

    #[test]
    fn test_corrupt_entry_is_miss() {
        let (store, _dir) = setup_store(Duration::minutes(10));
        let filters = FilterSet::new();
        store.put("acme", &filters, &records(&["A"])).unwrap();
        fs::write(store.entry_path("acme", &filters), b"{not json").unwrap();
        assert!(store.get("acme", &filters).unwrap().is_none());
    }

    #[test]
    fn test_put_drops_match_percent() {
        let (store, _dir) = setup_store(Duration::minutes(10));
        let mut ranked = records(&["Acme"]);
        ranked[0].match_percent = Some("100.00%".to_string());
        store.put("acme", &FilterSet::new(), &ranked).unwrap();
        assert_eq!(store.get("acme", &FilterSet::new()).unwrap(), Some(records(&["Acme"])));
    }

    #[test]
    fn test_put_leaves_no_temp_files() {
        let (store, _dir) = setup_store(Duration::minutes(10));
        store.put("acme", &FilterSet::new(), &records(&["A"])).unwrap();
        let names: Vec<String> = fs::read_dir(store.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].ends_with(".json"));
    }

    #[test]
    fn test_uncreatable_dir_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"x").unwrap();
        let store = CacheStore::new(blocker.join("cache"), Duration::minutes(10));
        assert!(matches!(
            store.get("acme", &FilterSet::new()),
            Err(CacheError::CreateDir { .. })
        ));
    }

    // --- sweep / clear ---

    #[test]
    fn test_sweep_empty_store() {
        let (store, _dir) = setup_store(Duration::minutes(10));
        assert_eq!(store.sweep().unwrap(), 0);
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let (store, _dir) = setup_store(Duration::minutes(10));
        let now = Utc::now();
        store.put_at("old", &FilterSet::new(), &records(&["Old"]), now - Duration::minutes(30)).unwrap();
        store.put_at("fresh", &FilterSet::new(), &records(&["Fresh"]), now).unwrap();
        store.put_at("edge", &FilterSet::new(), &records(&["Edge"]), now - Duration::minutes(10)).unwrap();

        assert_eq!(store.sweep_at(now).unwrap(), 1);
        assert!(!store.entry_path("old", &FilterSet::new()).exists());
        assert_eq!(
            store.get_at("fresh", &FilterSet::new(), now).unwrap(),
            Some(records(&["Fresh"]))
        );
        assert_eq!(
            store.get_at("edge", &FilterSet::new(), now).unwrap(),
            Some(records(&["Edge"]))
        );
    }

    #[test]
    fn test_sweep_skips_corrupt_and_foreign_files() {
        let (store, _dir) = setup_store(Duration::minutes(10));
        let now = Utc::now();
        store.put_at("old", &FilterSet::new(), &[], now - Duration::hours(1)).unwrap();
        fs::write(store.dir().join("broken.json"), b"garbage").unwrap();
        fs::write(store.dir().join("notes.txt"), b"keep me").unwrap();

        assert_eq!(store.sweep_at(now).unwrap(), 1);
        assert!(store.dir().join("broken.json").exists());
        assert!(store.dir().join("notes.txt").exists());
    }

    #[test]
    fn test_clear_removes_everything() {
        let (store, _dir) = setup_store(Duration::minutes(10));
        store.put("a", &FilterSet::new(), &records(&["A"])).unwrap();
        store.put("b", &state("WA"), &records(&["B"])).unwrap();
        fs::write(store.dir().join("notes.txt"), b"keep me").unwrap();

        assert_eq!(store.clear().unwrap(), 2);
        assert!(store.get("a", &FilterSet::new()).unwrap().is_none());
        assert!(store.get("b", &state("WA")).unwrap().is_none());
        assert!(store.dir().join("notes.txt").exists());
    }
}
