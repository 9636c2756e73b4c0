//! Time-bounded response cache, injected into the HTTP fetcher.
//!
//! Two implementations:
//! - [`MemoryCache`] for a single process run
//! - [`DiskCache`] for reuse across runs. Layout: `{dir}/{blake3(key)}.json`,
//!   written atomically (`.tmp` then rename). Read or write failures are
//!   logged and behave as a miss; the cache never fails a fetch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// A cache of response bodies keyed by request URL (session parameters
/// stripped).
pub trait ResponseCache: Send + Sync {
    /// A fresh body for `key`, or `None` when absent or expired.
    fn get(&self, key: &str) -> Option<String>;

    /// Store `body` under `key`. Failures are swallowed; a cache that can't
    /// write just misses next time.
    fn put(&self, key: &str, body: &str);

    /// How long a stored body stays fresh.
    fn ttl(&self) -> Duration;
}

/// In-process cache, gone when the process exits. Expired entries are
/// dropped lazily on the next `put`.
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (Instant, String)>>,
    ttl: Duration,
}

impl MemoryCache {
    /// Empty cache whose entries stay fresh for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Stored entries, expired ones included until the next `put` purges them.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResponseCache for MemoryCache {
    fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().ok()?;
        entries
            .get(key)
            .filter(|(stored, _)| stored.elapsed() < self.ttl)
            .map(|(_, body)| body.clone())
    }

    fn put(&self, key: &str, body: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.retain(|_, (stored, _)| stored.elapsed() < self.ttl);
            entries.insert(key.to_string(), (Instant::now(), body.to_string()));
        }
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredResponse {
    key: String,
    stored_at: DateTime<Utc>,
    body: String,
}

/// Summary of what is on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiskCacheStatus {
    pub entries: usize,
    pub expired: usize,
    pub bytes: u64,
}

/// One JSON file per entry under `dir`, shared across runs.
pub struct DiskCache {
    dir: PathBuf,
    ttl: Duration,
}

impl DiskCache {
    /// Cache rooted at `dir`. The directory is created on the first write.
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            ttl,
        }
    }

    /// Root directory of the cache files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let digest = blake3::hash(key.as_bytes()).to_hex();
        self.dir.join(format!("{digest}.json"))
    }

    fn is_fresh(&self, stored_at: DateTime<Utc>) -> bool {
        // Negative age (clock moved back) counts as fresh.
        (Utc::now() - stored_at)
            .to_std()
            .map(|age| age < self.ttl)
            .unwrap_or(true)
    }

    fn read_entry(path: &Path) -> io::Result<StoredResponse> {
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    fn write_entry(&self, key: &str, body: &str) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let stored = StoredResponse {
            key: key.to_string(),
            stored_at: Utc::now(),
            body: body.to_string(),
        };
        let json = serde_json::to_vec(&stored)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let path = self.entry_path(key);
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, json)?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            e
        })
    }

    fn cache_files(&self) -> io::Result<Vec<PathBuf>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                files.push(path);
            }
        }
        Ok(files)
    }

    pub fn status(&self) -> io::Result<DiskCacheStatus> {
        let mut status = DiskCacheStatus::default();
        for path in self.cache_files()? {
            status.entries += 1;
            status.bytes += fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            match Self::read_entry(&path) {
                Ok(stored) if self.is_fresh(stored.stored_at) => {}
                _ => status.expired += 1,
            }
        }
        Ok(status)
    }

    /// Remove every entry. Returns how many files were deleted.
    pub fn clear(&self) -> io::Result<usize> {
        let files = self.cache_files()?;
        for path in &files {
            fs::remove_file(path)?;
        }
        Ok(files.len())
    }

    /// Remove expired or unreadable entries only.
    pub fn purge_expired(&self) -> io::Result<usize> {
        let mut removed = 0;
        for path in self.cache_files()? {
            let keep = matches!(Self::read_entry(&path), Ok(s) if self.is_fresh(s.stored_at));
            if !keep {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

impl ResponseCache for DiskCache {
    fn get(&self, key: &str) -> Option<String> {
        let path = self.entry_path(key);
        if !path.exists() {
            return None;
        }
        match Self::read_entry(&path) {
            // A digest collision would hand back another URL's body.
            Ok(stored) if stored.key == key && self.is_fresh(stored.stored_at) => {
                debug!(key, "response cache hit");
                Some(stored.body)
            }
            Ok(_) => None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable cache entry, ignoring");
                None
            }
        }
    }

    fn put(&self, key: &str, body: &str) {
        if let Err(e) = self.write_entry(key, body) {
            warn!(dir = %self.dir.display(), error = %e, "failed to write response cache entry");
        }
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }
}
