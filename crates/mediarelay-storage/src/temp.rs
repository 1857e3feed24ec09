//! Transient file namespace
//!
//! Every file the relay writes lives in one scratch directory owned by a
//! [`TempStore`]. A [`TransientFile`] is the only handle to such a file and it
//! removes the file exactly once: through [`TransientFile::release`] on the
//! normal path, or from `Drop` when the owning task unwinds or is cancelled.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use tokio::fs;
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};

const DEFAULT_EXTENSION: &str = "tmp";
const MAX_EXTENSION_LEN: usize = 8;

struct Inner {
    dir: PathBuf,
    /// Paths owned by a live `TransientFile`; the sweep leaves them alone.
    active: Mutex<HashSet<PathBuf>>,
    allocated: AtomicU64,
    released: AtomicU64,
}

impl Inner {
    fn finish(&self, path: &Path) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path);
        self.released.fetch_add(1, Ordering::SeqCst);
    }

    fn is_active(&self, path: &Path) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(path)
    }
}

/// Counters describing the store's lifetime activity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TempStoreStats {
    pub allocated: u64,
    pub released: u64,
    pub active: usize,
}

/// Outcome of one sweep pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub deleted: usize,
    pub skipped_active: usize,
    pub failed: usize,
}

/// Owner of the scratch directory
#[derive(Clone)]
pub struct TempStore {
    inner: Arc<Inner>,
}

impl TempStore {
    /// Create the store, creating `dir` if it does not exist yet.
    pub async fn new(dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let dir = dir.into();

        fs::create_dir_all(&dir).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create temp directory {}: {}",
                dir.display(),
                e
            ))
        })?;

        Ok(TempStore {
            inner: Arc::new(Inner {
                dir,
                active: Mutex::new(HashSet::new()),
                allocated: AtomicU64::new(0),
                released: AtomicU64::new(0),
            }),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    /// Reserve a collision-resistant path for a new file. Nothing is written
    /// to disk until the caller opens the path.
    pub fn allocate(&self, extension: &str) -> TransientFile {
        let extension = sanitize_extension(extension);
        let name = format!(
            "{}-{}.{}",
            Utc::now().timestamp_millis(),
            Uuid::new_v4().simple(),
            extension
        );
        let path = self.inner.dir.join(name);

        self.inner
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.clone());
        self.inner.allocated.fetch_add(1, Ordering::SeqCst);

        tracing::debug!(path = %path.display(), "Allocated transient file");

        TransientFile {
            path,
            created_at: Utc::now(),
            size_bytes: 0,
            released: false,
            store: self.inner.clone(),
        }
    }

    pub fn stats(&self) -> TempStoreStats {
        TempStoreStats {
            allocated: self.inner.allocated.load(Ordering::SeqCst),
            released: self.inner.released.load(Ordering::SeqCst),
            active: self
                .inner
                .active
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
        }
    }

    /// Delete every file in the scratch directory last modified more than
    /// `max_age` ago, except files still owned by an in-flight transfer.
    #[tracing::instrument(skip(self), fields(dir = %self.inner.dir.display()))]
    pub async fn sweep(&self, max_age: Duration) -> StorageResult<SweepReport> {
        let mut report = SweepReport::default();
        let mut entries = fs::read_dir(&self.inner.dir).await?;
        let now = SystemTime::now();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let metadata = match entry.metadata().await {
                Ok(m) if m.is_file() => m,
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to stat transient file");
                    report.failed += 1;
                    continue;
                }
            };
            report.scanned += 1;

            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or(Duration::ZERO);

            if age <= max_age {
                continue;
            }

            if self.inner.is_active(&path) {
                tracing::warn!(
                    path = %path.display(),
                    age_secs = age.as_secs(),
                    "Stale transient file still in use, leaving it"
                );
                report.skipped_active += 1;
                continue;
            }

            match fs::remove_file(&path).await {
                Ok(()) => report.deleted += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to delete stale transient file");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}

/// A file in the scratch directory, owned by exactly one transfer
pub struct TransientFile {
    path: PathBuf,
    created_at: DateTime<Utc>,
    size_bytes: u64,
    released: bool,
    store: Arc<Inner>,
}

impl std::fmt::Debug for TransientFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransientFile")
            .field("path", &self.path)
            .field("created_at", &self.created_at)
            .field("size_bytes", &self.size_bytes)
            .finish()
    }
}

impl TransientFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn set_size_bytes(&mut self, size_bytes: u64) {
        self.size_bytes = size_bytes;
    }

    /// File extension chosen at allocation time
    pub fn extension(&self) -> &str {
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or(DEFAULT_EXTENSION)
    }

    /// Delete the file. Deletion errors are logged and swallowed; a file that
    /// was never written is not an error.
    pub async fn release(mut self) {
        self.released = true;

        match fs::remove_file(&self.path).await {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), size_bytes = self.size_bytes, "Released transient file")
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to delete transient file")
            }
        }

        self.store.finish(&self.path);
    }
}

impl Drop for TransientFile {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "Removed unreleased transient file on drop")
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to delete transient file on drop")
            }
        }

        self.store.finish(&self.path);
    }
}

fn sanitize_extension(extension: &str) -> String {
    let cleaned: String = extension
        .trim_start_matches('.')
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(MAX_EXTENSION_LEN)
        .collect::<String>()
        .to_lowercase();

    if cleaned.is_empty() {
        DEFAULT_EXTENSION.to_string()
    } else {
        cleaned
    }
}
