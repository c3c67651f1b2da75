//! # Persistence Backends
//!
//! A backend is an opaque key/blob store. Keys are chunk storage keys
//! (`"x:z"`), blobs are produced by [`crate::codec`].
//!
//! Backend calls are slow and fallible; the store retries them with
//! exponential backoff via [`retry_with_backoff`] and never holds a map
//! lock across one.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use geode_procedural::ChunkCoord;
use parking_lot::RwLock;

use crate::error::BackendError;

/// Key/blob storage for serialized chunks.
pub trait PersistenceBackend: Send + Sync {
    /// Returns the blob stored under `key`, or `None` if absent.
    ///
    /// # Errors
    ///
    /// Any backend failure. The caller may retry.
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError>;

    /// Stores `blob` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Any backend failure. The caller may retry.
    fn write(&self, key: &str, blob: &[u8]) -> Result<(), BackendError>;
}

/// In-memory backend with failure injection.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
    failing_writes: AtomicU32,
    failing_reads: AtomicU32,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl MemoryBackend {
    /// Empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` writes fail.
    pub fn fail_next_writes(&self, count: u32) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Makes the next `count` reads fail.
    pub fn fail_next_reads(&self, count: u32) {
        self.failing_reads.store(count, Ordering::SeqCst);
    }

    /// Read calls served, including failed ones.
    #[must_use]
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    /// Write calls served, including failed ones.
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Whether a blob is stored under `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.blobs.read().contains_key(key)
    }

    /// Copy of the blob stored under `key`.
    #[must_use]
    pub fn blob(&self, key: &str) -> Option<Vec<u8>> {
        self.blobs.read().get(key).cloned()
    }

    /// Replaces a stored blob directly, bypassing failure injection.
    pub fn insert_raw(&self, key: &str, blob: Vec<u8>) {
        self.blobs.write().insert(key.to_owned(), blob);
    }

    /// Number of stored blobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Decrements `counter` if positive; returns whether it was.
fn take_failure(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl PersistenceBackend for MemoryBackend {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.failing_reads) {
            return Err(BackendError::Unavailable(format!("injected read failure for {key}")));
        }
        Ok(self.blobs.read().get(key).cloned())
    }

    fn write(&self, key: &str, blob: &[u8]) -> Result<(), BackendError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.failing_writes) {
            return Err(BackendError::Unavailable(format!("injected write failure for {key}")));
        }
        self.blobs.write().insert(key.to_owned(), blob.to_vec());
        Ok(())
    }
}

/// One file per chunk under a root directory.
///
/// Writes go to a temporary file that is synced and renamed over the
/// target, so a crash leaves either the old or the new blob.
#[derive(Debug, Clone)]
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    /// File extension of chunk blobs.
    pub const EXTENSION: &'static str = "geoc";

    /// Opens (creating if needed) a backend rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Io` if the directory cannot be created.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, BackendError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the blob for `key`.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Unavailable` for keys that are not chunk
    /// storage keys.
    pub fn path_for(&self, key: &str) -> Result<PathBuf, BackendError> {
        let coord = ChunkCoord::from_storage_key(key)
            .ok_or_else(|| BackendError::Unavailable(format!("invalid chunk key {key:?}")))?;
        Ok(self.root.join(format!("{}_{}.{}", coord.x, coord.z, Self::EXTENSION)))
    }
}

impl PersistenceBackend for FileBackend {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        match fs::read(self.path_for(key)?) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &str, blob: &[u8]) -> Result<(), BackendError> {
        let path = self.path_for(key)?;
        let tmp = path.with_extension("tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(blob)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// Runs `op` up to `attempts` times, sleeping `base * 2^n` between tries.
///
/// Returns the last error once attempts are exhausted.
///
/// # Errors
///
/// The error of the final attempt.
pub fn retry_with_backoff<T>(
    what: &str,
    attempts: u32,
    base: Duration,
    mut op: impl FnMut() -> Result<T, BackendError>,
) -> Result<T, BackendError> {
    let attempts = attempts.max(1);
    let mut attempt = 0;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if attempt + 1 >= attempts => {
                tracing::error!(what, attempts, error = %e, "backend operation failed, giving up");
                return Err(e);
            }
            Err(e) => {
                let delay = base.saturating_mul(1 << attempt.min(16));
                tracing::warn!(what, attempt = attempt + 1, error = %e, ?delay, "backend operation failed, retrying");
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
                attempt += 1;
            }
        }
    }
}
