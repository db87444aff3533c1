//! Disk-backed object cache with one file per key

use crate::error::{CacheError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Time-to-live used by [`ObjectCache::default`]: one hour.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// A cache that stores one bincode-encoded value per file under a root
/// directory.
///
/// Every operation acquires the instance-wide lock before touching the
/// filesystem, so no two operations interleave their disk work against the
/// same instance. Waiters acquire the lock in FIFO order. Once the lock is
/// held, the disk work runs as one unit on the blocking pool and finishes
/// even if the caller drops the operation's future.
///
/// The time-to-live is carried as configuration for an external expiration
/// policy; no operation here enforces it.
pub struct ObjectCache {
    /// Directory holding one file per key, created lazily on first write.
    root: PathBuf,
    ttl: Duration,
    lock: Arc<Mutex<()>>,
}

impl ObjectCache {
    pub fn new(root: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            root: root.into(),
            ttl,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Root directory all entry files live under.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Configured time-to-live. Reserved for callers; never enforced here.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Encode `value` and store it under `key`, replacing any existing
    /// entry for that key.
    ///
    /// The root directory (and its parents) are created if absent. The
    /// replacement is remove-then-write: a crash between the two steps
    /// leaves the key absent.
    pub async fn write<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let path = self.entry_path(key)?;
        let bytes = bincode::serialize(value).map_err(CacheError::Encode)?;
        let root = self.root.clone();
        let key = key.to_string();
        self.run_locked(move || {
            fs::create_dir_all(&root)?;
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
            fs::write(&path, &bytes)?;
            debug!(key = %key, size = bytes.len(), "Stored entry");
            Ok(())
        })
        .await
    }

    /// Read the entry stored under `key` and decode it into `T`.
    ///
    /// Fails with [`CacheError::NotFound`] if no entry exists, and with
    /// [`CacheError::Decode`] if the file contents do not decode into `T`.
    pub async fn read<T>(&self, key: &str) -> Result<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let path = self.entry_path(key)?;
        let key = key.to_string();
        self.run_locked(move || {
            let bytes = match fs::read(&path) {
                Ok(bytes) => bytes,
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    return Err(CacheError::NotFound(key));
                }
                Err(err) => return Err(err.into()),
            };
            bincode::deserialize(&bytes).map_err(|source| CacheError::Decode { key, source })
        })
        .await
    }

    /// Remove the entry stored under `key`. Removing an absent key is a
    /// no-op success.
    pub async fn clean(&self, key: &str) -> Result<()> {
        let path = self.entry_path(key)?;
        let key = key.to_string();
        self.run_locked(move || match fs::remove_file(&path) {
            Ok(()) => {
                debug!(key = %key, "Removed entry");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        })
        .await
    }

    /// Remove every entry directly under the root directory.
    ///
    /// A missing root directory is a no-op success. The first removal that
    /// fails aborts the rest and surfaces as [`CacheError::PartialClear`];
    /// entries removed before the failure stay removed.
    pub async fn clean_all(&self) -> Result<()> {
        let root = self.root.clone();
        self.run_locked(move || {
            let entries = match fs::read_dir(&root) {
                Ok(entries) => entries,
                Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
                Err(err) => return Err(err.into()),
            };
            let mut removed = 0usize;
            for entry in entries {
                let entry = entry.map_err(|source| CacheError::PartialClear { removed, source })?;
                if let Err(source) = fs::remove_file(entry.path()) {
                    return Err(CacheError::PartialClear { removed, source });
                }
                removed += 1;
            }
            debug!(removed, "Cleared cache");
            Ok(())
        })
        .await
    }

    /// Report whether an entry exists for `key`.
    pub async fn contains(&self, key: &str) -> Result<bool> {
        let path = self.entry_path(key)?;
        self.run_locked(move || match fs::metadata(&path) {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        })
        .await
    }

    /// Acquire the instance lock, then run `op` as one unit on the
    /// blocking pool. The guard moves into the task, so the lock is held
    /// until the disk work finishes regardless of caller cancellation.
    async fn run_locked<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let guard = Arc::clone(&self.lock).lock_owned().await;
        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            op()
        })
        .await
        .map_err(|err| CacheError::Io(std::io::Error::new(ErrorKind::Other, err)))?
    }

    fn entry_path(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

impl Default for ObjectCache {
    /// Cache rooted at the current working directory with [`DEFAULT_TTL`].
    fn default() -> Self {
        Self::new(".", DEFAULT_TTL)
    }
}

/// Keys become file names verbatim, so anything that could name a
/// directory or escape the root is rejected up front.
fn validate_key(key: &str) -> Result<()> {
    let reason = if key.is_empty() {
        "must not be empty"
    } else if key.contains('/') || key.contains('\\') {
        "must not contain path separators"
    } else if key == "." || key == ".." {
        "must not be a directory reference"
    } else {
        return Ok(());
    };
    Err(CacheError::InvalidKey {
        key: key.to_string(),
        reason,
    })
}
