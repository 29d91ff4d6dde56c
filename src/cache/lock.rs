//! Per-cache-entry advisory file locks
//!
//! Non-blocking exclusive locks on `<entry>.lock` files. Contention is a
//! first-class outcome, not an error: it means another process is already
//! populating the entry and this one should no-op. Lock files are never
//! deleted (removal races with concurrent acquirers; a stale file is
//! harmless).

use crate::error::{MonoError, MonoResult};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// An acquired exclusive cache-entry lock, released on drop
#[derive(Debug)]
pub struct CacheLock {
    file: File,
    path: PathBuf,
}

impl CacheLock {
    /// Try to acquire the lock guarding `cache_path`.
    ///
    /// Returns `Ok(Some(lock))` when acquired, `Ok(None)` when another
    /// process holds it, and an error for anything else.
    pub fn acquire(cache_path: &Path) -> MonoResult<Option<Self>> {
        let lock_path = lock_file_path(cache_path);

        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                MonoError::io(format!("creating lock directory {}", parent.display()), e)
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| MonoError::io(format!("opening lock file {}", lock_path.display()), e))?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!("Acquired cache lock: {}", lock_path.display());
                Ok(Some(Self {
                    file,
                    path: lock_path,
                }))
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                debug!("Cache lock contended: {}", lock_path.display());
                Ok(None)
            }
            Err(e) => Err(MonoError::io(
                format!("locking {}", lock_path.display()),
                e,
            )),
        }
    }

    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        if let Err(e) = fs2::FileExt::unlock(&self.file) {
            debug!("Failed to unlock {}: {}", self.path.display(), e);
        }
    }
}

/// The lock file sits alongside the entry directory: `<entry>.lock`
pub fn lock_file_path(cache_path: &Path) -> PathBuf {
    let mut os = cache_path.as_os_str().to_owned();
    os.push(".lock");
    PathBuf::from(os)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn lock_path_is_sibling() {
        let path = lock_file_path(Path::new("/cache/proj/cargo/abc123"));
        assert_eq!(path, Path::new("/cache/proj/cargo/abc123.lock"));
    }

    #[test]
    fn acquire_creates_parent_and_lock_file() {
        let dir = TempDir::new().unwrap();
        let entry = dir.path().join("proj/cargo/abc123");

        let lock = CacheLock::acquire(&entry).unwrap();
        assert!(lock.is_some());
        assert!(entry.parent().unwrap().exists());
        assert!(lock_file_path(&entry).exists());
    }

    #[test]
    fn second_acquire_in_process_contends() {
        let dir = TempDir::new().unwrap();
        let entry = dir.path().join("entry");

        let first = CacheLock::acquire(&entry).unwrap();
        assert!(first.is_some());

        // flock is per-open-file: a second descriptor in the same process
        // observes the held lock just like another process would
        let second = CacheLock::acquire(&entry).unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn drop_releases_lock() {
        let dir = TempDir::new().unwrap();
        let entry = dir.path().join("entry");

        {
            let _held = CacheLock::acquire(&entry).unwrap().unwrap();
        }

        let reacquired = CacheLock::acquire(&entry).unwrap();
        assert!(reacquired.is_some());
    }

    #[test]
    fn stale_lock_file_is_harmless() {
        let dir = TempDir::new().unwrap();
        let entry = dir.path().join("entry");
        std::fs::write(lock_file_path(&entry), b"").unwrap();

        let lock = CacheLock::acquire(&entry).unwrap();
        assert!(lock.is_some());
    }
}
