//! Scoped advisory file locks.
//!
//! A lock guards one package (or the mirror) across threads and processes.
//! It lives in a sibling `<name>.lock` file and is released when the guard
//! is dropped, on every exit path.

use fs2::FileExt;
use grove_core::error::GroveError;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::CacheResult;

/// Held exclusive lock; unlocked on drop
#[derive(Debug)]
pub struct ScopedFileLock {
    file: File,
    path: PathBuf,
}

/// `<target>.lock` next to `target`
pub fn lock_path_for(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    target.with_file_name(name)
}

fn open_lock_file(target: &Path) -> CacheResult<(File, PathBuf)> {
    let path = lock_path_for(target);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            GroveError::io(format!("Failed to create lock directory {}", parent.display()), e)
        })?;
    }
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&path)
        .map_err(|e| GroveError::io(format!("Failed to open lock file {}", path.display()), e))?;
    Ok((file, path))
}

impl ScopedFileLock {
    /// Take the lock without waiting; `None` when another holder has it
    pub fn try_acquire(target: &Path) -> CacheResult<Option<Self>> {
        let (file, path) = open_lock_file(target)?;
        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!(path = %path.display(), "Acquired exclusive lock");
                Ok(Some(Self { file, path }))
            }
            Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => Ok(None),
            Err(e) => Err(GroveError::io(format!("Failed to lock {}", path.display()), e)),
        }
    }

    /// Block until the lock is ours
    pub fn acquire(target: &Path) -> CacheResult<Self> {
        let (file, path) = open_lock_file(target)?;
        file.lock_exclusive()
            .map_err(|e| GroveError::io(format!("Failed to lock {}", path.display()), e))?;
        debug!(path = %path.display(), "Acquired exclusive lock after waiting");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScopedFileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_path_for() {
        assert_eq!(
            lock_path_for(Path::new("/s/etc/stamps/ab/cd/ef12")),
            PathBuf::from("/s/etc/stamps/ab/cd/ef12.lock")
        );
    }

    #[test]
    fn test_contended_lock_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested").join("stamp");

        let held = ScopedFileLock::try_acquire(&target).unwrap().unwrap();
        assert!(held.path().exists());
        assert!(ScopedFileLock::try_acquire(&target).unwrap().is_none());

        drop(held);
        assert!(ScopedFileLock::try_acquire(&target).unwrap().is_some());
    }

    #[test]
    fn test_blocking_acquire_waits_for_release() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("stamp");

        let held = ScopedFileLock::try_acquire(&target).unwrap().unwrap();
        let waiter = {
            let target = target.clone();
            std::thread::spawn(move || ScopedFileLock::acquire(&target).map(|_| ()))
        };
        std::thread::sleep(std::time::Duration::from_millis(50));
        drop(held);
        waiter.join().unwrap().unwrap();
    }
}
