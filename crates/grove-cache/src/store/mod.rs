//! On-disk package store layout.
//!
//! ```text
//! storage/
//!   src/<ab>/<cd>/<efgh>/              unpacked package sources
//!   etc/stamps/packages/<ab>/<cd>/<efgh>   last verified archive hash
//!   etc/stamps/deps/<key>              resolved-closure digest per consumer
//!   tmp/                               in-flight archives and unpack staging
//! ```

use camino::{Utf8Path, Utf8PathBuf};
use grove_core::error::GroveError;
use grove_core::types::{CatalogEntry, Package};
use std::fs;
use std::io::ErrorKind;

use crate::CacheResult;

/// Package store rooted at the storage directory
#[derive(Debug, Clone)]
pub struct PackageStore {
    root: Utf8PathBuf,
}

impl PackageStore {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Unpacked sources of a package
    pub fn src_dir(&self, package: &Package) -> Utf8PathBuf {
        self.root.join("src").join(package.hash_path())
    }

    /// Stamp file recording the last verified archive hash
    pub fn stamp_file(&self, package: &Package) -> Utf8PathBuf {
        self.root
            .join("etc")
            .join("stamps")
            .join("packages")
            .join(package.hash_path())
    }

    pub fn tmp_dir(&self) -> Utf8PathBuf {
        self.root.join("tmp")
    }

    /// Where the archive of a package is downloaded to before unpacking
    pub fn archive_path(&self, package: &Package) -> Utf8PathBuf {
        self.tmp_dir().join(format!("{}.tar.gz", package.fs_hash()))
    }

    /// Where a package is unpacked before it is moved to `src_dir`
    pub fn staging_dir(&self, package: &Package) -> Utf8PathBuf {
        self.tmp_dir().join(format!("{}.unpack", package.fs_hash()))
    }

    /// Rebuild marker for one consumer of the store
    pub fn deps_marker(&self, key: &str) -> Utf8PathBuf {
        self.root.join("etc").join("stamps").join("deps").join(key)
    }

    pub fn read_stamp(&self, package: &Package) -> CacheResult<Option<String>> {
        read_trimmed(&self.stamp_file(package))
    }

    pub fn write_stamp(&self, package: &Package, hash: &str) -> CacheResult<()> {
        write_creating_parent(&self.stamp_file(package), hash)
    }

    pub fn remove_stamp(&self, package: &Package) -> CacheResult<()> {
        remove_file_if_exists(&self.stamp_file(package))
    }

    /// The sources exist and were verified against `entry.hash`
    pub fn is_satisfied(&self, entry: &CatalogEntry) -> CacheResult<bool> {
        if entry.hash.is_empty() || !self.src_dir(&entry.package).exists() {
            return Ok(false);
        }
        Ok(self.read_stamp(&entry.package)?.as_deref() == Some(entry.hash.as_str()))
    }

    /// Drop the unpacked sources of a package
    pub fn remove_package(&self, package: &Package) -> CacheResult<()> {
        remove_dir_if_exists(&self.src_dir(package))
    }

    pub fn remove_staging(&self, package: &Package) -> CacheResult<()> {
        remove_dir_if_exists(&self.staging_dir(package))
    }

    /// Move a fully prepared staging directory into place as the package sources
    pub fn promote_staging(&self, package: &Package) -> CacheResult<()> {
        let staging = self.staging_dir(package);
        let dir = self.src_dir(package);
        if let Some(parent) = dir.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| GroveError::io(format!("Failed to create {}", parent), e))?;
        }
        fs::rename(&staging, &dir)
            .map_err(|e| GroveError::io(format!("Failed to move {} to {}", staging, dir), e))
    }

    pub fn read_marker(&self, key: &str) -> CacheResult<Option<String>> {
        read_trimmed(&self.deps_marker(key))
    }

    pub fn write_marker(&self, key: &str, digest: &str) -> CacheResult<()> {
        write_creating_parent(&self.deps_marker(key), digest)
    }
}

fn read_trimmed(path: &Utf8Path) -> CacheResult<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => {
            let content = content.trim();
            Ok((!content.is_empty()).then(|| content.to_string()))
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(GroveError::io(format!("Failed to read {}", path), e)),
    }
}

fn write_creating_parent(path: &Utf8Path, content: &str) -> CacheResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| GroveError::io(format!("Failed to create {}", parent), e))?;
    }
    fs::write(path, content).map_err(|e| GroveError::io(format!("Failed to write {}", path), e))
}

fn remove_dir_if_exists(dir: &Utf8Path) -> CacheResult<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(GroveError::io(format!("Failed to remove {}", dir), e)),
    }
}

pub(crate) fn remove_file_if_exists(path: &Utf8Path) -> CacheResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(GroveError::io(format!("Failed to remove {}", path), e)),
    }
}
