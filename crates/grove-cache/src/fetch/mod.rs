//! Concurrent download, verification and unpacking of resolved packages.
//!
//! Each package runs a strictly sequential pipeline
//! (lock, check, download, verify, unpack into staging, move into place, stamp)
//! while different packages run in parallel on a bounded worker pool.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use grove_config::{PackageManifest, MAX_DOWNLOAD_THREADS};
use grove_core::error::{FetchFailure, GroveError};
use grove_core::types::{CatalogEntry, CatalogSource, PackageVersionId, Remote};
use grove_registry::RegistryClient;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::lock::ScopedFileLock;
use crate::store::{remove_file_if_exists, PackageStore};
use crate::tarball::{relocate_into, unpack_file};
use crate::CacheResult;

/// How one package ended up present in the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Stamp already matched; nothing was transferred
    Satisfied,
    /// Another actor held the lock and finished the work
    Waited,
    Downloaded,
}

/// Per-package outcomes of one `fetch_all` call
#[derive(Debug, Clone, Default)]
pub struct FetchReport {
    outcomes: BTreeMap<PackageVersionId, FetchOutcome>,
}

impl FetchReport {
    pub fn outcome(&self, id: PackageVersionId) -> Option<FetchOutcome> {
        self.outcomes.get(&id).copied()
    }

    /// Ids of packages this call actually downloaded
    pub fn downloaded(&self) -> Vec<PackageVersionId> {
        self.outcomes
            .iter()
            .filter(|(_, o)| **o == FetchOutcome::Downloaded)
            .map(|(id, _)| *id)
            .collect()
    }
}

/// Worker pool size: the request raised to host parallelism, capped
pub fn worker_count(requested: usize) -> usize {
    let host = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    requested.max(host).min(MAX_DOWNLOAD_THREADS)
}

/// Downloads catalog entries into a [`PackageStore`]
#[derive(Debug, Clone)]
pub struct Fetcher {
    store: PackageStore,
    client: RegistryClient,
    workers: usize,
}

impl Fetcher {
    pub fn new(store: PackageStore, client: RegistryClient, requested_workers: usize) -> Self {
        Self {
            store,
            client,
            workers: worker_count(requested_workers),
        }
    }

    pub fn store(&self) -> &PackageStore {
        &self.store
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Fetch every entry; failures are isolated per package and reported together.
    ///
    /// When any package disagrees with a LOCAL-sourced hash the whole call fails
    /// with `StaleLocalCatalog` so the caller can re-resolve remotely.
    pub async fn fetch_all(
        &self,
        entries: &[CatalogEntry],
        remote: &Remote,
        source: CatalogSource,
    ) -> CacheResult<FetchReport> {
        if entries.is_empty() {
            return Ok(FetchReport::default());
        }

        let semaphore = Arc::new(Semaphore::new(self.workers));
        // One slot per package; tasks never write the same key
        let slots: Arc<DashMap<PackageVersionId, CacheResult<FetchOutcome>>> = Arc::new(DashMap::new());
        let mut tasks = JoinSet::new();

        for entry in entries.iter().cloned() {
            let fetcher = self.clone();
            let remote = remote.clone();
            let semaphore = Arc::clone(&semaphore);
            let slots = Arc::clone(&slots);
            tasks.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => fetcher.fetch_one(&entry, &remote, source).await,
                    Err(_) => Err(GroveError::Archive {
                        message: "fetch worker pool closed".to_string(),
                    }),
                };
                slots.insert(entry.id, result);
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                if e.is_panic() {
                    std::panic::resume_unwind(e.into_panic());
                }
            }
        }

        let mut report = FetchReport::default();
        let mut failures = Vec::new();
        for entry in entries {
            match slots.remove(&entry.id).map(|(_, r)| r) {
                Some(Ok(outcome)) => {
                    report.outcomes.insert(entry.id, outcome);
                }
                Some(Err(error)) => failures.push(FetchFailure {
                    package: entry.package.to_string(),
                    error: Box::new(error),
                }),
                None => failures.push(FetchFailure {
                    package: entry.package.to_string(),
                    error: Box::new(GroveError::Archive {
                        message: "fetch task was cancelled".to_string(),
                    }),
                }),
            }
        }

        if let Some(pos) = failures.iter().position(|f| f.error.is_stale_local()) {
            return Err(*failures.swap_remove(pos).error);
        }
        if !failures.is_empty() {
            return Err(GroveError::FetchFailed { failures });
        }
        Ok(report)
    }

    /// Run the pipeline for one package
    pub async fn fetch_one(
        &self,
        entry: &CatalogEntry,
        remote: &Remote,
        source: CatalogSource,
    ) -> CacheResult<FetchOutcome> {
        let package = &entry.package;
        if self.store.is_satisfied(entry)? {
            debug!("Already unpacked: {}", package);
            return Ok(FetchOutcome::Satisfied);
        }

        let stamp = self.store.stamp_file(package).into_std_path_buf();
        let (lock, waited) = match ScopedFileLock::try_acquire(&stamp)? {
            Some(lock) => (lock, false),
            None => {
                debug!("Waiting for another process to fetch {}", package);
                let lock = tokio::task::spawn_blocking(move || ScopedFileLock::acquire(&stamp))
                    .await
                    .map_err(|e| GroveError::Archive {
                        message: format!("lock wait for {} failed: {}", package, e),
                    })??;
                (lock, true)
            }
        };

        // Someone may have finished between the first check and the lock
        if self.store.is_satisfied(entry)? {
            return Ok(if waited {
                FetchOutcome::Waited
            } else {
                FetchOutcome::Satisfied
            });
        }

        let result = self.download_and_unpack(entry, remote, source).await;
        if result.is_err() {
            self.rollback(entry);
        }
        drop(lock);

        result.map(|()| FetchOutcome::Downloaded)
    }

    async fn download_and_unpack(
        &self,
        entry: &CatalogEntry,
        remote: &Remote,
        source: CatalogSource,
    ) -> CacheResult<()> {
        let package = &entry.package;
        self.store.remove_stamp(package)?;
        self.store.remove_package(package)?;
        // leftovers of an interrupted run
        self.store.remove_staging(package)?;

        let tmp = self.store.tmp_dir();
        tokio::fs::create_dir_all(&tmp)
            .await
            .map_err(|e| GroveError::io(format!("Failed to create {}", tmp), e))?;
        let archive = self.store.archive_path(package).into_std_path_buf();

        info!("Downloading: {}...", package);
        self.download_verified(entry, remote, source, &archive).await?;

        info!("Unpacking  : {}...", package);
        let staging = self.store.staging_dir(package).into_std_path_buf();
        tokio::task::spawn_blocking(move || -> CacheResult<()> {
            unpack_file(&archive, &staging)?;
            std::fs::remove_file(&archive)
                .map_err(|e| GroveError::io(format!("Failed to remove {}", archive.display()), e))?;

            let manifest = PackageManifest::load_from_dir(&staging)?;
            if let Some(unpack_directory) = manifest.unpack_directory {
                relocate_into(&staging, &unpack_directory)?;
            }
            Ok(())
        })
        .await
        .map_err(|e| GroveError::Archive {
            message: format!("unpack of {} failed: {}", package, e),
        })??;

        // The stamp goes last: a stamp on disk always means complete sources
        self.store.promote_staging(package)?;
        self.store.write_stamp(package, &entry.hash)
    }

    /// Try every source of `remote` until one yields the expected hash
    async fn download_verified(
        &self,
        entry: &CatalogEntry,
        remote: &Remote,
        source: CatalogSource,
        archive: &Path,
    ) -> CacheResult<()> {
        let package = &entry.package;
        let mut mismatch = false;
        let mut last_error = None;

        for url in remote.download_urls(package) {
            match self.client.download(&url, archive).await {
                Ok(actual) if actual == entry.hash => return Ok(()),
                Ok(actual) => {
                    let error = GroveError::HashMismatch {
                        package: package.to_string(),
                        expected: entry.hash.clone(),
                        actual,
                    };
                    // Authoritative hashes must match on the first archive served
                    if !source.is_local() {
                        return Err(error);
                    }
                    warn!("Hash mismatch for {} from {}, trying next source", package, url);
                    mismatch = true;
                    last_error = Some(error);
                }
                Err(error) => {
                    debug!("Download of {} from {} failed: {}", package, url, error);
                    last_error = Some(error);
                }
            }
        }

        if mismatch {
            return Err(GroveError::StaleLocalCatalog {
                package: package.to_string(),
            });
        }
        Err(last_error.unwrap_or_else(|| GroveError::TransportFailure {
            remote: remote.name.clone(),
            message: format!("no download source for {}", package),
            status: None,
            source: None,
        }))
    }

    /// Leave the package absent: no sources, no stamp, no staging, no archive
    fn rollback(&self, entry: &CatalogEntry) {
        let package = &entry.package;
        let cleanup = [
            self.store.remove_stamp(package),
            self.store.remove_package(package),
            self.store.remove_staging(package),
            remove_file_if_exists(&self.store.archive_path(package)),
        ];
        for result in cleanup {
            if let Err(e) = result {
                warn!("Cleanup after failed fetch of {} incomplete: {}", package, e);
            }
        }
    }
}

#[cfg(test)]
mod tests;
