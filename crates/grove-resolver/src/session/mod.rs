//! One resolution session: catalog query, cycle check, fetch, publish.
//!
//! A session remembers every package it resolved so repeated requests for
//! the same dependency neither query a catalog nor touch the network, and
//! publishes one [`PackageConfig`] per unpacked package. When the store
//! disagrees with a LOCAL-sourced hash the whole batch is resolved again
//! against the registry, once.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use camino::Utf8PathBuf;
use chrono::Utc;
use grove_cache::{FetchOutcome, Fetcher, PackageStore};
use grove_config::{PackageManifest, Settings};
use grove_core::error::GroveError;
use grove_core::types::{CatalogEntry, CatalogIndex, CatalogSource, Package, ProjectPath};
use grove_core::utils::sha256_hex;
use grove_registry::RegistryClient;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogAnswer, PackageCatalog};
use crate::graph::DependencyGraph;
use crate::ResolverResult;


/// Everything known about one package of the session
#[derive(Debug, Clone)]
pub struct PackageConfig {
    pub package: Package,
    /// Unpacked sources; `None` for projects that live outside the store
    pub source_dir: Option<Utf8PathBuf>,
    pub manifest: PackageManifest,
    /// Resolved dependencies keyed by project path
    pub dependencies: BTreeMap<ProjectPath, Package>,
}

impl PackageConfig {
    fn local(package: Package) -> Self {
        Self {
            package,
            source_dir: None,
            manifest: PackageManifest::default(),
            dependencies: BTreeMap::new(),
        }
    }
}

#[derive(Debug)]
pub struct ResolverSession {
    catalog: PackageCatalog,
    fetcher: Fetcher,
    client: RegistryClient,
    packages: BTreeMap<Package, PackageConfig>,
    catalog_index: CatalogIndex,
    /// Requested spec -> concrete package
    resolved: BTreeMap<Package, Package>,
    /// Root aggregate request -> the children it stood for
    expansions: BTreeMap<Package, Vec<Package>>,
    local_only: BTreeSet<ProjectPath>,
    downloads: usize,
}

impl ResolverSession {
    pub fn new(settings: &Settings) -> ResolverResult<Self> {
        let client = RegistryClient::with_settings(&settings.http)?;
        let store = PackageStore::new(settings.storage_dir.clone());
        let fetcher = Fetcher::new(store, client.clone(), settings.max_download_threads);
        let catalog = PackageCatalog::new(settings, client.clone(), Utc::now())?;

        Ok(Self {
            catalog,
            fetcher,
            client,
            packages: BTreeMap::new(),
            catalog_index: CatalogIndex::new(),
            resolved: BTreeMap::new(),
            expansions: BTreeMap::new(),
            local_only: BTreeSet::new(),
            downloads: 0,
        })
    }

    /// Register a project that is built from the working tree, never fetched
    pub fn add_local_project(&mut self, path: ProjectPath) {
        self.local_only.insert(path);
    }

    pub fn store(&self) -> &PackageStore {
        self.fetcher.store()
    }

    pub fn packages(&self) -> impl Iterator<Item = &PackageConfig> {
        self.packages.values()
    }

    pub fn config(&self, package: &Package) -> Option<&PackageConfig> {
        self.packages.get(package)
    }

    /// Catalog answer of the most recent resolution pass
    pub fn catalog_index(&self) -> &CatalogIndex {
        &self.catalog_index
    }

    pub fn is_resolved(&self, request: &Package) -> bool {
        self.resolved.contains_key(request) || self.expansions.contains_key(request)
    }

    /// Packages `request` resolved to: one, or every child of an aggregate
    pub fn resolutions_of(&self, request: &Package) -> Vec<Package> {
        if let Some(package) = self.resolved.get(request) {
            return vec![package.clone()];
        }
        self.expansions.get(request).cloned().unwrap_or_default()
    }

    /// Packages downloaded since the session started
    pub fn download_count(&self) -> usize {
        self.downloads
    }

    /// Resolve `dependencies` and rewrite them in `owner`'s config
    pub async fn resolve(&mut self, owner: &Package, dependencies: &[Package]) -> ResolverResult<()> {
        self.resolve_dependencies(dependencies).await?;
        self.assign_dependencies(owner, dependencies)
    }

    /// Resolve, fetch and publish every package needed by `requested`
    pub async fn resolve_dependencies(&mut self, requested: &[Package]) -> ResolverResult<()> {
        let pending: Vec<Package> = requested
            .iter()
            .filter(|p| !p.is_local() && !self.local_only.contains(&p.path) && !self.is_resolved(p))
            .cloned()
            .collect();
        if pending.is_empty() {
            debug!("All {} requested packages already resolved", requested.len());
            return Ok(());
        }

        info!("Resolving {} package(s)...", pending.len());
        let mut answer = self.catalog.find_dependencies(&pending).await?;
        let (order, report) = loop {
            let order = DependencyGraph::from_index(&answer.index).publication_order();
            let entries: Vec<CatalogEntry> = answer.index.entries().cloned().collect();
            match self.fetcher.fetch_all(&entries, &answer.remote, answer.source).await {
                Ok(report) => break (order, report),
                Err(e) if e.is_stale_local() && answer.source.is_local() => {
                    warn!("Local catalog data is stale ({}), resolving against the registry", e);
                    answer = self
                        .catalog
                        .find_dependencies_from(&pending, CatalogSource::Remote)
                        .await?;
                }
                Err(e) => return Err(e),
            }
        };

        for entry in answer.index.entries() {
            if report.outcome(entry.id) == Some(FetchOutcome::Waited) {
                debug!("{} was fetched by another process", entry.package);
            }
        }
        let downloaded = report.downloaded();
        self.downloads += downloaded.len();
        if answer.source.is_local() && !downloaded.is_empty() {
            self.client.report_downloads(&answer.remote, &downloaded).await;
        }

        self.record_resolutions(&pending, &answer);
        self.publish(&answer.index, &order)?;
        self.catalog_index = answer.index;
        Ok(())
    }

    fn record_resolutions(&mut self, pending: &[Package], answer: &CatalogAnswer) {
        let direct: Vec<&CatalogEntry> = answer.index.direct().collect();
        for request in pending {
            if let Some(exact) = direct.iter().find(|e| e.package.path == request.path) {
                self.resolved.insert(request.clone(), exact.package.clone());
                self.resolved.insert(exact.package.clone(), exact.package.clone());
                continue;
            }

            let children: Vec<Package> = direct
                .iter()
                .filter(|e| request.path.is_root_of(&e.package.path))
                .map(|e| e.package.clone())
                .collect();
            if children.is_empty() {
                warn!("{} was not part of the catalog answer", request);
                continue;
            }
            for child in &children {
                self.resolved.insert(child.clone(), child.clone());
            }
            self.expansions.insert(request.clone(), children);
        }
    }

    /// Publish configs dependencies first; an already published package keeps its config
    fn publish(&mut self, index: &CatalogIndex, order: &[Package]) -> ResolverResult<()> {
        let by_package: HashMap<&Package, &CatalogEntry> =
            index.entries().map(|e| (&e.package, e)).collect();

        for package in order {
            let Some(entry) = by_package.get(package) else {
                continue;
            };
            if self.packages.contains_key(&entry.package) {
                continue;
            }

            let source_dir = self.fetcher.store().src_dir(&entry.package);
            let manifest = PackageManifest::load_from_dir(source_dir.as_std_path())?;
            let dependencies = index
                .dependencies_of(entry)
                .map(|d| (d.package.path.clone(), d.package.clone()))
                .collect();

            debug!("Published {}", entry.package);
            self.packages.insert(
                entry.package.clone(),
                PackageConfig {
                    package: entry.package.clone(),
                    source_dir: Some(source_dir),
                    manifest,
                    dependencies,
                },
            );
        }
        Ok(())
    }

    /// Rewrite `owner`'s dependency list with what the session resolved.
    ///
    /// Versions are replaced by the concrete ones, flags are OR'd and an
    /// aggregate request is replaced by its children.
    fn assign_dependencies(&mut self, owner: &Package, dependencies: &[Package]) -> ResolverResult<()> {
        let config = self
            .packages
            .entry(owner.clone())
            .or_insert_with(|| PackageConfig::local(owner.clone()));

        let mut unresolved = Vec::new();
        for dependency in dependencies {
            if dependency.is_local() || self.local_only.contains(&dependency.path) {
                config
                    .dependencies
                    .entry(dependency.path.clone())
                    .or_insert_with(|| dependency.clone());
                continue;
            }

            if let Some(resolved) = self.resolved.get(dependency) {
                let slot = config
                    .dependencies
                    .entry(dependency.path.clone())
                    .or_insert_with(|| dependency.clone());
                slot.version = resolved.version.clone();
                slot.flags |= dependency.flags | resolved.flags;
            } else if let Some(children) = self.expansions.get(dependency) {
                config.dependencies.remove(&dependency.path);
                for child in children {
                    let slot = config
                        .dependencies
                        .entry(child.path.clone())
                        .or_insert_with(|| child.clone());
                    slot.flags |= dependency.flags | child.flags;
                }
            } else {
                unresolved.push(dependency.to_string());
            }
        }

        if unresolved.is_empty() {
            Ok(())
        } else {
            Err(GroveError::UnresolvedPackages {
                packages: unresolved,
            })
        }
    }

    /// Resolve a command-line target such as `org.x.lib`, `org.x.lib-1.2` or `org.x.lib-master`.
    ///
    /// Without a version the latest numbered release is taken, falling back
    /// to the `master` branch when the project has none.
    pub async fn resolve_target(&mut self, target: &str) -> ResolverResult<Vec<Package>> {
        if target.contains('-') {
            let package = Package::parse_target(target)?;
            self.resolve_dependencies(std::slice::from_ref(&package)).await?;
            return Ok(self.resolutions_of(&package));
        }

        let latest = Package::parse_target(&format!("{}-*", target))?;
        match self.resolve_dependencies(std::slice::from_ref(&latest)).await {
            Ok(()) => Ok(self.resolutions_of(&latest)),
            Err(e) if retry_on_master(&e) => {
                debug!("No release of {} ({}), trying master", target, e);
                let master = Package::parse_target(&format!("{}-master", target))?;
                self.resolve_dependencies(std::slice::from_ref(&master)).await?;
                Ok(self.resolutions_of(&master))
            }
            Err(e) => Err(e),
        }
    }

    /// Whether the consumer identified by `key` must rebuild.
    ///
    /// True when anything was downloaded during the session or when the
    /// published closure differs from the one recorded for `key`.
    pub fn check_rebuild(&self, key: &str) -> ResolverResult<bool> {
        let digest = self.closure_digest();
        let store = self.fetcher.store();
        let changed = store.read_marker(key)?.as_deref() != Some(digest.as_str());
        if changed {
            store.write_marker(key, &digest)?;
        }
        Ok(changed || self.downloads > 0)
    }

    fn closure_digest(&self) -> String {
        let mut lines = String::new();
        for config in self.packages.values() {
            lines.push_str(&config.package.target_name());
            for dependency in config.dependencies.values() {
                lines.push(' ');
                lines.push_str(&dependency.target_name());
            }
            lines.push('\n');
        }
        sha256_hex(lines.as_bytes())
    }
}

fn retry_on_master(error: &GroveError) -> bool {
    error.is_no_such_version()
        || matches!(
            error,
            GroveError::RegistryRejected { .. } | GroveError::UnresolvedPackages { .. }
        )
}
