//! Dual-source catalog lookup.
//!
//! A query is answered from the local mirror when allowed, otherwise from
//! the configured remotes in priority order. The LOCAL to REMOTE switch
//! happens at most once per top-level query and never goes back.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use grove_config::Settings;
use grove_core::error::GroveError;
use grove_core::types::{CatalogIndex, CatalogSource, Flags, Package, ProjectPath, Remote};
use grove_registry::RegistryClient;
use tracing::{info, warn};

use crate::closure::ClosureBuilder;
use crate::mirror::MirrorSync;
use crate::ResolverResult;

/// A resolved closure together with where it came from
#[derive(Debug, Clone)]
pub struct CatalogAnswer {
    pub index: CatalogIndex,
    /// Remote the archives are downloaded from
    pub remote: Remote,
    pub source: CatalogSource,
}

/// Catalog dispatch over the local mirror and the remotes
#[derive(Debug, Clone)]
pub struct PackageCatalog {
    client: RegistryClient,
    remotes: Vec<Remote>,
    mirror: MirrorSync,
    force_server_query: bool,
    /// Mirror rows newer than this were published too recently to trust
    young_cutoff: DateTime<Utc>,
}

impl PackageCatalog {
    pub fn new(
        settings: &Settings,
        client: RegistryClient,
        session_start: DateTime<Utc>,
    ) -> ResolverResult<Self> {
        let mirror = MirrorSync::from_settings(settings, client.clone())?;
        // one interval to publish the mirror, one during which it may lag
        let young_cutoff = mirror
            .refresh()
            .checked_add(&mirror.refresh())
            .and_then(|lag| session_start.checked_sub_signed(lag))
            .ok_or_else(|| GroveError::ConfigValidation {
                field: "mirror.refresh_minutes".to_string(),
                reason: format!(
                    "{} minutes reaches past the supported time range",
                    settings.mirror.refresh_minutes
                ),
            })?;
        Ok(Self {
            mirror,
            client,
            remotes: settings.remotes.clone(),
            force_server_query: settings.force_server_query,
            young_cutoff,
        })
    }

    pub fn remotes(&self) -> &[Remote] {
        &self.remotes
    }

    /// Source the first attempt of a query uses
    pub fn initial_source(&self) -> CatalogSource {
        if self.force_server_query {
            CatalogSource::Remote
        } else {
            CatalogSource::Local
        }
    }

    /// Resolve `requested`, preferring the local mirror.
    ///
    /// Any failure of the local query (unknown package, young package,
    /// unreadable mirror) falls through to the remotes.
    pub async fn find_dependencies(&self, requested: &[Package]) -> ResolverResult<CatalogAnswer> {
        self.find_dependencies_from(requested, self.initial_source()).await
    }

    /// Resolve `requested` starting at `source`
    pub async fn find_dependencies_from(
        &self,
        requested: &[Package],
        source: CatalogSource,
    ) -> ResolverResult<CatalogAnswer> {
        if source.is_local() {
            match self.query_local(requested).await {
                Ok(answer) => return Ok(answer),
                Err(e) => warn!("Cannot get dependencies from local mirror: {}", e),
            }
        }
        self.query_remotes(requested).await
    }

    async fn query_local(&self, requested: &[Package]) -> ResolverResult<CatalogAnswer> {
        let remote = self.primary_remote()?.clone();
        let mirror = self.mirror.open().await?;
        let index = ClosureBuilder::new(&mirror)
            .with_young_cutoff(self.young_cutoff)
            .build(requested)?;
        Ok(CatalogAnswer {
            index,
            remote,
            source: CatalogSource::Local,
        })
    }

    /// Ask each remote in turn; protocol incompatibility stops the walk
    async fn query_remotes(&self, requested: &[Package]) -> ResolverResult<CatalogAnswer> {
        let mut last_error = None;
        for remote in &self.remotes {
            if self.remotes.len() > 1 {
                info!("Trying {} remote", remote.name);
            }
            match self.client.find_dependencies(remote, requested).await {
                Ok(index) => {
                    return Ok(CatalogAnswer {
                        index: mark_direct(index, requested),
                        remote: remote.clone(),
                        source: CatalogSource::Remote,
                    })
                }
                Err(e) if e.advances_remote() => {
                    warn!("{}", e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or_else(no_remotes))
    }

    fn primary_remote(&self) -> ResolverResult<&Remote> {
        self.remotes.first().ok_or_else(no_remotes)
    }
}

/// Flag the entries answering a request as direct.
///
/// A requested path missing from the answer was an aggregate; its
/// children are the direct entries.
fn mark_direct(index: CatalogIndex, requested: &[Package]) -> CatalogIndex {
    let returned: HashSet<ProjectPath> = index.entries().map(|e| e.package.path.clone()).collect();
    index
        .into_iter()
        .map(|mut entry| {
            let direct = requested.iter().any(|r| {
                r.path == entry.package.path
                    || (!returned.contains(&r.path) && r.path.is_root_of(&entry.package.path))
            });
            if direct {
                entry.package.flags |= Flags::DIRECT_DEPENDENCY;
            }
            entry
        })
        .collect()
}

fn no_remotes() -> GroveError {
    GroveError::ConfigValidation {
        field: "remotes".to_string(),
        reason: "no remotes configured".to_string(),
    }
}
