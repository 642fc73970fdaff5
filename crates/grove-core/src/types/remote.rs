//! Registry endpoints and the origin of catalog data.

use super::Package;
use serde::{Deserialize, Serialize};

pub const DEFAULT_REMOTE_NAME: &str = "origin";
pub const DEFAULT_REMOTE_URL: &str = "https://packages.grove.dev";
pub const DEFAULT_DATA_DIR: &str = "data";
/// File name used by primary (hash-addressed) archive sources
pub const ARCHIVE_NAME: &str = "package.tar.gz";
pub const ARCHIVE_EXTENSION: &str = ".tar.gz";

/// One named registry endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Remote {
    pub name: String,
    /// Base URL serving the catalog API and the data directory
    pub url: String,
    /// Directory under `url` holding path-addressed archives
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Hash-addressed archive URL templates; `{hash}` and `{archive}` are substituted
    #[serde(default)]
    pub primary_sources: Vec<String>,
}

fn default_data_dir() -> String {
    DEFAULT_DATA_DIR.to_string()
}

impl Remote {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            data_dir: default_data_dir(),
            primary_sources: Vec::new(),
        }
    }

    pub fn with_primary_source(mut self, template: impl Into<String>) -> Self {
        self.primary_sources.push(template.into());
        self
    }

    fn base(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    /// `{url}/api/{endpoint}`
    pub fn api_url(&self, endpoint: &str) -> String {
        format!("{}/api/{}", self.base(), endpoint)
    }

    /// Hash-addressed archive URLs, tried first
    pub fn primary_urls(&self, package: &Package) -> Vec<String> {
        let hash = package.hash();
        self.primary_sources
            .iter()
            .map(|t| t.replace("{hash}", &hash).replace("{archive}", ARCHIVE_NAME))
            .collect()
    }

    /// Archive served by the registry itself, addressed by path and version
    pub fn secondary_url(&self, package: &Package) -> String {
        format!(
            "{}/{}/{}/{}{}",
            self.base(),
            self.data_dir.trim_matches('/'),
            package.path.fs_path(),
            package.version,
            ARCHIVE_EXTENSION
        )
    }

    /// Every candidate URL in the order they are attempted
    pub fn download_urls(&self, package: &Package) -> Vec<String> {
        let mut urls = self.primary_urls(package);
        urls.push(self.secondary_url(package));
        urls
    }
}

impl Default for Remote {
    fn default() -> Self {
        Self::new(DEFAULT_REMOTE_NAME, DEFAULT_REMOTE_URL)
    }
}

/// Where the catalog data of a resolution pass came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogSource {
    /// Periodically synced local mirror; hashes may lag behind the registry
    Local,
    /// Authoritative registry response
    Remote,
}

impl CatalogSource {
    pub fn is_local(self) -> bool {
        self == Self::Local
    }
}
