//! Keeping the local mirror in step with the published snapshot.

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Duration, Utc};
use grove_cache::ScopedFileLock;
use grove_config::Settings;
use grove_core::error::GroveError;
use grove_registry::RegistryClient;
use tracing::{debug, info};

use super::{JsonMirror, CATALOG_FILE, LAST_SYNC_FILE, VERSION_FILE};
use crate::ResolverResult;

/// Downloads and refreshes the mirror directory
#[derive(Debug, Clone)]
pub struct MirrorSync {
    dir: Utf8PathBuf,
    url: String,
    refresh: Duration,
    client: RegistryClient,
}

impl MirrorSync {
    pub fn new(
        dir: impl Into<Utf8PathBuf>,
        url: impl Into<String>,
        refresh_minutes: u64,
        client: RegistryClient,
    ) -> ResolverResult<Self> {
        Ok(Self {
            dir: dir.into(),
            url: url.into().trim_end_matches('/').to_string(),
            refresh: refresh_interval(refresh_minutes)?,
            client,
        })
    }

    pub fn from_settings(settings: &Settings, client: RegistryClient) -> ResolverResult<Self> {
        Self::new(
            settings.mirror_dir(),
            settings.mirror_url(),
            settings.mirror.refresh_minutes,
            client,
        )
    }

    pub fn refresh(&self) -> Duration {
        self.refresh
    }

    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    /// Bring the mirror up to date and load it.
    ///
    /// Runs under an exclusive lock on the snapshot so concurrent
    /// processes neither download twice nor read a half-written file.
    pub async fn open(&self) -> ResolverResult<JsonMirror> {
        self.sync().await?;
        JsonMirror::open(&self.dir)
    }

    /// Download or refresh the snapshot if needed; `true` when new data arrived
    pub async fn sync(&self) -> ResolverResult<bool> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| GroveError::io(format!("Failed to create {}", self.dir), e))?;

        let target = self.dir.join(CATALOG_FILE).into_std_path_buf();
        let _lock = tokio::task::spawn_blocking(move || ScopedFileLock::acquire(&target))
            .await
            .map_err(|e| GroveError::Archive {
                message: format!("mirror lock wait failed: {}", e),
            })??;

        if !self.dir.join(CATALOG_FILE).exists() {
            info!("Downloading package catalog mirror...");
            let version = self.remote_version().await?;
            self.download(version).await?;
            return Ok(true);
        }

        if !self.is_outdated(Utc::now()).await {
            debug!("Mirror at {} is fresh", self.dir);
            return Ok(false);
        }

        let remote = self.remote_version().await?;
        let local = self.local_version().await;
        let updated = if local.map_or(true, |local| remote > local) {
            info!("Updating package catalog mirror to version {}...", remote);
            self.download(remote).await?;
            true
        } else {
            self.write_last_sync(Utc::now()).await?;
            false
        };
        Ok(updated)
    }

    /// Whether the last version check is older than the refresh interval
    pub async fn is_outdated(&self, now: DateTime<Utc>) -> bool {
        match self.last_sync().await {
            Some(last) => now - last > self.refresh,
            None => true,
        }
    }

    pub async fn last_sync(&self) -> Option<DateTime<Utc>> {
        let content = tokio::fs::read_to_string(self.dir.join(LAST_SYNC_FILE)).await.ok()?;
        DateTime::parse_from_rfc3339(content.trim())
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }

    async fn local_version(&self) -> Option<u64> {
        let content = tokio::fs::read_to_string(self.dir.join(VERSION_FILE)).await.ok()?;
        content.trim().parse().ok()
    }

    async fn remote_version(&self) -> ResolverResult<u64> {
        let url = format!("{}/{}", self.url, VERSION_FILE);
        let text = self.client.fetch_text(&url).await?;
        text.trim().parse().map_err(|_| GroveError::MirrorSchema {
            reason: format!("invalid data version '{}' at {}", text.trim(), url),
        })
    }

    /// Replace the snapshot; the new file is validated before it is moved into place
    async fn download(&self, version: u64) -> ResolverResult<()> {
        let url = format!("{}/{}", self.url, CATALOG_FILE);
        let staging = self.dir.join(format!("{}.part", CATALOG_FILE));
        self.client.download(&url, staging.as_std_path()).await?;

        let content = tokio::fs::read_to_string(&staging)
            .await
            .map_err(|e| GroveError::io(format!("Failed to read {}", staging), e))?;
        if let Err(e) = JsonMirror::parse(&content) {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(e);
        }

        let catalog = self.dir.join(CATALOG_FILE);
        tokio::fs::rename(&staging, &catalog)
            .await
            .map_err(|e| GroveError::io(format!("Failed to replace {}", catalog), e))?;
        write_file(&self.dir.join(VERSION_FILE), &version.to_string()).await?;
        self.write_last_sync(Utc::now()).await
    }

    async fn write_last_sync(&self, now: DateTime<Utc>) -> ResolverResult<()> {
        write_file(&self.dir.join(LAST_SYNC_FILE), &now.to_rfc3339()).await
    }
}

fn refresh_interval(minutes: u64) -> ResolverResult<Duration> {
    i64::try_from(minutes)
        .ok()
        .and_then(Duration::try_minutes)
        .ok_or_else(|| GroveError::ConfigValidation {
            field: "mirror.refresh_minutes".to_string(),
            reason: format!("{} minutes is out of range", minutes),
        })
}

async fn write_file(path: &Utf8Path, content: &str) -> ResolverResult<()> {
    tokio::fs::write(path, content)
        .await
        .map_err(|e| GroveError::io(format!("Failed to write {}", path), e))
}
