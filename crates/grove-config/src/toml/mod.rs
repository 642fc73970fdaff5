//! grove.toml resolver settings parsing and serialization

use crate::ConfigResult;
use camino::{Utf8Path, Utf8PathBuf};
use grove_core::error::GroveError;
use grove_core::types::Remote;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Name of the settings file, both globally and per project
pub const SETTINGS_FILE: &str = "grove.toml";

/// Hard cap on concurrent archive downloads
pub const MAX_DOWNLOAD_THREADS: usize = 8;

/// Longest accepted mirror refresh interval, one week
pub const MAX_REFRESH_MINUTES: u64 = 7 * 24 * 60;

/// Resolver settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Root of the on-disk package store
    #[serde(default = "default_storage_dir")]
    pub storage_dir: Utf8PathBuf,

    /// Skip the local mirror and always ask the registry
    #[serde(default)]
    pub force_server_query: bool,

    /// Requested fetch workers; raised to host parallelism, capped at 8
    #[serde(default = "default_download_threads")]
    pub max_download_threads: usize,

    /// Registries in priority order
    #[serde(default = "default_remotes")]
    pub remotes: Vec<Remote>,

    /// Local catalog mirror
    #[serde(default)]
    pub mirror: MirrorSettings,

    /// Catalog query transport
    #[serde(default)]
    pub http: HttpSettings,
}

/// Local catalog mirror settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorSettings {
    /// Where the snapshot and its version file are published; defaults to `{first remote}/mirror`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Local mirror directory; defaults to `{storage_dir}/etc/mirror`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<Utf8PathBuf>,

    /// Minutes between version checks
    #[serde(default = "default_refresh_minutes")]
    pub refresh_minutes: u64,
}

/// Catalog query transport settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpSettings {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Attempts per remote before it is given up
    #[serde(default = "default_retries")]
    pub retries: u32,
}

fn default_storage_dir() -> Utf8PathBuf {
    dirs::home_dir()
        .and_then(|home| Utf8PathBuf::try_from(home).ok())
        .unwrap_or_else(|| Utf8PathBuf::from("."))
        .join(".grove")
        .join("storage")
}

fn default_download_threads() -> usize {
    MAX_DOWNLOAD_THREADS
}

fn default_remotes() -> Vec<Remote> {
    vec![Remote::default()]
}

fn default_refresh_minutes() -> u64 {
    15
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_timeout() -> u64 {
    10
}

fn default_retries() -> u32 {
    3
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            force_server_query: false,
            max_download_threads: default_download_threads(),
            remotes: default_remotes(),
            mirror: MirrorSettings::default(),
            http: HttpSettings::default(),
        }
    }
}

impl Default for MirrorSettings {
    fn default() -> Self {
        Self {
            url: None,
            dir: None,
            refresh_minutes: default_refresh_minutes(),
        }
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            timeout_secs: default_timeout(),
            retries: default_retries(),
        }
    }
}

impl Settings {
    /// Local mirror directory
    pub fn mirror_dir(&self) -> Utf8PathBuf {
        self.mirror
            .dir
            .clone()
            .unwrap_or_else(|| self.storage_dir.join("etc").join("mirror"))
    }

    /// Base URL the mirror snapshot is downloaded from
    pub fn mirror_url(&self) -> String {
        match &self.mirror.url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => {
                let base = self
                    .remotes
                    .first()
                    .map(|r| r.url.as_str())
                    .unwrap_or(grove_core::types::remote::DEFAULT_REMOTE_URL);
                format!("{}/mirror", base.trim_end_matches('/'))
            }
        }
    }
}

/// Parse TOML string to Settings
pub fn parse_settings(content: &str) -> ConfigResult<Settings> {
    let settings: Settings = toml::from_str(content).map_err(|e| GroveError::TomlParse {
        file: SETTINGS_FILE.to_string(),
        message: e.to_string(),
    })?;

    validate_settings(&settings)?;

    Ok(settings)
}

/// Serialize Settings to a TOML string
pub fn serialize_settings(settings: &Settings) -> ConfigResult<String> {
    toml::to_string_pretty(settings).map_err(|e| GroveError::TomlParse {
        file: SETTINGS_FILE.to_string(),
        message: format!("serialization error: {}", e),
    })
}

/// Validate settings completeness
pub fn validate_settings(settings: &Settings) -> ConfigResult<()> {
    if settings.remotes.is_empty() {
        return Err(GroveError::ConfigValidation {
            field: "remotes".to_string(),
            reason: "At least one remote is required".to_string(),
        });
    }

    let mut names = HashSet::new();
    for remote in &settings.remotes {
        if remote.name.is_empty() {
            return Err(GroveError::ConfigValidation {
                field: "remotes.name".to_string(),
                reason: format!("Remote '{}' has an empty name", remote.url),
            });
        }
        if !names.insert(remote.name.as_str()) {
            return Err(GroveError::ConfigValidation {
                field: "remotes.name".to_string(),
                reason: format!("Duplicate remote name '{}'", remote.name),
            });
        }
        validate_url(&format!("remotes.{}.url", remote.name), &remote.url)?;
    }

    if let Some(url) = &settings.mirror.url {
        validate_url("mirror.url", url)?;
    }

    if settings.mirror.refresh_minutes == 0 || settings.mirror.refresh_minutes > MAX_REFRESH_MINUTES {
        return Err(GroveError::ConfigValidation {
            field: "mirror.refresh_minutes".to_string(),
            reason: format!("Must be between 1 and {}", MAX_REFRESH_MINUTES),
        });
    }

    if settings.max_download_threads == 0 {
        return Err(GroveError::ConfigValidation {
            field: "max_download_threads".to_string(),
            reason: "Must be at least 1".to_string(),
        });
    }

    if settings.http.retries == 0 {
        return Err(GroveError::ConfigValidation {
            field: "http.retries".to_string(),
            reason: "Must be at least 1".to_string(),
        });
    }

    Ok(())
}

fn validate_url(field: &str, value: &str) -> ConfigResult<()> {
    let parsed = url::Url::parse(value).map_err(|e| GroveError::ConfigValidation {
        field: field.to_string(),
        reason: format!("Invalid URL '{}': {}", value, e),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(GroveError::ConfigValidation {
            field: field.to_string(),
            reason: format!("Unsupported URL scheme '{}'", other),
        }),
    }
}

/// Load and parse settings from file path
pub async fn load_from_file(path: &Utf8Path) -> ConfigResult<Settings> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| GroveError::io(format!("Failed to read {}", path), e))?;

    parse_settings(&content).map_err(|e| match e {
        GroveError::TomlParse { message, .. } => GroveError::TomlParse {
            file: path.to_string(),
            message,
        },
        other => other,
    })
}
