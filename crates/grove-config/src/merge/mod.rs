//! Configuration layering, fallback logic, and environment overrides

use crate::toml::{validate_settings, Settings, SETTINGS_FILE};
use crate::ConfigResult;
use camino::{Utf8Path, Utf8PathBuf};
use grove_core::error::GroveError;
use std::collections::HashMap;

/// Environment variable overriding `storage_dir`
pub const ENV_STORAGE_DIR: &str = "GROVE_STORAGE_DIR";
/// Environment variable overriding `force_server_query`
pub const ENV_FORCE_SERVER_QUERY: &str = "GROVE_FORCE_SERVER_QUERY";

/// Main configuration loading interface
pub struct ConfigLoader {
    /// Current working directory
    cwd: Utf8PathBuf,
}

/// Configuration source tracking
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// Global config file
    Global(Utf8PathBuf),
    /// Project grove.toml file
    Project(Utf8PathBuf),
    /// Environment variable
    Environment(String),
}

/// Configuration layering and merging
pub struct ConfigLayering;

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new(cwd: Utf8PathBuf) -> Self {
        Self { cwd }
    }

    /// Load settings from every layer: global, project, then environment
    pub async fn load(&self) -> ConfigResult<(Settings, Vec<ConfigSource>)> {
        let mut sources = Vec::new();

        let global = match self.global_config_path() {
            Some(path) if path.exists() => {
                let table = read_table(&path).await?;
                sources.push(ConfigSource::Global(path));
                Some(table)
            }
            _ => None,
        };

        let project = match self.find_config_path(SETTINGS_FILE) {
            Some(path) => {
                let table = read_table(&path).await?;
                sources.push(ConfigSource::Project(path));
                Some(table)
            }
            None => None,
        };

        let env_overrides = ConfigLayering::collect_env_overrides();
        sources.extend(env_overrides.keys().cloned().map(ConfigSource::Environment));

        let settings = ConfigLayering::merge_configs(global, project, &env_overrides)?;
        Ok((settings, sources))
    }

    /// Find configuration file in project (walks up directory tree)
    pub fn find_config_path(&self, filename: &str) -> Option<Utf8PathBuf> {
        let mut current = Some(self.cwd.as_path());

        while let Some(dir) = current {
            let config_path = dir.join(filename);
            if config_path.exists() {
                return Some(config_path);
            }
            current = dir.parent();
        }

        None
    }

    /// `~/.grove/grove.toml`
    pub fn global_config_path(&self) -> Option<Utf8PathBuf> {
        let home_dir = dirs::home_dir()?;
        let home = Utf8PathBuf::try_from(home_dir).ok()?;
        Some(home.join(".grove").join(SETTINGS_FILE))
    }
}

async fn read_table(path: &Utf8Path) -> ConfigResult<toml::Table> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| GroveError::io(format!("Failed to read {}", path), e))?;

    content.parse::<toml::Table>().map_err(|e| GroveError::TomlParse {
        file: path.to_string(),
        message: e.to_string(),
    })
}

impl ConfigLayering {
    /// Merge configuration layers; later layers win key by key
    pub fn merge_configs(
        global_config: Option<toml::Table>,
        project_config: Option<toml::Table>,
        env_overrides: &HashMap<String, String>,
    ) -> ConfigResult<Settings> {
        let mut merged = global_config.unwrap_or_default();
        if let Some(project) = project_config {
            merge_tables(&mut merged, project);
        }

        let mut settings: Settings =
            toml::Value::Table(merged)
                .try_into()
                .map_err(|e: toml::de::Error| GroveError::TomlParse {
                    file: SETTINGS_FILE.to_string(),
                    message: e.to_string(),
                })?;

        Self::apply_env_overrides(&mut settings, env_overrides)?;
        validate_settings(&settings)?;

        Ok(settings)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(
        settings: &mut Settings,
        overrides: &HashMap<String, String>,
    ) -> ConfigResult<()> {
        for (key, value) in overrides {
            match key.as_str() {
                ENV_STORAGE_DIR => {
                    settings.storage_dir = Utf8PathBuf::from(value);
                }
                ENV_FORCE_SERVER_QUERY => {
                    settings.force_server_query = parse_bool(value).ok_or_else(|| {
                        GroveError::ConfigValidation {
                            field: ENV_FORCE_SERVER_QUERY.to_string(),
                            reason: format!("Expected a boolean, got '{}'", value),
                        }
                    })?;
                }
                _ => {
                    // Unknown environment variable, ignore
                }
            }
        }

        Ok(())
    }

    /// Collect environment variable overrides
    pub fn collect_env_overrides() -> HashMap<String, String> {
        std::env::vars()
            .filter(|(key, _)| key == ENV_STORAGE_DIR || key == ENV_FORCE_SERVER_QUERY)
            .collect()
    }
}

fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
