//! Per-package manifest shipped inside an unpacked archive.
//!
//! Only the keys the resolver itself acts on are read; everything else in
//! the file belongs to the build front end.

use crate::toml::SETTINGS_FILE;
use crate::ConfigResult;
use grove_core::error::GroveError;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path};

/// Manifest file name inside a package source directory
pub const MANIFEST_FILE: &str = SETTINGS_FILE;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageManifest {
    /// Sub-directory the unpacked sources are moved into
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unpack_directory: Option<String>,
}

impl PackageManifest {
    pub fn parse(content: &str) -> ConfigResult<Self> {
        let manifest: Self = toml::from_str(content).map_err(|e| GroveError::TomlParse {
            file: MANIFEST_FILE.to_string(),
            message: e.to_string(),
        })?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Read the manifest from a package directory; a missing file is an empty manifest
    pub fn load_from_dir(dir: &Path) -> ConfigResult<Self> {
        let path = dir.join(MANIFEST_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)
            .map_err(|e| GroveError::io(format!("Failed to read {}", path.display()), e))?;
        Self::parse(&content).map_err(|e| match e {
            GroveError::TomlParse { message, .. } => GroveError::TomlParse {
                file: path.display().to_string(),
                message,
            },
            other => other,
        })
    }

    fn validate(&self) -> ConfigResult<()> {
        let Some(dir) = &self.unpack_directory else {
            return Ok(());
        };
        let relative = !dir.is_empty()
            && Path::new(dir)
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !relative {
            return Err(GroveError::ConfigValidation {
                field: "unpack_directory".to_string(),
                reason: format!("'{}' must be a relative path inside the package", dir),
            });
        }
        Ok(())
    }
}
