//! Moving unpacked sources under a package-declared sub-directory.

use grove_config::MANIFEST_FILE;
use grove_core::error::GroveError;
use std::fs;
use std::path::{Component, Path};

use crate::CacheResult;

/// Move every top-level entry of `package_dir` except the manifest into `unpack_directory`
pub fn relocate_into(package_dir: &Path, unpack_directory: &str) -> CacheResult<()> {
    let relative = Path::new(unpack_directory);
    let Some(Component::Normal(head)) = relative.components().next() else {
        return Err(GroveError::ConfigValidation {
            field: "unpack_directory".to_string(),
            reason: format!("'{}' must be a relative path inside the package", unpack_directory),
        });
    };

    if package_dir.join(head).exists() {
        return Err(GroveError::Archive {
            message: format!(
                "Cannot create unpack_directory '{}' because fs object with the same name already exists",
                package_dir.join(relative).display()
            ),
        });
    }

    let target = package_dir.join(relative);
    fs::create_dir_all(&target)
        .map_err(|e| GroveError::io(format!("Failed to create {}", target.display()), e))?;

    let entries = fs::read_dir(package_dir)
        .map_err(|e| GroveError::io(format!("Failed to read {}", package_dir.display()), e))?;
    for entry in entries {
        let entry = entry
            .map_err(|e| GroveError::io(format!("Failed to read {}", package_dir.display()), e))?;
        let name = entry.file_name();
        if name == head || name == MANIFEST_FILE {
            continue;
        }
        let to = target.join(&name);
        fs::rename(entry.path(), &to)
            .map_err(|e| GroveError::io(format!("Failed to move into {}", to.display()), e))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relocate_moves_everything_but_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join(MANIFEST_FILE), "unpack_directory = \"pkg/src\"").unwrap();
        fs::write(root.join("a.c"), "a").unwrap();
        fs::create_dir_all(root.join("include").join("x")).unwrap();
        fs::write(root.join("include").join("x").join("a.h"), "h").unwrap();

        relocate_into(root, "pkg/src").unwrap();

        assert!(root.join(MANIFEST_FILE).exists());
        assert!(!root.join("a.c").exists());
        assert!(root.join("pkg/src/a.c").exists());
        assert!(root.join("pkg/src/include/x/a.h").exists());
    }

    #[test]
    fn test_existing_name_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();

        let err = relocate_into(dir.path(), "src").unwrap_err();
        assert!(matches!(err, GroveError::Archive { .. }));
    }
}
