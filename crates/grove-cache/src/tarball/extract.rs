//! Tarball extraction functionality
//!
//! Safe extraction with path validation to prevent directory traversal.

use flate2::read::GzDecoder;
use grove_core::error::GroveError;
use std::fs;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use tar::Archive;

use crate::CacheResult;

fn archive_io(context: &str, e: std::io::Error) -> GroveError {
    GroveError::io(format!("Failed to {}", context), e)
}

/// Unpack an archive file into `dest_dir`, returning the extracted paths
pub fn unpack_file(archive: &Path, dest_dir: &Path) -> CacheResult<Vec<PathBuf>> {
    let file = fs::File::open(archive)
        .map_err(|e| GroveError::io(format!("Failed to open archive {}", archive.display()), e))?;
    extract_tarball(std::io::BufReader::new(file), dest_dir)
}

/// Extract a gzipped tarball to a destination directory
pub fn extract_tarball<R: Read>(reader: R, dest_dir: &Path) -> CacheResult<Vec<PathBuf>> {
    let mut archive = Archive::new(GzDecoder::new(reader));

    fs::create_dir_all(dest_dir).map_err(|e| archive_io("create destination directory", e))?;

    let mut extracted = Vec::new();
    let entries = archive.entries().map_err(|e| corrupt(&e))?;
    for entry_result in entries {
        let mut entry = entry_result.map_err(|e| corrupt(&e))?;

        let entry_path = entry.path().map_err(|e| corrupt(&e))?.into_owned();
        let Some(safe_path) = validate_extract_path(&entry_path, dest_dir)? else {
            continue;
        };

        let entry_type = entry.header().entry_type();
        let mode = entry.header().mode().ok();

        match entry_type {
            tar::EntryType::Regular | tar::EntryType::Continuous => {
                extract_regular_file(&mut entry, &safe_path)?;
            }
            tar::EntryType::Directory => {
                fs::create_dir_all(&safe_path).map_err(|e| archive_io("create directory", e))?;
            }
            tar::EntryType::Symlink => {
                extract_symlink(&mut entry, &safe_path, dest_dir)?;
            }
            // Hard links, devices and extended headers are not package content
            _ => continue,
        }

        // Preserve file permissions
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let (Some(mode), false) = (mode, entry_type == tar::EntryType::Symlink) {
                let _ = fs::set_permissions(&safe_path, fs::Permissions::from_mode(mode));
            }
        }
        #[cfg(not(unix))]
        let _ = mode;

        extracted.push(safe_path);
    }

    Ok(extracted)
}

fn corrupt(e: &std::io::Error) -> GroveError {
    GroveError::Archive {
        message: format!("corrupt archive: {}", e),
    }
}

/// Validate extraction path to prevent directory traversal; `None` for the archive root
fn validate_extract_path(entry_path: &Path, dest_dir: &Path) -> CacheResult<Option<PathBuf>> {
    let mut safe_path = dest_dir.to_path_buf();
    let mut depth = 0;

    for component in entry_path.components() {
        match component {
            Component::Normal(name) => {
                safe_path.push(name);
                depth += 1;
            }
            Component::CurDir => continue,
            Component::ParentDir => {
                return Err(GroveError::Archive {
                    message: format!("directory traversal in entry '{}'", entry_path.display()),
                });
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(GroveError::Archive {
                    message: format!("absolute entry path '{}'", entry_path.display()),
                });
            }
        }
    }

    Ok((depth > 0).then_some(safe_path))
}

fn extract_regular_file<R: Read>(entry: &mut tar::Entry<R>, dest_path: &Path) -> CacheResult<()> {
    if let Some(parent) = dest_path.parent() {
        fs::create_dir_all(parent).map_err(|e| archive_io("create directory", e))?;
    }

    // Stream extraction without loading into memory
    let mut file = fs::File::create(dest_path).map_err(|e| archive_io("create file", e))?;
    std::io::copy(entry, &mut file).map_err(|e| corrupt(&e))?;

    Ok(())
}

/// Extract symlink safely (validate target doesn't escape)
fn extract_symlink<R: Read>(
    entry: &mut tar::Entry<R>,
    dest_path: &Path,
    dest_dir: &Path,
) -> CacheResult<()> {
    let Some(target) = entry.link_name().map_err(|e| corrupt(&e))? else {
        return Ok(());
    };

    if target.is_absolute() {
        return Err(GroveError::Archive {
            message: format!("absolute symlink target in '{}'", dest_path.display()),
        });
    }

    // Resolve lexically; the link may point at something not yet extracted
    let base = dest_path.parent().unwrap_or(dest_dir);
    let mut resolved = base.to_path_buf();
    for component in target.components() {
        match component {
            Component::ParentDir => {
                if !resolved.pop() || !resolved.starts_with(dest_dir) {
                    return Err(GroveError::Archive {
                        message: format!("symlink '{}' escapes the package", dest_path.display()),
                    });
                }
            }
            Component::Normal(name) => resolved.push(name),
            _ => {}
        }
    }
    if !resolved.starts_with(dest_dir) {
        return Err(GroveError::Archive {
            message: format!("symlink '{}' escapes the package", dest_path.display()),
        });
    }

    if let Some(parent) = dest_path.parent() {
        fs::create_dir_all(parent).map_err(|e| archive_io("create directory", e))?;
    }

    #[cfg(unix)]
    std::os::unix::fs::symlink(&target, dest_path).map_err(|e| archive_io("create symlink", e))?;

    // TODO: create file or directory symlinks on Windows depending on the target kind
    #[cfg(not(unix))]
    let _ = target;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tarball::tests::build_archive;
    use tempfile::tempdir;

    #[test]
    fn test_extract_simple_tarball() {
        let temp_dir = tempdir().unwrap();
        let extract_dir = temp_dir.path().join("extract");

        let data = build_archive(&[("test.txt", "hello world"), ("src/lib.c", "int x;")]);
        let files = extract_tarball(std::io::Cursor::new(data), &extract_dir).unwrap();

        assert_eq!(files.len(), 2);
        let content = fs::read_to_string(extract_dir.join("test.txt")).unwrap();
        assert_eq!(content, "hello world");
        assert!(extract_dir.join("src").join("lib.c").exists());
    }

    #[test]
    fn test_validate_extract_path() {
        let dest = Path::new("/dest");
        assert_eq!(
            validate_extract_path(Path::new("./a/b"), dest).unwrap(),
            Some(PathBuf::from("/dest/a/b"))
        );
        assert_eq!(validate_extract_path(Path::new("./"), dest).unwrap(), None);
        assert!(validate_extract_path(Path::new("a/../../etc/passwd"), dest).is_err());
        assert!(validate_extract_path(Path::new("/etc/passwd"), dest).is_err());
    }

    #[test]
    fn test_garbage_is_archive_error() {
        let temp_dir = tempdir().unwrap();
        let err = extract_tarball(std::io::Cursor::new(b"not an archive".to_vec()), temp_dir.path())
            .unwrap_err();
        assert!(matches!(err, GroveError::Archive { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_escaping_symlink_rejected() {
        use flate2::write::GzEncoder;
        use flate2::Compression;

        let mut data = Vec::new();
        {
            let mut builder = tar::Builder::new(GzEncoder::new(&mut data, Compression::default()));
            let mut header = tar::Header::new_gnu();
            header.set_entry_type(tar::EntryType::Symlink);
            header.set_size(0);
            builder
                .append_link(&mut header, "link", "../../outside")
                .unwrap();
            builder.into_inner().unwrap().finish().unwrap();
        }

        let temp_dir = tempdir().unwrap();
        let err = extract_tarball(std::io::Cursor::new(data), &temp_dir.path().join("x")).unwrap_err();
        assert!(matches!(err, GroveError::Archive { .. }));
    }
}
