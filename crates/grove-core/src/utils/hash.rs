//! sha-256 hashing utilities for archive integrity and store layout.

use crate::error::{GroveError, GroveResult};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io;
use std::path::Path;

/// Compute the hex sha-256 of data
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Compute the hex sha-256 of a file without loading it into memory
pub fn sha256_file(path: &Path) -> GroveResult<String> {
    let mut file = File::open(path)
        .map_err(|e| GroveError::io(format!("Failed to open file: {}", path.display()), e))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)
        .map_err(|e| GroveError::io(format!("Failed to read file: {}", path.display()), e))?;
    Ok(hex::encode(hasher.finalize()))
}

/// Verify file integrity against an expected hash
pub fn verify_file_integrity(path: &Path, package: &str, expected_hash: &str) -> GroveResult<()> {
    let actual = sha256_file(path)?;
    if actual == expected_hash {
        Ok(())
    } else {
        Err(GroveError::HashMismatch {
            package: package.to_string(),
            expected: expected_hash.to_string(),
            actual,
        })
    }
}

/// First `len` characters of a hash
pub fn shorten_hash(hash: &str, len: usize) -> String {
    hash.chars().take(len).collect()
}

/// Fan a hash out into `ab/cd/rest`
pub fn hash_path(hash: &str) -> String {
    if hash.len() <= 4 || !hash.is_ascii() {
        return hash.to_string();
    }
    format!("{}/{}/{}", &hash[0..2], &hash[2..4], &hash[4..])
}
