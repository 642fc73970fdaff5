//! Package archive handling
//!
//! Extraction of downloaded `.tar.gz` archives and the post-unpack
//! relocation into a package-declared directory.

pub mod extract;
pub mod relocate;

// Re-export main functions
pub use extract::{extract_tarball, unpack_file};
pub use relocate::relocate_into;
