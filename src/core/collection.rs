//! Deterministic collection naming.
//!
//! Every codebase root maps to `code_chunks_<first 16 hex of
//! sha256(canonical root)>`; the same root always yields the same name.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::core::error::{Error, Result};

pub const COLLECTION_PREFIX: &str = "code_chunks_";

/// Canonicalised absolute root; fails when the path is not a directory.
pub fn canonical_root(root: &Path) -> Result<PathBuf> {
    let canonical = root
        .canonicalize()
        .map_err(|_| Error::PathNotFound(root.to_path_buf()))?;
    if !canonical.is_dir() {
        return Err(Error::PathNotFound(root.to_path_buf()));
    }
    Ok(canonical)
}

/// First 16 hex chars of the sha256 of the canonical root string.
pub fn root_hash(canonical: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string_lossy().as_bytes());
    hex::encode(hasher.finalize())[..16].to_string()
}

pub fn collection_name(canonical: &Path) -> String {
    format!("{}{}", COLLECTION_PREFIX, root_hash(canonical))
}
