//! Built binding artifacts and their content digests.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{ReleaseError, Result};

/// A directory tree produced by the builder and consumed by the stager.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Artifact {
    /// Build output directory.
    pub source_path: PathBuf,

    /// Destination inside the target checkout, relative to the checkout root.
    pub dest_path: PathBuf,
}

impl Artifact {
    pub fn new(source_path: impl Into<PathBuf>, dest_path: impl Into<PathBuf>) -> Self {
        Self {
            source_path: source_path.into(),
            dest_path: dest_path.into(),
        }
    }

    /// Digest of the artifact's current source tree.
    pub fn digest(&self) -> Result<String> {
        tree_digest(&self.source_path)
    }
}

/// Compute a deterministic SHA-256 over a directory tree.
///
/// Covers relative paths, entry kinds, symlink targets and file contents, in
/// sorted order. The root directory's own name is not included, so two trees
/// with identical contents at different locations have the same digest.
pub fn tree_digest(root: &Path) -> Result<String> {
    if !root.is_dir() {
        return Err(ReleaseError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("not a directory: {}", root.display()),
        )));
    }

    let mut hasher = Sha256::new();
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(walk_err)?;
        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| ReleaseError::Io(std::io::Error::other(e.to_string())))?;
        let rel = rel.to_string_lossy();
        let file_type = entry.file_type();

        if file_type.is_symlink() {
            let target = std::fs::read_link(entry.path())?;
            hasher.update(b"l:");
            hasher.update(rel.as_bytes());
            hasher.update(b"\0");
            hasher.update(target.to_string_lossy().as_bytes());
        } else if file_type.is_dir() {
            hasher.update(b"d:");
            hasher.update(rel.as_bytes());
        } else {
            let content = std::fs::read(entry.path())?;
            hasher.update(b"f:");
            hasher.update(rel.as_bytes());
            hasher.update(b"\0");
            hasher.update((content.len() as u64).to_le_bytes());
            hasher.update(&content);
        }
        hasher.update(b"\0");
    }

    Ok(hex::encode(hasher.finalize()))
}

pub(crate) fn walk_err(e: walkdir::Error) -> ReleaseError {
    match e.into_io_error() {
        Some(io) => ReleaseError::Io(io),
        None => ReleaseError::Io(std::io::Error::other("filesystem loop while walking tree")),
    }
}
