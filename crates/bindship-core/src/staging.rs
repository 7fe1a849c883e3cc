//! Replace the binding artifact inside the target checkout.
//!
//! Staging removes the previous artifact directory, copies the new tree into a
//! sibling temporary directory and renames it into place. If anything fails
//! after the removal, the temporary directory is deleted and the destination
//! is left absent. A half-populated destination is never observable.

use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::artifact::{tree_digest, walk_err, Artifact};
use crate::error::{ReleaseError, Result};
use crate::git::Repository;

/// Outcome of a successful staging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedArtifact {
    /// Absolute destination inside the checkout.
    pub destination: PathBuf,

    /// Tree digest shared by source and destination.
    pub digest: String,

    /// Number of regular files copied.
    pub files: usize,
}

/// Atomically swaps artifact trees inside a repository checkout.
#[derive(Debug, Default, Clone)]
pub struct ArtifactStager;

impl ArtifactStager {
    pub fn new() -> Self {
        Self
    }

    pub fn stage(&self, artifact: &Artifact, repository: &Repository) -> Result<StagedArtifact> {
        let destination = resolve_destination(artifact, repository)?;

        if !artifact.source_path.is_dir() {
            return Err(ReleaseError::staging(format!(
                "artifact source {} is not a directory",
                artifact.source_path.display()
            )));
        }
        let source_digest = tree_digest(&artifact.source_path)
            .map_err(|e| ReleaseError::staging(format!("cannot read artifact source: {e}")))?;

        if destination.exists() {
            debug!(destination = %destination.display(), "Removing previous artifact");
            remove_path(&destination).map_err(|e| {
                ReleaseError::staging(format!(
                    "failed to remove previous artifact at {}: {e}",
                    destination.display()
                ))
            })?;
        }

        match self.populate(&artifact.source_path, &destination, &source_digest) {
            Ok(files) => {
                info!(
                    destination = %destination.display(),
                    digest = %source_digest,
                    files,
                    "Artifact staged"
                );
                Ok(StagedArtifact {
                    destination,
                    digest: source_digest,
                    files,
                })
            }
            Err(e) => {
                if destination.exists() {
                    if let Err(cleanup) = remove_path(&destination) {
                        warn!(error = %cleanup, "Failed to clear destination after staging error");
                    }
                }
                Err(ReleaseError::staging(format!(
                    "{e}; destination {} left empty",
                    destination.display()
                )))
            }
        }
    }

    fn populate(&self, source: &Path, destination: &Path, expected: &str) -> Result<usize> {
        let parent = destination.parent().ok_or_else(|| {
            ReleaseError::staging(format!("destination {} has no parent", destination.display()))
        })?;
        fs::create_dir_all(parent)?;

        let name = destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "artifact".to_string());
        let temp = parent.join(format!(".{name}.staging-{}", uuid::Uuid::new_v4().simple()));

        let result = copy_tree(source, &temp).and_then(|files| {
            let digest = tree_digest(&temp)?;
            if digest != expected {
                return Err(ReleaseError::staging(format!(
                    "copied tree digest {digest} does not match source digest {expected}"
                )));
            }
            fs::rename(&temp, destination)?;
            Ok(files)
        });

        if result.is_err() && temp.exists() {
            if let Err(cleanup) = fs::remove_dir_all(&temp) {
                warn!(temp = %temp.display(), error = %cleanup, "Failed to remove staging temp dir");
            }
        }
        result
    }
}

/// Join the artifact destination onto the checkout, refusing paths that would
/// escape it or replace the checkout root.
fn resolve_destination(artifact: &Artifact, repository: &Repository) -> Result<PathBuf> {
    let rel = &artifact.dest_path;
    let mut normal = 0usize;
    for component in rel.components() {
        match component {
            Component::Normal(_) => normal += 1,
            Component::CurDir => {}
            _ => {
                return Err(ReleaseError::staging(format!(
                    "artifact destination {} must be a relative path inside the checkout",
                    rel.display()
                )))
            }
        }
    }
    if normal == 0 {
        return Err(ReleaseError::staging(
            "artifact destination must not be the checkout root".to_string(),
        ));
    }
    Ok(repository.local_checkout_path.join(rel))
}

fn remove_path(path: &Path) -> std::io::Result<()> {
    let meta = fs::symlink_metadata(path)?;
    if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Recursively copy `source` to `dest`, preserving symlinks. Returns the
/// number of regular files copied.
fn copy_tree(source: &Path, dest: &Path) -> Result<usize> {
    fs::create_dir_all(dest)?;
    let mut files = 0usize;

    for entry in WalkDir::new(source).min_depth(1) {
        let entry = entry.map_err(walk_err)?;
        let rel = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| ReleaseError::staging(e.to_string()))?;
        let target = dest.join(rel);
        let file_type = entry.file_type();

        if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
            files += 1;
        }
    }

    Ok(files)
}

#[cfg(unix)]
fn copy_symlink(link: &Path, target: &Path) -> Result<()> {
    let points_to = fs::read_link(link)?;
    std::os::unix::fs::symlink(points_to, target)?;
    Ok(())
}

#[cfg(not(unix))]
fn copy_symlink(link: &Path, target: &Path) -> Result<()> {
    fs::copy(link, target)?;
    Ok(())
}
