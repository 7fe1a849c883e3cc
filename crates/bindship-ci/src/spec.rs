//! Release identity.

use bindship_core::{capture_head_sha, is_git_repo};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// What one run releases: the externally supplied tag, the source it was
/// built from and the ordered stage list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReleaseSpec {
    /// Version tag applied to the target repository. Consumed as given.
    pub tag: String,

    /// Source checkout the artifact is built from.
    pub source_dir: PathBuf,

    /// HEAD of the source checkout, when it is a git repository.
    pub source_sha: Option<String>,

    /// SHA-256 digest of ordered stage names (deterministic).
    pub stages_digest: String,
}

impl ReleaseSpec {
    pub fn new(tag: impl Into<String>, source_dir: impl Into<PathBuf>, stages: &[String]) -> Self {
        let source_dir = source_dir.into();
        let source_sha = detect_source_sha(&source_dir);
        Self {
            tag: tag.into(),
            source_dir,
            source_sha,
            stages_digest: compute_stages_digest(stages),
        }
    }

    /// Short form of the stage digest for log lines.
    pub fn short_digest(&self) -> &str {
        &self.stages_digest[..12.min(self.stages_digest.len())]
    }
}

fn detect_source_sha(dir: &Path) -> Option<String> {
    if is_git_repo(dir) {
        capture_head_sha(dir).ok()
    } else {
        None
    }
}

/// Compute deterministic digest of ordered stage names.
fn compute_stages_digest(stages: &[String]) -> String {
    let mut hasher = Sha256::new();
    for stage in stages {
        hasher.update(stage.as_bytes());
        hasher.update(b"\0");
    }
    hex::encode(hasher.finalize())
}
