//! Release error taxonomy for bindship.
//!
//! Every variant names the stage or step that failed. None of them carry a
//! credential value.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The publish step that failed. Each one has a different external cause.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PublishStep {
    /// Staging the working tree or creating the local commit.
    Commit,
    /// Creating the local tag, or a tag name collision.
    Tag,
    /// Pushing the commit or the tag to the remote.
    Push,
}

impl PublishStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishStep::Commit => "commit",
            PublishStep::Tag => "tag",
            PublishStep::Push => "push",
        }
    }
}

impl fmt::Display for PublishStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by a release run.
#[derive(Debug, thiserror::Error)]
pub enum ReleaseError {
    #[error("build failed: {reason}")]
    BuildFailure { reason: String },

    #[error("staging failed: {reason}")]
    StagingFailure { reason: String },

    #[error("test suite '{suite}' failed: {details}")]
    TestFailure { suite: String, details: String },

    #[error("publish failed at {step}: {reason}")]
    PublishFailure { step: PublishStep, reason: String },

    #[error("credential missing: environment variable {name} is not set")]
    CredentialMissing { name: String },

    #[error("stage '{stage}' not started: dependency '{dependency}' has not succeeded")]
    DependencyNotSatisfied { stage: String, dependency: String },

    #[error("run cancelled before stage '{stage}'")]
    Cancelled { stage: String },

    #[error("git error: {0}")]
    Git(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReleaseError {
    pub fn build(reason: impl Into<String>) -> Self {
        ReleaseError::BuildFailure {
            reason: reason.into(),
        }
    }

    pub fn staging(reason: impl Into<String>) -> Self {
        ReleaseError::StagingFailure {
            reason: reason.into(),
        }
    }

    pub fn publish(step: PublishStep, reason: impl Into<String>) -> Self {
        ReleaseError::PublishFailure {
            step,
            reason: reason.into(),
        }
    }

    /// Short machine-readable kind, used in reports and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            ReleaseError::BuildFailure { .. } => "build_failure",
            ReleaseError::StagingFailure { .. } => "staging_failure",
            ReleaseError::TestFailure { .. } => "test_failure",
            ReleaseError::PublishFailure { .. } => "publish_failure",
            ReleaseError::CredentialMissing { .. } => "credential_missing",
            ReleaseError::DependencyNotSatisfied { .. } => "dependency_not_satisfied",
            ReleaseError::Cancelled { .. } => "cancelled",
            ReleaseError::Git(_) => "git",
            ReleaseError::Config(_) => "config",
            ReleaseError::Io(_) => "io",
        }
    }
}

/// Result type for bindship operations.
pub type Result<T> = std::result::Result<T, ReleaseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_failure_names_step() {
        let err = ReleaseError::publish(PublishStep::Tag, "tag v1.0.0 already exists on remote");
        let msg = err.to_string();
        assert!(msg.contains("publish failed at tag"));
        assert!(msg.contains("v1.0.0"));
        assert_eq!(err.kind(), "publish_failure");
    }

    #[test]
    fn test_credential_missing_names_variable() {
        let err = ReleaseError::CredentialMissing {
            name: "PACKAGE_REPO_TOKEN".to_string(),
        };
        assert!(err.to_string().contains("PACKAGE_REPO_TOKEN"));
    }

    #[test]
    fn test_test_failure_names_suite() {
        let err = ReleaseError::TestFailure {
            suite: "integration".to_string(),
            details: "exit code 65".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "test suite 'integration' failed: exit code 65"
        );
    }

    #[test]
    fn test_publish_step_serde() {
        let json = serde_json::to_string(&PublishStep::Push).unwrap();
        assert_eq!(json, "\"push\"");
    }
}
