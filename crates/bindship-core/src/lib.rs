//! bindship core library
//!
//! Leaf components of the release pipeline: error taxonomy, publish
//! credential, artifact model, staging into the target checkout, git
//! operations, configuration and tracing setup.

pub mod artifact;
pub mod config;
pub mod credential;
pub mod error;
pub mod git;
pub mod obs;
pub mod staging;
pub mod telemetry;

pub use artifact::{tree_digest, Artifact};
pub use config::{
    load_config, BuildConfig, BuildProfile, CredentialConfig, PipelineConfig, ReleaseConfig,
    SuiteDescriptor, SuiteKind, TargetConfig, DEFAULT_CONFIG_FILE,
};
pub use credential::{Credential, CredentialProvider, EnvCredentialProvider, StaticCredentialProvider};
pub use error::{PublishStep, ReleaseError, Result};
pub use git::{capture_head_sha, is_git_repo, Identity, Repository};
pub use obs::run_span;
pub use staging::{ArtifactStager, StagedArtifact};
pub use telemetry::init_tracing;

/// bindship version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
