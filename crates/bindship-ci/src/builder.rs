//! Binding artifact builder.

use async_trait::async_trait;
use bindship_core::{Artifact, BuildConfig, BuildProfile, ReleaseError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::runner::{CommandRunner, CommandSpec};
use crate::stage::{ReleaseContext, StageAction};

const FAILURE_TAIL_LINES: usize = 40;

/// Invokes the external toolchain and checks for its output directory.
pub struct Builder {
    config: BuildConfig,
    dest_path: PathBuf,
    runner: Arc<dyn CommandRunner>,
}

impl Builder {
    /// `dest_path` is where the artifact belongs inside the target checkout.
    pub fn new(config: BuildConfig, dest_path: impl Into<PathBuf>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            config,
            dest_path: dest_path.into(),
            runner,
        }
    }

    /// Toolchain argv with profile and feature selection applied.
    pub fn invocation(&self) -> Vec<String> {
        let mut argv = self.config.command.clone();
        if self.config.profile == BuildProfile::Release && !self.config.release_flag.is_empty() {
            argv.push(self.config.release_flag.clone());
        }
        if self.config.no_default_features {
            argv.push("--no-default-features".to_string());
        }
        if !self.config.features.is_empty() {
            argv.push("--features".to_string());
            argv.push(self.config.features.join(","));
        }
        argv
    }

    pub fn output_dir(&self) -> PathBuf {
        self.config.working_dir.join(&self.config.output_dir)
    }

    pub async fn build(&self) -> Result<Artifact, ReleaseError> {
        let output_dir = self.output_dir();
        clear_stale_output(&output_dir)?;

        let spec = CommandSpec::new("build", self.invocation(), &self.config.working_dir)
            .with_timeout(self.config.timeout_secs);
        info!(command = %spec.display(), profile = ?self.config.profile, "Building bindings");

        let output = self
            .runner
            .run(&spec)
            .await
            .map_err(|e| ReleaseError::build(e.to_string()))?;

        if !output.passed() {
            return Err(ReleaseError::build(format!(
                "toolchain exited with code {}:\n{}",
                output.exit_code,
                output.tail(FAILURE_TAIL_LINES)
            )));
        }

        if !output_dir.is_dir() {
            return Err(ReleaseError::build(format!(
                "toolchain succeeded but expected output {} is missing",
                output_dir.display()
            )));
        }

        info!(output = %output_dir.display(), duration_ms = output.duration_ms, "Build finished");
        Ok(Artifact::new(output_dir, self.dest_path.clone()))
    }
}

/// A leftover output directory would make a failed build look complete.
fn clear_stale_output(output_dir: &Path) -> Result<(), ReleaseError> {
    if output_dir.exists() {
        warn!(output = %output_dir.display(), "Removing stale build output");
        std::fs::remove_dir_all(output_dir).map_err(|e| {
            ReleaseError::build(format!(
                "cannot remove stale output {}: {e}",
                output_dir.display()
            ))
        })?;
    }
    Ok(())
}

#[async_trait]
impl StageAction for Builder {
    fn describe(&self) -> String {
        self.invocation().join(" ")
    }

    async fn execute(&self, ctx: &mut ReleaseContext) -> Result<(), ReleaseError> {
        let artifact = self.build().await?;
        ctx.artifact = Some(artifact);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::ProcessRunner;

    fn config(dir: &Path, command: &[&str]) -> BuildConfig {
        BuildConfig {
            command: command.iter().map(|s| s.to_string()).collect(),
            working_dir: dir.to_path_buf(),
            release_flag: String::new(),
            output_dir: PathBuf::from("out/Bindings"),
            timeout_secs: 30,
            ..BuildConfig::default()
        }
    }

    #[test]
    fn test_invocation_applies_profile_and_features() {
        let builder = Builder::new(
            BuildConfig {
                command: vec!["cargo".to_string(), "run".to_string()],
                features: vec!["ios-bindings".to_string(), "uniffi".to_string()],
                no_default_features: true,
                ..BuildConfig::default()
            },
            "Sources/Bindings",
            Arc::new(ProcessRunner),
        );
        assert_eq!(
            builder.invocation(),
            vec![
                "cargo",
                "run",
                "--release",
                "--no-default-features",
                "--features",
                "ios-bindings,uniffi"
            ]
        );
    }

    #[test]
    fn test_debug_profile_omits_release_flag() {
        let builder = Builder::new(
            BuildConfig {
                command: vec!["cargo".to_string(), "build".to_string()],
                profile: BuildProfile::Debug,
                ..BuildConfig::default()
            },
            "Sources/Bindings",
            Arc::new(ProcessRunner),
        );
        assert_eq!(builder.invocation(), vec!["cargo", "build"]);
    }

    #[tokio::test]
    async fn test_build_produces_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let builder = Builder::new(
            config(
                dir.path(),
                &["sh", "-c", "mkdir -p out/Bindings && echo x > out/Bindings/a.swift"],
            ),
            "Sources/Bindings",
            Arc::new(ProcessRunner),
        );

        let artifact = builder.build().await.expect("build failed");
        assert_eq!(artifact.source_path, dir.path().join("out/Bindings"));
        assert_eq!(artifact.dest_path, PathBuf::from("Sources/Bindings"));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_build_failure() {
        let dir = tempfile::tempdir().unwrap();
        let builder = Builder::new(
            config(dir.path(), &["sh", "-c", "echo boom >&2; exit 3"]),
            "Sources/Bindings",
            Arc::new(ProcessRunner),
        );

        let err = builder.build().await.unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, ReleaseError::BuildFailure { .. }));
        assert!(msg.contains("code 3"));
        assert!(msg.contains("boom"));
    }

    #[tokio::test]
    async fn test_missing_output_is_build_failure() {
        let dir = tempfile::tempdir().unwrap();
        let builder = Builder::new(
            config(dir.path(), &["true"]),
            "Sources/Bindings",
            Arc::new(ProcessRunner),
        );

        let err = builder.build().await.unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[tokio::test]
    async fn test_stale_output_does_not_count() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("out/Bindings")).unwrap();
        let builder = Builder::new(
            config(dir.path(), &["true"]),
            "Sources/Bindings",
            Arc::new(ProcessRunner),
        );

        assert!(builder.build().await.is_err());
        assert!(!dir.path().join("out/Bindings").exists());
    }
}
