//! Staging stage: make sure the target checkout exists, then swap the artifact in.

use async_trait::async_trait;
use bindship_core::{Artifact, ArtifactStager, ReleaseError, Repository, StagedArtifact};
use tracing::info;

use crate::stage::{ReleaseContext, StageAction};

pub struct StagingAction {
    stager: ArtifactStager,
    repository: Repository,
}

impl StagingAction {
    pub fn new(repository: Repository) -> Self {
        Self {
            stager: ArtifactStager::new(),
            repository,
        }
    }
}

#[async_trait]
impl StageAction for StagingAction {
    fn describe(&self) -> String {
        format!(
            "clone {} ({}) into {} and replace artifact",
            self.repository.remote_url,
            self.repository.branch,
            self.repository.local_checkout_path.display()
        )
    }

    async fn execute(&self, ctx: &mut ReleaseContext) -> Result<(), ReleaseError> {
        let artifact = ctx
            .artifact
            .clone()
            .ok_or_else(|| ReleaseError::staging("no artifact was produced by the build stage"))?;

        let stager = self.stager.clone();
        let repository = self.repository.clone();
        let staged =
            tokio::task::spawn_blocking(move || checkout_and_stage(&stager, &repository, &artifact))
                .await
                .map_err(|e| ReleaseError::staging(format!("staging task failed: {e}")))??;
        ctx.staged = Some(staged);
        Ok(())
    }
}

fn checkout_and_stage(
    stager: &ArtifactStager,
    repository: &Repository,
    artifact: &Artifact,
) -> Result<StagedArtifact, ReleaseError> {
    let cloned = repository
        .ensure_checkout()
        .map_err(|e| ReleaseError::staging(format!("preparing target checkout: {e}")))?;
    if cloned {
        info!(remote = %repository.remote_url, "Cloned target repository");
    }
    stager.stage(artifact, repository)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    #[tokio::test]
    async fn test_missing_artifact_is_staging_failure() {
        let dir = tempfile::tempdir().unwrap();
        let action = StagingAction::new(Repository::new("unused", dir.path(), "main"));
        let mut ctx = ReleaseContext::new("v1.2.3");

        let err = action.execute(&mut ctx).await.unwrap_err();
        assert!(matches!(err, ReleaseError::StagingFailure { .. }));
    }

    #[tokio::test]
    async fn test_stages_into_existing_checkout() {
        let checkout = tempfile::tempdir().unwrap();
        let status = Command::new("git")
            .arg("init")
            .current_dir(checkout.path())
            .output()
            .unwrap()
            .status;
        assert!(status.success());

        let build = tempfile::tempdir().unwrap();
        std::fs::write(build.path().join("Core.swift"), "public func add() {}").unwrap();

        let action = StagingAction::new(Repository::new("unused", checkout.path(), "main"));
        let mut ctx = ReleaseContext::new("v1.2.3");
        ctx.artifact = Some(Artifact::new(build.path(), "Sources/Bindings"));

        action.execute(&mut ctx).await.unwrap();

        let staged = ctx.staged.expect("staged");
        assert_eq!(staged.files, 1);
        assert!(checkout.path().join("Sources/Bindings/Core.swift").is_file());
    }
}
