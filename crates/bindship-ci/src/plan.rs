//! Assemble the release stage list from configuration.

use bindship_core::{CredentialProvider, EnvCredentialProvider, Identity, ReleaseConfig, Repository};
use std::sync::Arc;

use crate::builder::Builder;
use crate::gate::TestGate;
use crate::publish::{PublishManager, PublishSettings};
use crate::runner::CommandRunner;
use crate::stage::{linear, BuiltinStage, Stage};
use crate::staging::StagingAction;

/// Stage name for the gate running `suite`.
pub fn gate_stage_name(suite: &str) -> String {
    format!("test_gate({suite})")
}

/// The target repository described by `config`.
pub fn target_repository(config: &ReleaseConfig) -> Repository {
    Repository::new(
        config.target.remote_url.clone(),
        config.target.checkout_dir.clone(),
        config.target.branch.clone(),
    )
}

/// Build → stage → one gate per suite → publish, each depending on the one
/// before it.
pub fn release_stages(
    config: &ReleaseConfig,
    runner: Arc<dyn CommandRunner>,
    credentials: Arc<dyn CredentialProvider>,
) -> Vec<Stage> {
    let repository = target_repository(config);

    let mut stages = vec![
        Stage::new(
            BuiltinStage::Build.name(),
            BuiltinStage::Build,
            Box::new(Builder::new(
                config.build.clone(),
                config.target.artifact_path.clone(),
                runner.clone(),
            )),
        ),
        Stage::new(
            BuiltinStage::Stage.name(),
            BuiltinStage::Stage,
            Box::new(StagingAction::new(repository.clone())),
        ),
    ];

    for suite in &config.suites {
        stages.push(Stage::new(
            gate_stage_name(&suite.name),
            BuiltinStage::TestGate,
            Box::new(TestGate::new(suite.clone(), repository.clone(), runner.clone())),
        ));
    }

    stages.push(Stage::new(
        BuiltinStage::Publish.name(),
        BuiltinStage::Publish,
        Box::new(publish_manager(config, credentials)),
    ));

    linear(stages)
}

/// The publish step on its own, for pushing a release whose local commit and
/// tag already exist.
pub fn publish_manager(
    config: &ReleaseConfig,
    credentials: Arc<dyn CredentialProvider>,
) -> PublishManager {
    let settings = PublishSettings {
        commit_message: config.target.commit_message.clone(),
        identity: Identity {
            name: config.target.committer_name.clone(),
            email: config.target.committer_email.clone(),
        },
        reject_existing_tag: config.pipeline.reject_existing_tag,
    };
    PublishManager::new(target_repository(config), settings, credentials)
}

/// Credential provider named by the configuration.
pub fn credential_provider(config: &ReleaseConfig) -> Arc<dyn CredentialProvider> {
    Arc::new(EnvCredentialProvider::new(config.credential.env_var.clone()))
}
