//! Commit, tag and push the staged checkout.
//!
//! Commit and tag are local. Only the push touches the remote, and it sends
//! the branch and the tag atomically. When the push fails, the local commit
//! and tag stay in place so [`PublishManager::resume`] can push them later
//! without rebuilding or re-running the suites.

use async_trait::async_trait;
use bindship_core::obs::emit_publish_step;
use bindship_core::{
    Credential, CredentialProvider, Identity, PublishStep, ReleaseError, Repository,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::stage::{ReleaseContext, StageAction};

/// Fixed inputs of the publish step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishSettings {
    pub commit_message: String,
    pub identity: Identity,

    /// Fail at the tag step when the remote already has the tag.
    pub reject_existing_tag: bool,
}

/// A completed publish.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Published {
    pub tag: String,
    pub commit_sha: String,
    pub branch: String,

    /// Commit and tag came from an earlier attempt; only the pushes ran.
    pub resumed: bool,
}

#[derive(Clone)]
pub struct PublishManager {
    repository: Repository,
    settings: PublishSettings,
    credentials: Arc<dyn CredentialProvider>,
}

impl PublishManager {
    pub fn new(
        repository: Repository,
        settings: PublishSettings,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            repository,
            settings,
            credentials,
        }
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    /// Resolve the credential, then publish. The credential is dropped when
    /// this call returns.
    pub fn publish(&self, tag: &str) -> Result<Published, ReleaseError> {
        let credential = self.credentials.resolve()?;
        self.publish_with(tag, &credential)
    }

    /// Push an earlier attempt's local commit and tag without staging
    /// anything new. The tag must exist locally and point at `HEAD`.
    pub fn resume(&self, tag: &str) -> Result<Published, ReleaseError> {
        let credential = self.credentials.resolve()?;
        self.resume_with(tag, &credential)
    }

    pub fn publish_with(&self, tag: &str, credential: &Credential) -> Result<Published, ReleaseError> {
        let repo = &self.repository;
        self.check_tag_name(tag)?;

        repo.add_all()
            .map_err(|e| ReleaseError::publish(PublishStep::Commit, e.to_string()))?;
        let has_changes = repo
            .has_staged_changes()
            .map_err(|e| ReleaseError::publish(PublishStep::Commit, e.to_string()))?;

        let resumed = self.check_local_tag(tag, has_changes)?;
        self.check_remote_tag(tag, credential)?;

        let commit_sha = if resumed {
            info!(tag = %tag, "Local commit and tag found, resuming at push");
            self.head()?
        } else {
            if !has_changes {
                return Err(ReleaseError::publish(
                    PublishStep::Commit,
                    "staged checkout has no changes to commit",
                ));
            }
            let sha = repo
                .commit(&self.settings.commit_message, &self.settings.identity)
                .map_err(|e| ReleaseError::publish(PublishStep::Commit, e.to_string()))?;
            emit_publish_step(PublishStep::Commit.as_str(), &sha);

            if let Err(e) = repo.create_tag(tag, &self.settings.identity) {
                if let Err(undo) = repo.undo_last_commit() {
                    warn!(error = %undo, "Could not undo release commit after tag failure");
                }
                return Err(ReleaseError::publish(PublishStep::Tag, e.to_string()));
            }
            emit_publish_step(PublishStep::Tag.as_str(), tag);
            sha
        };

        self.push(tag, credential)?;
        info!(tag = %tag, commit = %commit_sha, resumed, "Published");
        Ok(Published {
            tag: tag.to_string(),
            commit_sha,
            branch: repo.branch.clone(),
            resumed,
        })
    }

    pub fn resume_with(&self, tag: &str, credential: &Credential) -> Result<Published, ReleaseError> {
        let repo = &self.repository;
        self.check_tag_name(tag)?;

        let target = repo
            .local_tag_target(tag)
            .map_err(|e| ReleaseError::publish(PublishStep::Tag, e.to_string()))?
            .ok_or_else(|| {
                ReleaseError::publish(
                    PublishStep::Tag,
                    format!("no local tag '{tag}' to resume; run the full pipeline"),
                )
            })?;
        let head = self.head()?;
        if target != head {
            return Err(ReleaseError::publish(
                PublishStep::Tag,
                format!("tag '{tag}' points at {target}, not at HEAD; nothing to resume"),
            ));
        }

        self.check_remote_tag(tag, credential)?;
        info!(tag = %tag, commit = %head, "Resuming publish at push");
        self.push(tag, credential)?;
        info!(tag = %tag, commit = %head, resumed = true, "Published");
        Ok(Published {
            tag: tag.to_string(),
            commit_sha: head,
            branch: repo.branch.clone(),
            resumed: true,
        })
    }

    fn head(&self) -> Result<String, ReleaseError> {
        self.repository
            .head_sha()
            .map_err(|e| ReleaseError::publish(PublishStep::Commit, e.to_string()))
    }

    fn check_tag_name(&self, tag: &str) -> Result<(), ReleaseError> {
        let valid = self
            .repository
            .is_valid_tag_name(tag)
            .map_err(|e| ReleaseError::publish(PublishStep::Tag, e.to_string()))?;
        if valid {
            Ok(())
        } else {
            Err(ReleaseError::publish(
                PublishStep::Tag,
                format!("'{tag}' is not a valid tag name"),
            ))
        }
    }

    fn check_remote_tag(&self, tag: &str, credential: &Credential) -> Result<(), ReleaseError> {
        if !self.settings.reject_existing_tag {
            return Ok(());
        }
        let exists = self
            .repository
            .remote_tag_exists(tag, credential)
            .map_err(|e| {
                ReleaseError::publish(PublishStep::Push, format!("could not query remote tags: {e}"))
            })?;
        if exists {
            return Err(ReleaseError::publish(
                PublishStep::Tag,
                format!("tag '{tag}' already exists on the remote"),
            ));
        }
        Ok(())
    }

    /// Branch and tag go out in one atomic push, so a rejected push leaves
    /// the remote as it was.
    fn push(&self, tag: &str, credential: &Credential) -> Result<(), ReleaseError> {
        let repo = &self.repository;
        repo.push_release(tag, credential).map_err(|e| {
            warn!(tag = %tag, "Push failed; local commit and tag kept for retry");
            ReleaseError::publish(
                PublishStep::Push,
                format!("pushing '{}' and tag '{tag}': {e}", repo.branch),
            )
        })?;
        emit_publish_step(PublishStep::Push.as_str(), tag);
        Ok(())
    }

    /// `Ok(true)` when an earlier attempt left a resumable tag at `HEAD`.
    fn check_local_tag(&self, tag: &str, has_changes: bool) -> Result<bool, ReleaseError> {
        let target = self
            .repository
            .local_tag_target(tag)
            .map_err(|e| ReleaseError::publish(PublishStep::Tag, e.to_string()))?;
        let Some(target) = target else {
            return Ok(false);
        };

        let head = self.head()?;
        if target != head {
            return Err(ReleaseError::publish(
                PublishStep::Tag,
                format!("tag '{tag}' already exists locally at {target}, not at HEAD"),
            ));
        }
        if has_changes {
            return Err(ReleaseError::publish(
                PublishStep::Tag,
                format!(
                    "tag '{tag}' already exists locally but the checkout has new changes; \
                     use `bindship publish` to push the existing release commit"
                ),
            ));
        }
        Ok(true)
    }
}

#[async_trait]
impl StageAction for PublishManager {
    fn describe(&self) -> String {
        format!(
            "commit + tag + push to {} ({})",
            self.repository.remote_url, self.repository.branch
        )
    }

    async fn execute(&self, ctx: &mut ReleaseContext) -> Result<(), ReleaseError> {
        let manager = self.clone();
        let tag = ctx.tag.clone();
        let published = tokio::task::spawn_blocking(move || manager.publish(&tag))
            .await
            .map_err(|e| {
                ReleaseError::publish(PublishStep::Commit, format!("publish task failed: {e}"))
            })??;
        ctx.published = Some(published);
        Ok(())
    }
}
