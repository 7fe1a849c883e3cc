//! Release stage definitions and the per-stage state machine.

use async_trait::async_trait;
use bindship_core::{Artifact, ReleaseError, StagedArtifact};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::publish::Published;

/// Builtin release stages, in pipeline order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinStage {
    /// Compile the binding artifact.
    Build,

    /// Replace the artifact inside the target checkout.
    Stage,

    /// Run one named test suite against the staged checkout.
    TestGate,

    /// Commit, tag and push.
    Publish,
}

impl BuiltinStage {
    pub fn name(&self) -> &'static str {
        match self {
            BuiltinStage::Build => "build",
            BuiltinStage::Stage => "stage",
            BuiltinStage::TestGate => "test_gate",
            BuiltinStage::Publish => "publish",
        }
    }
}

/// Lifecycle of a stage. Transitions only move forward.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl StageStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StageStatus::Succeeded | StageStatus::Failed)
    }

    fn can_move_to(&self, next: StageStatus) -> bool {
        matches!(
            (self, next),
            (StageStatus::Pending, StageStatus::Running)
                | (StageStatus::Pending, StageStatus::Failed)
                | (StageStatus::Running, StageStatus::Succeeded)
                | (StageStatus::Running, StageStatus::Failed)
        )
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StageStatus::Pending => "pending",
            StageStatus::Running => "running",
            StageStatus::Succeeded => "succeeded",
            StageStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Values stages hand to later stages during one run.
#[derive(Debug, Default)]
pub struct ReleaseContext {
    pub tag: String,
    pub artifact: Option<Artifact>,
    pub staged: Option<StagedArtifact>,
    pub published: Option<Published>,
}

impl ReleaseContext {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }
}

/// The work a stage performs.
#[async_trait]
pub trait StageAction: Send + Sync {
    /// Human-readable description of what the action invokes.
    fn describe(&self) -> String;

    async fn execute(&self, ctx: &mut ReleaseContext) -> Result<(), ReleaseError>;
}

/// One ordered step of the pipeline.
pub struct Stage {
    name: String,
    kind: BuiltinStage,
    depends_on: Vec<String>,
    status: StageStatus,
    action: Box<dyn StageAction>,
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("depends_on", &self.depends_on)
            .field("status", &self.status)
            .finish()
    }
}

impl Stage {
    pub fn new(name: impl Into<String>, kind: BuiltinStage, action: Box<dyn StageAction>) -> Self {
        Self {
            name: name.into(),
            kind,
            depends_on: Vec::new(),
            status: StageStatus::Pending,
            action,
        }
    }

    /// Declare a stage that must have succeeded before this one starts.
    pub fn after(mut self, dependency: impl Into<String>) -> Self {
        self.depends_on.push(dependency.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> BuiltinStage {
        self.kind
    }

    pub fn depends_on(&self) -> &[String] {
        &self.depends_on
    }

    pub fn status(&self) -> StageStatus {
        self.status
    }

    pub fn describe(&self) -> String {
        self.action.describe()
    }

    pub(crate) fn action(&self) -> &dyn StageAction {
        self.action.as_ref()
    }

    /// Move to `next`. Returns `false` and leaves the status unchanged when the
    /// transition would go backwards.
    pub(crate) fn transition(&mut self, next: StageStatus) -> bool {
        if self.status.can_move_to(next) {
            self.status = next;
            true
        } else {
            false
        }
    }
}

/// Chain stages so each depends on the one before it.
pub fn linear(stages: Vec<Stage>) -> Vec<Stage> {
    let mut out: Vec<Stage> = Vec::with_capacity(stages.len());
    for stage in stages {
        let stage = match out.last() {
            Some(prev) if !stage.depends_on.contains(&prev.name) => {
                let dep = prev.name.clone();
                stage.after(dep)
            }
            _ => stage,
        };
        out.push(stage);
    }
    out
}
