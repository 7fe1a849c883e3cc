//! bindship CI - gated release pipeline
//!
//! Runs build → stage → test gates → publish strictly in sequence:
//! - Each stage starts only after its predecessor succeeded
//! - The first failure halts the run; publish is never reached after a failed gate
//! - Publish keeps its local commit and tag when the push fails, so a retry resumes at push

pub mod builder;
pub mod gate;
pub mod pipeline;
pub mod plan;
pub mod publish;
pub mod runner;
pub mod spec;
pub mod stage;
pub mod staging;

// Re-export key types
pub use builder::Builder;
pub use gate::{GateVerdict, TestGate};
pub use pipeline::{CancelSignal, Orchestrator, PipelineResult, PipelineRun, RunStatus, StageReport};
pub use plan::{
    credential_provider, gate_stage_name, publish_manager, release_stages, target_repository,
};
pub use publish::{PublishManager, PublishSettings, Published};
pub use runner::{CommandOutput, CommandRunner, CommandSpec, ProcessRunner, RunnerError};
pub use spec::ReleaseSpec;
pub use stage::{linear, BuiltinStage, ReleaseContext, Stage, StageAction, StageStatus};
pub use staging::StagingAction;
