//! Release pipeline orchestration.
//!
//! Stages run strictly in order. The first failure halts the run; later
//! stages are never started and earlier ones are not undone.

use bindship_core::obs::{
    emit_run_finished, emit_run_started, emit_stage_finished, emit_stage_skipped,
    emit_stage_started, run_span,
};
use bindship_core::ReleaseError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, Instrument};
use uuid::Uuid;

use crate::publish::Published;
use crate::spec::ReleaseSpec;
use crate::stage::{BuiltinStage, ReleaseContext, Stage, StageStatus};

/// Overall status of a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// Abort request honoured between stages.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One execution: the ordered stages and the run-level status.
#[derive(Debug)]
pub struct PipelineRun {
    pub id: String,
    pub status: RunStatus,
    pub stages: Vec<Stage>,
}

impl PipelineRun {
    fn new(stages: Vec<Stage>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            status: RunStatus::Pending,
            stages,
        }
    }

    /// First declared dependency of stage `idx` that has not succeeded.
    fn unmet_dependency(&self, idx: usize) -> Option<String> {
        self.stages[idx]
            .depends_on()
            .iter()
            .find(|dep| {
                !self.stages[..idx]
                    .iter()
                    .any(|s| s.name() == dep.as_str() && s.status() == StageStatus::Succeeded)
            })
            .cloned()
    }
}

/// Outcome of one stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageReport {
    /// Stage name: `build`, `stage`, `test_gate(<suite>)` or `publish`.
    pub name: String,

    /// Which builtin stage this is, independent of the suite name.
    pub kind: BuiltinStage,

    pub status: StageStatus,
    pub duration_ms: u64,

    /// Error kind, e.g. `test_failure`.
    pub error_kind: Option<String>,

    /// Rendered error, free of secrets.
    pub error: Option<String>,
}

/// Result of a complete pipeline execution.
#[derive(Debug, Serialize)]
pub struct PipelineResult {
    pub run_id: String,
    pub status: RunStatus,
    pub release: ReleaseSpec,
    pub stages: Vec<StageReport>,

    /// Stage the run halted at.
    pub failed_stage: Option<String>,

    pub started_at: DateTime<Utc>,

    /// Total duration in milliseconds.
    pub duration_ms: u64,

    pub published: Option<Published>,

    #[serde(skip)]
    pub error: Option<ReleaseError>,
}

impl PipelineResult {
    pub fn success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    /// Number of stages that passed.
    pub fn passed_count(&self) -> usize {
        self.stages
            .iter()
            .filter(|s| s.status == StageStatus::Succeeded)
            .count()
    }

    /// Number of stages that failed.
    pub fn failed_count(&self) -> usize {
        self.stages
            .iter()
            .filter(|s| s.status == StageStatus::Failed)
            .count()
    }

    pub fn stage(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.name == name)
    }
}

/// Executes a stage list for one release. Holds no I/O of its own.
#[derive(Debug, Clone, Default)]
pub struct Orchestrator {
    cancel: CancelSignal,
}

impl Orchestrator {
    pub fn new(cancel: CancelSignal) -> Self {
        Self { cancel }
    }

    pub async fn run(&self, release: &ReleaseSpec, stages: Vec<Stage>) -> PipelineResult {
        let run = PipelineRun::new(stages);
        let span = run_span(&run.id, &release.tag);
        self.execute(run, release).instrument(span).await
    }

    async fn execute(&self, mut run: PipelineRun, release: &ReleaseSpec) -> PipelineResult {
        let start = Instant::now();
        let started_at = Utc::now();

        emit_run_started(&run.id, &release.tag, run.stages.len());
        info!(
            stages_digest = %release.short_digest(),
            source_sha = ?release.source_sha,
            "Starting release pipeline"
        );

        let mut ctx = ReleaseContext::new(release.tag.clone());
        let mut durations = vec![0u64; run.stages.len()];
        let mut errors: Vec<Option<(String, String)>> = vec![None; run.stages.len()];
        let mut failure: Option<(usize, ReleaseError)> = None;

        run.status = RunStatus::Running;

        for idx in 0..run.stages.len() {
            let name = run.stages[idx].name().to_string();

            if self.cancel.is_cancelled() {
                failure = Some((idx, ReleaseError::Cancelled { stage: name }));
                break;
            }

            if let Some(dependency) = run.unmet_dependency(idx) {
                run.stages[idx].transition(StageStatus::Failed);
                failure = Some((
                    idx,
                    ReleaseError::DependencyNotSatisfied {
                        stage: name,
                        dependency,
                    },
                ));
                break;
            }

            run.stages[idx].transition(StageStatus::Running);
            emit_stage_started(&name, idx);
            let stage_start = Instant::now();

            let outcome = run.stages[idx].action().execute(&mut ctx).await;

            durations[idx] = stage_start.elapsed().as_millis() as u64;
            match outcome {
                Ok(()) => {
                    run.stages[idx].transition(StageStatus::Succeeded);
                    emit_stage_finished(&name, durations[idx], true);
                }
                Err(e) => {
                    run.stages[idx].transition(StageStatus::Failed);
                    emit_stage_finished(&name, durations[idx], false);
                    error!(stage = %name, kind = e.kind(), error = %e, "Stage failed");
                    failure = Some((idx, e));
                    break;
                }
            }
        }

        let failed_stage = failure.as_ref().map(|(idx, _)| run.stages[*idx].name().to_string());
        if let Some((idx, e)) = &failure {
            errors[*idx] = Some((e.kind().to_string(), e.to_string()));
            for stage in run.stages.iter().skip(idx + 1) {
                emit_stage_skipped(stage.name(), "halted after earlier stage failure");
            }
        }

        run.status = if failure.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::Succeeded
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        emit_run_finished(
            &run.id,
            duration_ms,
            run.status == RunStatus::Succeeded,
            failed_stage.as_deref(),
        );

        let stages = run
            .stages
            .iter()
            .zip(durations)
            .zip(errors)
            .map(|((stage, duration_ms), error)| {
                let (error_kind, error) = match error {
                    Some((kind, message)) => (Some(kind), Some(message)),
                    None => (None, None),
                };
                StageReport {
                    name: stage.name().to_string(),
                    kind: stage.kind(),
                    status: stage.status(),
                    duration_ms,
                    error_kind,
                    error,
                }
            })
            .collect();

        PipelineResult {
            run_id: run.id,
            status: run.status,
            release: release.clone(),
            stages,
            failed_stage,
            started_at,
            duration_ms,
            published: ctx.published,
            error: failure.map(|(_, e)| e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{linear, BuiltinStage, StageAction};
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    struct Recorder {
        name: String,
        log: Log,
        fail: bool,
        cancel: Option<CancelSignal>,
    }

    #[async_trait]
    impl StageAction for Recorder {
        fn describe(&self) -> String {
            format!("record {}", self.name)
        }

        async fn execute(&self, _ctx: &mut ReleaseContext) -> Result<(), ReleaseError> {
            self.log.lock().unwrap().push(self.name.clone());
            if let Some(cancel) = &self.cancel {
                cancel.cancel();
            }
            if self.fail {
                Err(ReleaseError::TestFailure {
                    suite: self.name.clone(),
                    details: "1 test failed".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    fn stage(name: &str, log: &Log, fail: bool) -> Stage {
        Stage::new(
            name,
            BuiltinStage::TestGate,
            Box::new(Recorder {
                name: name.to_string(),
                log: log.clone(),
                fail,
                cancel: None,
            }),
        )
    }

    fn release() -> ReleaseSpec {
        ReleaseSpec {
            tag: "v1.2.3".to_string(),
            source_dir: PathBuf::from("."),
            source_sha: None,
            stages_digest: "0".repeat(64),
        }
    }

    fn statuses(result: &PipelineResult) -> Vec<StageStatus> {
        result.stages.iter().map(|s| s.status).collect()
    }

    #[tokio::test]
    async fn test_all_stages_succeed_in_order() {
        let log = Log::default();
        let stages = linear(vec![
            stage("build", &log, false),
            stage("stage", &log, false),
            stage("publish", &log, false),
        ]);

        let result = Orchestrator::default().run(&release(), stages).await;

        assert!(result.success());
        assert_eq!(*log.lock().unwrap(), vec!["build", "stage", "publish"]);
        assert_eq!(result.passed_count(), 3);
        assert!(result.failed_stage.is_none());
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_first_failure_halts_run() {
        let log = Log::default();
        let stages = linear(vec![
            stage("build", &log, false),
            stage("test_gate(library)", &log, true),
            stage("test_gate(integration)", &log, false),
            stage("publish", &log, false),
        ]);

        let result = Orchestrator::default().run(&release(), stages).await;

        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(result.failed_stage.as_deref(), Some("test_gate(library)"));
        assert_eq!(*log.lock().unwrap(), vec!["build", "test_gate(library)"]);
        assert_eq!(
            statuses(&result),
            vec![
                StageStatus::Succeeded,
                StageStatus::Failed,
                StageStatus::Pending,
                StageStatus::Pending
            ]
        );
        let report = result.stage("test_gate(library)").unwrap();
        assert_eq!(report.error_kind.as_deref(), Some("test_failure"));
        assert!(matches!(result.error, Some(ReleaseError::TestFailure { .. })));
    }

    #[tokio::test]
    async fn test_unmet_dependency_fails_without_invoking() {
        let log = Log::default();
        let stages = vec![
            stage("build", &log, false),
            stage("publish", &log, false).after("test_gate(library)"),
        ];

        let result = Orchestrator::default().run(&release(), stages).await;

        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(*log.lock().unwrap(), vec!["build"]);
        assert_eq!(result.stage("publish").unwrap().status, StageStatus::Failed);
        match result.error {
            Some(ReleaseError::DependencyNotSatisfied { stage, dependency }) => {
                assert_eq!(stage, "publish");
                assert_eq!(dependency, "test_gate(library)");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_dependency_must_come_earlier() {
        let log = Log::default();
        let stages = vec![
            stage("publish", &log, false).after("build"),
            stage("build", &log, false),
        ];

        let result = Orchestrator::default().run(&release(), stages).await;

        assert_eq!(result.failed_stage.as_deref(), Some("publish"));
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let log = Log::default();
        let cancel = CancelSignal::new();
        cancel.cancel();

        let result = Orchestrator::new(cancel)
            .run(&release(), linear(vec![stage("build", &log, false)]))
            .await;

        assert_eq!(result.status, RunStatus::Failed);
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(statuses(&result), vec![StageStatus::Pending]);
        assert!(matches!(result.error, Some(ReleaseError::Cancelled { .. })));
    }

    #[tokio::test]
    async fn test_cancel_between_stages() {
        let log = Log::default();
        let cancel = CancelSignal::new();
        let first = Stage::new(
            "build",
            BuiltinStage::Build,
            Box::new(Recorder {
                name: "build".to_string(),
                log: log.clone(),
                fail: false,
                cancel: Some(cancel.clone()),
            }),
        );

        let result = Orchestrator::new(cancel)
            .run(&release(), linear(vec![first, stage("stage", &log, false)]))
            .await;

        assert_eq!(*log.lock().unwrap(), vec!["build"]);
        assert_eq!(result.failed_stage.as_deref(), Some("stage"));
        assert_eq!(
            statuses(&result),
            vec![StageStatus::Succeeded, StageStatus::Pending]
        );
    }

    #[tokio::test]
    async fn test_result_serializes_to_json() {
        let log = Log::default();
        let result = Orchestrator::default()
            .run(&release(), linear(vec![stage("build", &log, true)]))
            .await;

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["failed_stage"], "build");
        assert_eq!(json["stages"][0]["status"], "failed");
        assert_eq!(json["stages"][0]["kind"], "test_gate");
        assert!(json.get("error").is_none());
    }
}
