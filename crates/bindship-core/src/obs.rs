//! Structured observability hooks for the release run lifecycle.
//!
//! Events are emitted at `info!` level (filter with `RUST_LOG`). Callers must
//! never pass secret material to these functions.

use tracing::{info, warn, Span};

/// Run-scoped span tagged with the run id and release tag.
///
/// Attach it to the run future with `Instrument::instrument` so every event
/// emitted by the stages carries both fields.
pub fn run_span(run_id: &str, tag: &str) -> Span {
    tracing::info_span!("bindship.run", run_id = %run_id, tag = %tag)
}

pub fn emit_run_started(run_id: &str, tag: &str, stage_count: usize) {
    info!(event = "run.started", run_id = %run_id, tag = %tag, stages = stage_count);
}

pub fn emit_stage_started(stage: &str, position: usize) {
    info!(event = "stage.started", stage = %stage, position = position);
}

pub fn emit_stage_finished(stage: &str, duration_ms: u64, success: bool) {
    info!(
        event = "stage.finished",
        stage = %stage,
        duration_ms = duration_ms,
        success = success,
    );
}

/// A stage that was never started because the run halted first.
pub fn emit_stage_skipped(stage: &str, reason: &str) {
    warn!(event = "stage.skipped", stage = %stage, reason = %reason);
}

pub fn emit_run_finished(run_id: &str, duration_ms: u64, success: bool, failed_stage: Option<&str>) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        success = success,
        failed_stage = failed_stage.unwrap_or("-"),
    );
}

/// One publish sub-step (commit, tag, push) completed.
pub fn emit_publish_step(step: &str, detail: &str) {
    info!(event = "publish.step", step = %step, detail = %detail);
}
