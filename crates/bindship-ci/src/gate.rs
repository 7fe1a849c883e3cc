//! Test gates: one external suite run, one pass/fail verdict.

use async_trait::async_trait;
use bindship_core::{ReleaseError, Repository, SuiteDescriptor};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::runner::{CommandRunner, CommandSpec};
use crate::stage::{ReleaseContext, StageAction};

const FAILURE_TAIL_LINES: usize = 40;

/// Gate evaluation verdict.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum GateVerdict {
    Pass,
    Fail { details: String },
}

impl GateVerdict {
    pub fn passed(&self) -> bool {
        matches!(self, GateVerdict::Pass)
    }
}

/// Runs a suite against the staged checkout. Never retries; any failing case
/// fails the whole gate.
pub struct TestGate {
    suite: SuiteDescriptor,
    repository: Repository,
    runner: Arc<dyn CommandRunner>,
}

impl TestGate {
    pub fn new(suite: SuiteDescriptor, repository: Repository, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            suite,
            repository,
            runner,
        }
    }

    pub fn suite(&self) -> &SuiteDescriptor {
        &self.suite
    }

    pub async fn verify(&self) -> GateVerdict {
        let spec = CommandSpec::new(
            format!("suite:{}", self.suite.name),
            self.suite.invocation(),
            self.repository.local_checkout_path.join(&self.suite.working_dir),
        )
        .with_timeout(self.suite.timeout_secs);

        info!(
            suite = %self.suite.name,
            kind = ?self.suite.kind,
            skipped = self.suite.skip.len(),
            "Running test suite"
        );

        match self.runner.run(&spec).await {
            Ok(output) if output.passed() => {
                info!(suite = %self.suite.name, duration_ms = output.duration_ms, "Suite passed");
                GateVerdict::Pass
            }
            Ok(output) => GateVerdict::Fail {
                details: format!(
                    "exit code {}:\n{}",
                    output.exit_code,
                    output.tail(FAILURE_TAIL_LINES)
                ),
            },
            Err(e) => GateVerdict::Fail {
                details: e.to_string(),
            },
        }
    }
}

#[async_trait]
impl StageAction for TestGate {
    fn describe(&self) -> String {
        self.suite.invocation().join(" ")
    }

    async fn execute(&self, _ctx: &mut ReleaseContext) -> Result<(), ReleaseError> {
        match self.verify().await {
            GateVerdict::Pass => Ok(()),
            GateVerdict::Fail { details } => Err(ReleaseError::TestFailure {
                suite: self.suite.name.clone(),
                details,
            }),
        }
    }
}
