//! External command execution for build and test stages.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::debug;

/// An external command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Label used in logs and errors.
    pub label: String,

    /// Command to execute (first element is executable).
    pub argv: Vec<String>,

    pub working_dir: PathBuf,

    /// Timeout in seconds (0 = unbounded).
    pub timeout_secs: u64,
}

impl CommandSpec {
    pub fn new(label: impl Into<String>, argv: Vec<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            label: label.into(),
            argv,
            working_dir: working_dir.into(),
            timeout_secs: 0,
        }
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// The argv joined for display.
    pub fn display(&self) -> String {
        self.argv.join(" ")
    }
}

/// Result of a command execution.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code (0 = success, -1 when killed by a signal).
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,

    /// Whether execution succeeded.
    pub success: bool,
}

impl CommandOutput {
    /// Whether the command passed (exit code 0).
    pub fn passed(&self) -> bool {
        self.success && self.exit_code == 0
    }

    /// Last `lines` lines of stderr, falling back to stdout when stderr is empty.
    pub fn tail(&self, lines: usize) -> String {
        let source = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        let all: Vec<&str> = source.lines().collect();
        let start = all.len().saturating_sub(lines);
        all[start..].join("\n")
    }
}

/// Why a command could not produce an exit status.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("command '{label}' has an empty argv")]
    EmptyCommand { label: String },

    #[error("failed to spawn '{label}': {source}")]
    Spawn {
        label: String,
        #[source]
        source: std::io::Error,
    },

    #[error("command '{label}' timed out after {timeout_secs} seconds")]
    Timeout { label: String, timeout_secs: u64 },
}

/// Runs external commands. Implemented by [`ProcessRunner`] and by test fakes.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RunnerError>;
}

/// Runs commands as child processes, blocking the caller until they exit.
#[derive(Debug, Default, Clone)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RunnerError> {
        let start = Instant::now();

        let Some((exe, args)) = spec.argv.split_first() else {
            return Err(RunnerError::EmptyCommand {
                label: spec.label.clone(),
            });
        };

        debug!(label = %spec.label, command = %spec.display(), "Spawning command");

        let child = Command::new(exe)
            .args(args)
            .current_dir(&spec.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RunnerError::Spawn {
                label: spec.label.clone(),
                source,
            })?;

        let output = if spec.timeout_secs > 0 {
            tokio::time::timeout(
                Duration::from_secs(spec.timeout_secs),
                child.wait_with_output(),
            )
            .await
            .map_err(|_| RunnerError::Timeout {
                label: spec.label.clone(),
                timeout_secs: spec.timeout_secs,
            })?
        } else {
            child.wait_with_output().await
        }
        .map_err(|source| RunnerError::Spawn {
            label: spec.label.clone(),
            source,
        })?;

        let duration_ms = start.elapsed().as_millis() as u64;

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms,
            success: output.status.success(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(stdout: &str, stderr: &str) -> CommandOutput {
        CommandOutput {
            exit_code: 1,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            duration_ms: 1,
            success: false,
        }
    }

    #[test]
    fn test_tail_prefers_stderr() {
        let out = output("out", "a\nb\nc\nd");
        assert_eq!(out.tail(2), "c\nd");
        assert!(!out.passed());
    }

    #[test]
    fn test_tail_falls_back_to_stdout() {
        let out = output("only stdout", "  ");
        assert_eq!(out.tail(5), "only stdout");
    }

    #[tokio::test]
    async fn test_execute_simple_command() {
        let spec = CommandSpec::new(
            "echo_test",
            vec!["echo".to_string(), "hello".to_string()],
            ".",
        )
        .with_timeout(60);

        let result = ProcessRunner.run(&spec).await.expect("execute failed");
        assert!(result.passed());
        assert_eq!(result.exit_code, 0);
        assert!(result.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn test_execute_failing_command() {
        let spec = CommandSpec::new("false_test", vec!["false".to_string()], ".");

        let result = ProcessRunner.run(&spec).await.expect("execute failed");
        assert!(!result.success);
        assert_ne!(result.exit_code, 0);
    }

    #[tokio::test]
    async fn test_empty_command_rejected() {
        let spec = CommandSpec::new("empty", vec![], ".");
        assert!(matches!(
            ProcessRunner.run(&spec).await,
            Err(RunnerError::EmptyCommand { .. })
        ));
    }

    #[tokio::test]
    async fn test_timeout_reported() {
        let spec = CommandSpec::new(
            "sleepy",
            vec!["sleep".to_string(), "5".to_string()],
            ".",
        )
        .with_timeout(1);

        assert!(matches!(
            ProcessRunner.run(&spec).await,
            Err(RunnerError::Timeout { timeout_secs: 1, .. })
        ));
    }
}
