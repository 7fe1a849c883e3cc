//! Git operations on the target repository checkout.
//!
//! All operations shell out to the system `git`. Commands that reach the
//! remote with a credential pass it through the child's environment and an
//! inline credential helper, never through argv or on-disk config.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tracing::debug;

use crate::credential::Credential;
use crate::error::{ReleaseError, Result};

/// Environment variable the inline credential helper reads the token from.
const TOKEN_ENV: &str = "BINDSHIP_GIT_TOKEN";

/// Inline helper answering git's credential prompt from [`TOKEN_ENV`].
const CREDENTIAL_HELPER: &str =
    "!f() { echo username=x-access-token; echo \"password=${BINDSHIP_GIT_TOKEN}\"; }; f";

/// Name of the remote created by `git clone`.
pub const REMOTE_NAME: &str = "origin";

/// Commit author/committer identity for release commits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

/// The cloned target repository.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Repository {
    pub remote_url: String,
    pub local_checkout_path: PathBuf,
    pub branch: String,
}

impl Repository {
    pub fn new(
        remote_url: impl Into<String>,
        local_checkout_path: impl Into<PathBuf>,
        branch: impl Into<String>,
    ) -> Self {
        Self {
            remote_url: remote_url.into(),
            local_checkout_path: local_checkout_path.into(),
            branch: branch.into(),
        }
    }

    /// Clone the remote into the checkout path unless a clone already exists.
    ///
    /// Returns `true` when a fresh clone was made.
    pub fn ensure_checkout(&self) -> Result<bool> {
        let path = &self.local_checkout_path;
        if path.exists() {
            if is_git_repo(path) {
                debug!(path = %path.display(), "Reusing existing checkout");
                return Ok(false);
            }
            let non_empty = std::fs::read_dir(path)?.next().is_some();
            if non_empty {
                return Err(ReleaseError::Git(format!(
                    "checkout path {} exists and is not a git repository",
                    path.display()
                )));
            }
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let output = base_command()
            .args(["clone", "--branch", &self.branch, "--"])
            .arg(&self.remote_url)
            .arg(path)
            .output()
            .map_err(|e| ReleaseError::Git(format!("failed to run git: {e}")))?;
        check("git clone", &output)?;
        Ok(true)
    }

    /// Stage every change in the working tree (`git add -A`).
    pub fn add_all(&self) -> Result<()> {
        self.run(&["add", "-A"]).map(|_| ())
    }

    /// Whether the index differs from `HEAD`.
    pub fn has_staged_changes(&self) -> Result<bool> {
        let output = self
            .git()
            .args(["diff", "--cached", "--quiet"])
            .output()
            .map_err(spawn_err)?;
        match output.status.code() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(ReleaseError::Git(format!(
                "git diff --cached failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ))),
        }
    }

    /// Create a commit from the index and return its SHA.
    pub fn commit(&self, message: &str, identity: &Identity) -> Result<String> {
        self.run_as(identity, &["commit", "--no-verify", "-m", message])?;
        self.head_sha()
    }

    pub fn head_sha(&self) -> Result<String> {
        capture_head_sha(&self.local_checkout_path)
    }

    /// Create a lightweight tag at `HEAD`. Fails if the tag exists.
    pub fn create_tag(&self, tag: &str, identity: &Identity) -> Result<()> {
        self.run_as(identity, &["tag", "--", tag]).map(|_| ())
    }

    /// Commit a local tag points at, or `None` when the tag does not exist.
    pub fn local_tag_target(&self, tag: &str) -> Result<Option<String>> {
        let reference = format!("refs/tags/{tag}^{{commit}}");
        let output = self
            .git()
            .args(["rev-parse", "-q", "--verify", &reference])
            .output()
            .map_err(spawn_err)?;
        if output.status.success() {
            let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
            Ok(Some(sha))
        } else {
            Ok(None)
        }
    }

    /// Whether the remote already has a tag with this name.
    pub fn remote_tag_exists(&self, tag: &str, credential: &Credential) -> Result<bool> {
        let reference = format!("refs/tags/{tag}");
        let stdout = self.run_authenticated(
            credential,
            &["ls-remote", "--tags", REMOTE_NAME, &reference],
        )?;
        Ok(!stdout.trim().is_empty())
    }

    /// Push `HEAD` to the configured branch and `tag` to the remote in one
    /// atomic push. Either both refs update or neither does.
    pub fn push_release(&self, tag: &str, credential: &Credential) -> Result<()> {
        let branch_refspec = format!("HEAD:refs/heads/{}", self.branch);
        let tag_refspec = format!("refs/tags/{tag}");
        self.run_authenticated(
            credential,
            &["push", "--atomic", REMOTE_NAME, &branch_refspec, &tag_refspec],
        )
        .map(|_| ())
    }

    /// Whether git accepts `tag` as a tag name.
    pub fn is_valid_tag_name(&self, tag: &str) -> Result<bool> {
        let output = self
            .git()
            .args(["check-ref-format", &format!("refs/tags/{tag}")])
            .output()
            .map_err(spawn_err)?;
        Ok(output.status.success())
    }

    /// Drop the last commit, keeping its changes staged in the index.
    pub fn undo_last_commit(&self) -> Result<()> {
        self.run(&["reset", "--soft", "HEAD~1"]).map(|_| ())
    }

    fn git(&self) -> Command {
        let mut cmd = base_command();
        cmd.current_dir(&self.local_checkout_path);
        cmd
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        let output = self.git().args(args).output().map_err(spawn_err)?;
        check(&describe(args), &output)?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn run_as(&self, identity: &Identity, args: &[&str]) -> Result<String> {
        let output = self
            .git()
            .arg("-c")
            .arg(format!("user.name={}", identity.name))
            .arg("-c")
            .arg(format!("user.email={}", identity.email))
            .args(args)
            .output()
            .map_err(spawn_err)?;
        check(&describe(args), &output)?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn run_authenticated(&self, credential: &Credential, args: &[&str]) -> Result<String> {
        let output = self
            .git()
            .args(["-c", "credential.helper="])
            .arg("-c")
            .arg(format!("credential.helper={CREDENTIAL_HELPER}"))
            .args(args)
            .env(TOKEN_ENV, credential.expose_secret())
            .output()
            .map_err(spawn_err)?;
        check(&describe(args), &output)?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Capture the HEAD commit SHA from a git repository.
///
/// Runs `git rev-parse HEAD` in the given directory. Returns an error if the
/// directory is not inside a git repository or if git is not available.
pub fn capture_head_sha(repo_dir: &Path) -> Result<String> {
    let output = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(repo_dir)
        .output()
        .map_err(spawn_err)?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ReleaseError::Git(format!(
            "git rev-parse HEAD failed: {}",
            stderr.trim()
        )));
    }

    let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if sha.is_empty() {
        return Err(ReleaseError::Git(
            "git rev-parse HEAD returned empty output".to_string(),
        ));
    }

    Ok(sha)
}

/// Check whether a directory is the top of a git work tree.
pub fn is_git_repo(dir: &Path) -> bool {
    Command::new("git")
        .args(["rev-parse", "--show-toplevel"])
        .current_dir(dir)
        .output()
        .map(|o| {
            o.status.success()
                && match (
                    std::fs::canonicalize(String::from_utf8_lossy(&o.stdout).trim()),
                    std::fs::canonicalize(dir),
                ) {
                    (Ok(top), Ok(dir)) => top == dir,
                    _ => false,
                }
        })
        .unwrap_or(false)
}

fn base_command() -> Command {
    let mut cmd = Command::new("git");
    cmd.env("GIT_TERMINAL_PROMPT", "0");
    cmd
}

fn describe(args: &[&str]) -> String {
    match args.first() {
        Some(sub) => format!("git {sub}"),
        None => "git".to_string(),
    }
}

fn check(what: &str, output: &Output) -> Result<()> {
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(ReleaseError::Git(format!("{what} failed: {}", stderr.trim())))
}

fn spawn_err(e: std::io::Error) -> ReleaseError {
    ReleaseError::Git(format!("failed to run git: {e}"))
}
