//! Release configuration stored in `bindship.toml`.
//!
//! Missing fields fall back to defaults; a missing file yields
//! `ReleaseConfig::default()`.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ReleaseError, Result};

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "bindship.toml";

/// Full release configuration (TOML).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReleaseConfig {
    pub build: BuildConfig,
    pub target: TargetConfig,
    pub credential: CredentialConfig,
    pub pipeline: PipelineConfig,

    /// Test suites, run in order after staging.
    pub suites: Vec<SuiteDescriptor>,
}

/// Build configuration flavour.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BuildProfile {
    #[default]
    Release,
    Debug,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BuildConfig {
    /// Toolchain invocation (first element is the executable).
    pub command: Vec<String>,

    /// Directory the toolchain runs in.
    pub working_dir: PathBuf,

    pub profile: BuildProfile,

    /// Flag appended for release builds.
    pub release_flag: String,

    /// Cargo-style features, passed as `--features a,b`.
    pub features: Vec<String>,

    pub no_default_features: bool,

    /// Directory the toolchain writes the artifact to, relative to `working_dir`.
    pub output_dir: PathBuf,

    /// 0 disables the deadline.
    pub timeout_secs: u64,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "cargo".to_string(),
                "run".to_string(),
                "--bin".to_string(),
                "gen-bindings".to_string(),
            ],
            working_dir: PathBuf::from("."),
            profile: BuildProfile::Release,
            release_flag: "--release".to_string(),
            features: Vec::new(),
            no_default_features: false,
            output_dir: PathBuf::from("build/Bindings"),
            timeout_secs: 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TargetConfig {
    pub remote_url: String,
    pub checkout_dir: PathBuf,
    pub branch: String,

    /// Artifact destination, relative to the checkout root.
    pub artifact_path: PathBuf,

    pub commit_message: String,
    pub committer_name: String,
    pub committer_email: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            remote_url: String::new(),
            checkout_dir: PathBuf::from("target-repo"),
            branch: "main".to_string(),
            artifact_path: PathBuf::from("Sources/Bindings"),
            commit_message: "Automatically update generated bindings".to_string(),
            committer_name: "bindship-bot".to_string(),
            committer_email: "bindship-bot@users.noreply.github.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CredentialConfig {
    /// Environment variable holding the push token.
    pub env_var: String,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            env_var: "PACKAGE_REPO_TOKEN".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Fail at the tag step when the remote already has the tag.
    pub reject_existing_tag: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            reject_existing_tag: true,
        }
    }
}

/// Which layer a suite exercises.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SuiteKind {
    /// Tests of the binding package itself.
    Library,
    /// Tests of an example application consuming the package.
    Integration,
}

/// One external test-runner invocation against the staged checkout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SuiteDescriptor {
    pub name: String,
    pub kind: SuiteKind,

    /// Runner invocation (first element is the executable).
    pub command: Vec<String>,

    /// Directory the runner starts in, relative to the checkout root.
    pub working_dir: PathBuf,

    /// Execution environment selector (device/platform/OS).
    pub destination: Option<String>,
    pub destination_flag: String,

    /// Individual test cases known to be unreliable.
    pub skip: Vec<String>,

    /// Prefix joined with each skipped case, e.g. `-skip-testing:`.
    pub skip_flag: String,

    /// 0 disables the deadline.
    pub timeout_secs: u64,
}

impl Default for SuiteDescriptor {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: SuiteKind::Library,
            command: Vec::new(),
            working_dir: PathBuf::from("."),
            destination: None,
            destination_flag: "-destination".to_string(),
            skip: Vec::new(),
            skip_flag: "-skip-testing:".to_string(),
            timeout_secs: 60 * 60,
        }
    }
}

impl SuiteDescriptor {
    pub fn new(name: impl Into<String>, kind: SuiteKind, command: Vec<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            command,
            ..Self::default()
        }
    }

    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    pub fn with_skip(mut self, case: impl Into<String>) -> Self {
        self.skip.push(case.into());
        self
    }

    /// Full argv: command, then destination, then one flag per skipped case.
    pub fn invocation(&self) -> Vec<String> {
        let mut argv = self.command.clone();
        if let Some(destination) = &self.destination {
            argv.push(self.destination_flag.clone());
            argv.push(destination.clone());
        }
        for case in &self.skip {
            argv.push(format!("{}{}", self.skip_flag, case));
        }
        argv
    }
}

fn default_suites() -> Vec<SuiteDescriptor> {
    let destination = "platform=iOS Simulator,name=iPhone 15,OS=latest";
    vec![
        SuiteDescriptor::new(
            "library",
            SuiteKind::Library,
            vec![
                "xcodebuild".to_string(),
                "test".to_string(),
                "-scheme".to_string(),
                "BindingsPackage".to_string(),
            ],
        )
        .with_destination(destination),
        SuiteDescriptor {
            working_dir: PathBuf::from("Example"),
            ..SuiteDescriptor::new(
                "integration",
                SuiteKind::Integration,
                vec![
                    "xcodebuild".to_string(),
                    "test".to_string(),
                    "-project".to_string(),
                    "Example.xcodeproj".to_string(),
                    "-scheme".to_string(),
                    "Example".to_string(),
                ],
            )
            .with_destination(destination)
        },
    ]
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            build: BuildConfig::default(),
            target: TargetConfig::default(),
            credential: CredentialConfig::default(),
            pipeline: PipelineConfig::default(),
            suites: default_suites(),
        }
    }
}

impl ReleaseConfig {
    pub fn validate(&self) -> Result<()> {
        if self.build.command.is_empty() || self.build.command[0].trim().is_empty() {
            return Err(config_err("build.command must be a non-empty array"));
        }
        if self.build.output_dir.as_os_str().is_empty() {
            return Err(config_err("build.output_dir must be set"));
        }
        if self.target.remote_url.trim().is_empty() {
            return Err(config_err("target.remote_url must be set"));
        }
        if self.target.branch.trim().is_empty() {
            return Err(config_err("target.branch must be set"));
        }
        if self.target.artifact_path.as_os_str().is_empty()
            || self.target.artifact_path.is_absolute()
        {
            return Err(config_err(
                "target.artifact_path must be a relative path inside the checkout",
            ));
        }
        if self.target.commit_message.trim().is_empty() {
            return Err(config_err("target.commit_message must be set"));
        }
        if self.credential.env_var.trim().is_empty() {
            return Err(config_err("credential.env_var must be set"));
        }
        if self.suites.is_empty() {
            return Err(config_err("at least one [[suites]] entry is required"));
        }

        let mut names = HashSet::new();
        for suite in &self.suites {
            if suite.name.trim().is_empty() {
                return Err(config_err("every suite needs a name"));
            }
            if !names.insert(suite.name.as_str()) {
                return Err(config_err(format!("duplicate suite name '{}'", suite.name)));
            }
            if suite.command.is_empty() || suite.command[0].trim().is_empty() {
                return Err(config_err(format!(
                    "suite '{}' command must be a non-empty array",
                    suite.name
                )));
            }
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ReleaseConfig::default()`.
pub fn load_config(path: &Path) -> Result<ReleaseConfig> {
    if !path.exists() {
        return Ok(ReleaseConfig::default());
    }
    let raw = fs::read_to_string(path)?;
    toml::from_str(&raw)
        .map_err(|e| config_err(format!("failed to parse {}: {e}", path.display())))
}

fn config_err(msg: impl Into<String>) -> ReleaseError {
    ReleaseError::Config(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join(DEFAULT_CONFIG_FILE)).unwrap();
        assert_eq!(config, ReleaseConfig::default());
        assert_eq!(config.suites.len(), 2);
    }

    #[test]
    fn test_defaults_need_remote_url() {
        let err = ReleaseConfig::default().validate().unwrap_err();
        assert!(err.to_string().contains("remote_url"));
    }

    #[test]
    fn test_partial_file_merges_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        fs::write(
            &path,
            r#"
[target]
remote_url = "https://github.com/example/bindings-package.git"

[credential]
env_var = "BINDINGS_REPO_TOKEN"

[[suites]]
name = "unit"
kind = "library"
command = ["swift", "test"]
skip = ["FlakyTests/testTimeout"]
skip_flag = "--skip="
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        config.validate().unwrap();
        assert_eq!(config.target.branch, "main");
        assert_eq!(config.credential.env_var, "BINDINGS_REPO_TOKEN");
        assert_eq!(config.suites.len(), 1);
        assert_eq!(
            config.suites[0].invocation(),
            vec!["swift", "test", "--skip=FlakyTests/testTimeout"]
        );
    }

    #[test]
    fn test_duplicate_suite_names_rejected() {
        let mut config = ReleaseConfig::default();
        config.target.remote_url = "file:///tmp/remote.git".to_string();
        config.suites[1].name = config.suites[0].name.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invocation_appends_destination_and_skips() {
        let suite = SuiteDescriptor::new(
            "library",
            SuiteKind::Library,
            vec!["xcodebuild".to_string(), "test".to_string()],
        )
        .with_destination("platform=iOS Simulator,name=iPhone 15")
        .with_skip("PackageTests/testProveLarge");

        assert_eq!(
            suite.invocation(),
            vec![
                "xcodebuild",
                "test",
                "-destination",
                "platform=iOS Simulator,name=iPhone 15",
                "-skip-testing:PackageTests/testProveLarge",
            ]
        );
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        fs::write(&path, "[build\ncommand = 3").unwrap();
        assert!(matches!(load_config(&path), Err(ReleaseError::Config(_))));
    }
}
