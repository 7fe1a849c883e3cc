//! Publish credential resolution.
//!
//! The credential is read from the process environment at the moment the
//! publish step needs it and lives only as long as that call.

use std::fmt;

use crate::error::{ReleaseError, Result};

/// Opaque publish secret. Never displayed, never serialized.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Borrow the raw secret. Only the git transport layer should call this.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Source of the publish credential.
pub trait CredentialProvider: Send + Sync {
    /// Name of the credential this provider expects, for error messages.
    fn name(&self) -> &str;

    fn resolve(&self) -> Result<Credential>;
}

/// Reads the credential from a single environment variable.
#[derive(Debug, Clone)]
pub struct EnvCredentialProvider {
    var: String,
}

impl EnvCredentialProvider {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl CredentialProvider for EnvCredentialProvider {
    fn name(&self) -> &str {
        &self.var
    }

    fn resolve(&self) -> Result<Credential> {
        match std::env::var(&self.var) {
            Ok(value) if !value.trim().is_empty() => Ok(Credential(value)),
            _ => Err(ReleaseError::CredentialMissing {
                name: self.var.clone(),
            }),
        }
    }
}

/// Fixed credential, for tests and embedding callers that resolve secrets
/// themselves.
#[derive(Debug, Clone)]
pub struct StaticCredentialProvider {
    name: String,
    credential: Option<Credential>,
}

impl StaticCredentialProvider {
    pub fn new(name: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            credential: Some(Credential::new(secret)),
        }
    }

    /// A provider that always reports the credential as missing.
    pub fn missing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            credential: None,
        }
    }
}

impl CredentialProvider for StaticCredentialProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn resolve(&self) -> Result<Credential> {
        self.credential
            .clone()
            .ok_or_else(|| ReleaseError::CredentialMissing {
                name: self.name.clone(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_secret() {
        let cred = Credential::new("ghp_supersecret");
        let rendered = format!("{:?}", cred);
        assert!(!rendered.contains("supersecret"));
        assert!(rendered.contains("redacted"));
    }

    #[test]
    fn test_env_provider_missing_names_variable() {
        let provider = EnvCredentialProvider::new("BINDSHIP_TEST_TOKEN_NEVER_SET_7f3a");
        let err = provider.resolve().unwrap_err();
        match err {
            ReleaseError::CredentialMissing { name } => {
                assert_eq!(name, "BINDSHIP_TEST_TOKEN_NEVER_SET_7f3a")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_env_provider_reads_value() {
        let var = "BINDSHIP_TEST_TOKEN_PRESENT_91c2";
        std::env::set_var(var, "token-value");
        let cred = EnvCredentialProvider::new(var).resolve().unwrap();
        assert_eq!(cred.expose_secret(), "token-value");
        std::env::remove_var(var);
    }

    #[test]
    fn test_env_provider_blank_value_is_missing() {
        let var = "BINDSHIP_TEST_TOKEN_BLANK_04be";
        std::env::set_var(var, "   ");
        let result = EnvCredentialProvider::new(var).resolve();
        assert!(matches!(result, Err(ReleaseError::CredentialMissing { .. })));
        std::env::remove_var(var);
    }

    #[test]
    fn test_static_provider_missing() {
        let provider = StaticCredentialProvider::missing("TOKEN");
        assert!(provider.resolve().is_err());
        assert_eq!(provider.name(), "TOKEN");
    }
}
