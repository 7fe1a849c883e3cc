//! Throw-away git repositories for integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(["-c", "user.name=test-user", "-c", "user.email=test@example.com"])
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

pub fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// A bare "remote" on branch `main` holding a package with a previous artifact.
pub struct Remote {
    pub root: tempfile::TempDir,
    pub bare: PathBuf,
}

impl Remote {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let seed = root.path().join("seed");
        fs::create_dir(&seed).unwrap();
        git(&seed, &["init"]);
        git(&seed, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        write(&seed, "Package.swift", "// package manifest");
        write(&seed, "Sources/Bindings/old.swift", "// previous bindings");
        git(&seed, &["add", "-A"]);
        git(&seed, &["commit", "-m", "initial"]);

        let bare = root.path().join("remote.git");
        git(
            root.path(),
            &["clone", "--bare", seed.to_str().unwrap(), bare.to_str().unwrap()],
        );
        Self { root, bare }
    }

    pub fn url(&self) -> String {
        self.bare.to_string_lossy().into_owned()
    }

    pub fn main_sha(&self) -> String {
        git(&self.bare, &["rev-parse", "refs/heads/main"])
    }

    pub fn tag_sha(&self, tag: &str) -> Option<String> {
        let output = Command::new("git")
            .args(["rev-parse", "-q", "--verify", &format!("refs/tags/{tag}^{{commit}}")])
            .current_dir(&self.bare)
            .output()
            .unwrap();
        output
            .status
            .success()
            .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    pub fn files_at_main(&self) -> Vec<String> {
        git(&self.bare, &["ls-tree", "-r", "--name-only", "main"])
            .lines()
            .map(|l| l.to_string())
            .collect()
    }

    pub fn add_tag(&self, tag: &str) {
        git(&self.bare, &["tag", tag, "main"]);
    }

    /// Reject every push until [`Remote::accept_pushes`] is called.
    #[cfg(unix)]
    pub fn reject_pushes(&self) {
        self.install_pre_receive("#!/bin/sh\necho 'remote rejected by policy' >&2\nexit 1\n");
    }

    /// Reject any push that updates a tag; branch-only pushes still land.
    #[cfg(unix)]
    pub fn reject_tag_pushes(&self) {
        self.install_pre_receive(
            "#!/bin/sh\n\
             while read old new ref; do\n\
             case \"$ref\" in refs/tags/*) echo 'tags are frozen' >&2; exit 1;; esac\n\
             done\n\
             exit 0\n",
        );
    }

    #[cfg(unix)]
    fn install_pre_receive(&self, script: &str) {
        use std::os::unix::fs::PermissionsExt;
        let hook = self.bare.join("hooks/pre-receive");
        fs::create_dir_all(hook.parent().unwrap()).unwrap();
        fs::write(&hook, script).unwrap();
        fs::set_permissions(&hook, fs::Permissions::from_mode(0o755)).unwrap();
    }

    pub fn accept_pushes(&self) {
        let _ = fs::remove_file(self.bare.join("hooks/pre-receive"));
    }
}
