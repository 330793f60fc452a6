//! Shared fixtures: throwaway git repositories built with the real git binary
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

pub fn git_available() -> bool {
    which::which("git").is_ok()
}

/// Run git in `dir` with a fixed identity, panicking on failure.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_NAME", "Test User")
        .env("GIT_AUTHOR_EMAIL", "test@example.com")
        .env("GIT_COMMITTER_NAME", "Test User")
        .env("GIT_COMMITTER_EMAIL", "test@example.com")
        .env_remove("GIT_DIR")
        .env_remove("GIT_WORK_TREE")
        .output()
        .expect("git runs");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Branch and tag tips of a repository, one `<sha> <ref>` per line
pub fn tips(git_dir: &Path) -> String {
    git(
        git_dir,
        &["for-each-ref", "--format=%(objectname) %(refname)", "refs/heads", "refs/tags"],
    )
}

/// Temporary directory holding a source repository and room for targets
pub struct SyncScenario {
    pub temp_dir: TempDir,
    pub source_repo: PathBuf,
    commits: usize,
}

impl SyncScenario {
    /// Source repository on branch `main` with one commit and one tag
    pub fn new() -> Self {
        Self::with_source_name("source")
    }

    pub fn with_source_name(name: &str) -> Self {
        let temp_dir = TempDir::new().expect("temp dir");
        let source_repo = temp_dir.path().join(name);
        fs::create_dir_all(&source_repo).expect("source dir");
        git(&source_repo, &["init", "--quiet"]);
        git(&source_repo, &["symbolic-ref", "HEAD", "refs/heads/main"]);

        let mut scenario = Self { temp_dir, source_repo, commits: 0 };
        scenario.commit();
        git(&scenario.source_repo, &["tag", "v1.0.0"]);
        scenario
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.temp_dir.path().join(relative)
    }

    pub fn source_url(&self) -> String {
        self.source_repo.display().to_string()
    }

    /// Add one commit to `main` in the source
    pub fn commit(&mut self) {
        self.commits += 1;
        let file = self.source_repo.join("CHANGELOG.md");
        let mut content = fs::read_to_string(&file).unwrap_or_default();
        content.push_str(&format!("- change {}\n", self.commits));
        fs::write(&file, content).expect("write file");
        git(&self.source_repo, &["add", "CHANGELOG.md"]);
        git(&self.source_repo, &["commit", "--quiet", "-m", &format!("change {}", self.commits)]);
    }

    pub fn source_tips(&self) -> String {
        tips(&self.source_repo)
    }

    /// Second, unrelated repository next to the source
    pub fn other_repo(&self, name: &str) -> PathBuf {
        let other = self.path(name);
        fs::create_dir_all(&other).expect("other dir");
        git(&other, &["init", "--quiet"]);
        fs::write(other.join("README.md"), "other\n").expect("write file");
        git(&other, &["add", "README.md"]);
        git(&other, &["commit", "--quiet", "-m", "other"]);
        other
    }
}
