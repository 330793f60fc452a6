//! Mirror state engine and the task model it operates on
//!
//! A [`SyncTask`] pairs one source ([`RepositoryRef`]) with one target
//! ([`TargetRef`]). The [`MirrorEngine`] brings the target in line with the
//! source and reports a [`SyncOutcome`]:
//!
//! ```text
//! NotStarted -> Probing -> Cloning  -> Succeeded(Created)
//!                       -> Fetching -> Succeeded(Updated | UpToDate)
//!            (any non-terminal state) -> Failed
//! ```
//!
//! Targets are never repointed: a path that holds anything other than a
//! mirror of the same source is reported as a mismatch and left untouched.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::SyncError;
use crate::git::Credential;
use crate::shared::location;

pub mod engine;
pub mod outcome;
pub mod retry;
pub mod state;

pub use engine::{MirrorEngine, Probe, TargetStatus};
pub use outcome::{Failure, SyncOutcome, TaskReport};
pub use retry::RetryPolicy;
pub use state::TaskState;

/// What a target holds once synchronized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// Bare `git clone --mirror`: every ref, no working tree
    #[default]
    Mirror,
    /// Regular clone with a checked-out branch, fast-forwarded on update
    WorkingCopy,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncMode::Mirror => "mirror",
            SyncMode::WorkingCopy => "working-copy",
        })
    }
}

/// Source repository: URL or local path, optional ref and credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryRef {
    location: String,
    reference: Option<String>,
    credential: Option<Credential>,
}

impl RepositoryRef {
    pub fn new(location: impl Into<String>) -> Self {
        Self { location: location.into().trim().to_string(), reference: None, credential: None }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    /// Normalized identity compared against a target's recorded origin
    pub fn identity(&self) -> String {
        location::source_identity(&self.location)
    }

    /// Location with credentials scrubbed, safe for logs
    pub fn display(&self) -> String {
        let secrets: Vec<&str> = self.credential.iter().map(|c| c.token.as_str()).collect();
        location::redact(&self.location, &secrets)
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        let location = self.location.as_str();
        if location.is_empty() {
            return Err(SyncError::Configuration("source location is empty".to_string()));
        }
        if location.starts_with('-') {
            return Err(SyncError::Configuration(format!("source location '{}' looks like an option", self.display())));
        }
        if location.chars().any(char::is_control) {
            return Err(SyncError::Configuration("source location contains control characters".to_string()));
        }
        if location::is_remote(location) {
            if location.chars().any(char::is_whitespace) {
                return Err(SyncError::Configuration(format!("source URL '{}' contains whitespace", self.display())));
            }
            if let Some((_, rest)) = location.split_once("://") {
                let host = rest.split('/').next().unwrap_or("");
                if host.rsplit('@').next().unwrap_or("").is_empty() {
                    return Err(SyncError::Configuration(format!("source URL '{}' has no host", self.display())));
                }
            }
        }
        if let Some(reference) = &self.reference {
            validate_reference(reference)?;
        }
        Ok(())
    }
}

/// Subset of git's ref-name rules that matters for `--branch` arguments.
pub fn validate_reference(reference: &str) -> Result<(), SyncError> {
    let invalid = |why: &str| Err(SyncError::Configuration(format!("malformed ref '{reference}': {why}")));

    if reference.is_empty() {
        return invalid("empty");
    }
    if reference.starts_with('-') || reference.starts_with('/') {
        return invalid("must not start with '-' or '/'");
    }
    if reference.ends_with('/') || reference.ends_with('.') || reference.ends_with(".lock") {
        return invalid("must not end with '/', '.' or '.lock'");
    }
    if reference.contains("..") || reference.contains("@{") || reference.contains("//") {
        return invalid("must not contain '..', '@{' or '//'");
    }
    if reference.chars().any(|c| c.is_control() || c.is_whitespace() || "~^:?*[\\".contains(c)) {
        return invalid("contains a forbidden character");
    }
    if reference.split('/').any(|part| part.starts_with('.')) {
        return invalid("components must not start with '.'");
    }
    Ok(())
}

/// Remote that receives the mirrored refs after a successful sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushDestination {
    pub url: String,
    pub credential: Option<Credential>,
}

/// Destination of a sync: a local mirror path, optionally republished
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRef {
    path: PathBuf,
    push: Option<PushDestination>,
}

impl TargetRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), push: None }
    }

    pub fn with_push(mut self, push: PushDestination) -> Self {
        self.push = Some(push);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn push(&self) -> Option<&PushDestination> {
        self.push.as_ref()
    }

    /// Path used to detect two tasks writing the same place on disk.
    ///
    /// The path is made absolute and lexically normalized, then its longest
    /// existing ancestor is canonicalized so symlinked spellings of one
    /// directory produce the same key.
    pub fn key(&self) -> PathBuf {
        let absolute = std::path::absolute(&self.path).unwrap_or_else(|_| self.path.clone());
        let mut normalized = PathBuf::new();
        for component in absolute.components() {
            match component {
                std::path::Component::CurDir => {}
                std::path::Component::ParentDir => {
                    normalized.pop();
                }
                other => normalized.push(other),
            }
        }

        let mut missing = Vec::new();
        let mut existing = normalized.as_path();
        loop {
            if let Ok(mut canonical) = std::fs::canonicalize(existing) {
                canonical.extend(missing.iter().rev());
                return canonical;
            }
            match (existing.parent(), existing.file_name()) {
                (Some(parent), Some(name)) => {
                    missing.push(name);
                    existing = parent;
                }
                _ => break,
            }
        }
        normalized
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    pub mode: SyncMode,
    /// Shallow history depth, working-copy mode only
    pub depth: Option<u32>,
    /// Per git operation
    pub timeout: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self { mode: SyncMode::Mirror, depth: None, timeout: Duration::from_secs(600) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTask {
    pub name: String,
    pub source: RepositoryRef,
    pub target: TargetRef,
    pub options: SyncOptions,
}

impl SyncTask {
    pub fn new(name: impl Into<String>, source: RepositoryRef, target: TargetRef, options: SyncOptions) -> Self {
        Self { name: name.into(), source, target, options }
    }

    /// Per-task checks; a failure here fails only this task.
    pub fn validate(&self) -> Result<(), SyncError> {
        self.source.validate()?;
        if self.options.timeout.is_zero() {
            return Err(SyncError::Configuration("timeout must be positive".to_string()));
        }
        if self.options.depth == Some(0) {
            return Err(SyncError::Configuration("depth must be at least 1".to_string()));
        }
        if self.options.mode == SyncMode::Mirror {
            if self.source.reference().is_some() {
                return Err(SyncError::Configuration(
                    "ref selection requires working-copy mode; mirror mode copies every ref".to_string(),
                ));
            }
            if self.options.depth.is_some() {
                return Err(SyncError::Configuration("depth is only supported in working-copy mode".to_string()));
            }
        }
        if self.target.path().as_os_str().is_empty() {
            return Err(SyncError::Configuration("target path is empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(source: RepositoryRef, options: SyncOptions) -> SyncTask {
        SyncTask::new("t", source, TargetRef::new("/tmp/m/t.git"), options)
    }

    #[test]
    fn test_repository_ref_validation() {
        assert!(RepositoryRef::new("https://example.com/a.git").validate().is_ok());
        assert!(RepositoryRef::new("/srv/git/a").validate().is_ok());
        assert!(RepositoryRef::new("   ").validate().is_err());
        assert!(RepositoryRef::new("--upload-pack=evil").validate().is_err());
        assert!(RepositoryRef::new("https:///nohost.git").validate().is_err());
        assert!(RepositoryRef::new("https://example.com/a b.git").validate().is_err());
    }

    #[test]
    fn test_reference_rules() {
        for good in ["main", "release/1.x", "v1.2.3", "feature/foo-bar"] {
            assert!(validate_reference(good).is_ok(), "{good}");
        }
        for bad in ["", "-x", "a..b", "a b", "x.lock", "a/", "a:b", "a/.hidden", "x@{1}", "~1"] {
            assert!(validate_reference(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn test_mirror_mode_rejects_ref_and_depth() {
        let with_ref = task(RepositoryRef::new("https://example.com/a.git").with_reference("main"), SyncOptions::default());
        assert!(matches!(with_ref.validate(), Err(SyncError::Configuration(_))));

        let shallow = task(
            RepositoryRef::new("https://example.com/a.git"),
            SyncOptions { depth: Some(1), ..SyncOptions::default() },
        );
        assert!(shallow.validate().is_err());

        let working = task(
            RepositoryRef::new("https://example.com/a.git").with_reference("main"),
            SyncOptions { mode: SyncMode::WorkingCopy, depth: Some(1), ..SyncOptions::default() },
        );
        assert!(working.validate().is_ok());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let task = task(
            RepositoryRef::new("https://example.com/a.git"),
            SyncOptions { timeout: Duration::ZERO, ..SyncOptions::default() },
        );
        assert!(task.validate().is_err());
    }

    #[test]
    fn test_target_key_normalizes() {
        assert_eq!(TargetRef::new("/m/./a/../b.git").key(), PathBuf::from("/m/b.git"));
        assert_eq!(TargetRef::new("/m/b.git").key(), TargetRef::new("/m/b.git/").key());
    }

    #[cfg(unix)]
    #[test]
    fn test_target_key_resolves_symlinked_ancestors() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("real");
        std::fs::create_dir(&real).unwrap();
        std::os::unix::fs::symlink(&real, dir.path().join("link")).unwrap();

        let direct = TargetRef::new(real.join("group/app.git")).key();
        let via_link = TargetRef::new(dir.path().join("link/group/app.git")).key();
        assert_eq!(direct, via_link);
        assert!(direct.ends_with("real/group/app.git"));
    }

    #[test]
    fn test_display_redacts_credentials() {
        let source = RepositoryRef::new("https://user:pw@example.com/a.git");
        assert!(!source.display().contains("pw"));
    }
}
