//! Git invocations as data
//!
//! Every git call the engine makes is described by a [`GitCommand`] before
//! anything is spawned. This keeps argument construction testable and lets a
//! fake transport script responses per [`Operation`].

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::mirror::{RepositoryRef, SyncMode, SyncOptions};

/// Operation tag carried by every git invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    Version,
    Clone,
    Fetch,
    VerifyRemote,
    ListRefs,
    ResolveUpstream,
    FastForward,
    Push,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Operation::Version => "version",
            Operation::Clone => "clone",
            Operation::Fetch => "fetch",
            Operation::VerifyRemote => "verify-remote",
            Operation::ListRefs => "list-refs",
            Operation::ResolveUpstream => "resolve-upstream",
            Operation::FastForward => "fast-forward",
            Operation::Push => "push",
        };
        f.write_str(label)
    }
}

/// HTTP credential resolved by the configuration layer.
///
/// Passed to git as an `http.extraHeader` through the environment so the
/// token is never written into the mirror's config.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub token: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, token: impl Into<String>) -> Self {
        Self { username: username.into(), token: token.into() }
    }

    pub fn header(&self) -> String {
        let encoded = STANDARD.encode(format!("{}:{}", self.username, self.token));
        format!("Authorization: Basic {encoded}")
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("token", &"***")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct GitCommand {
    pub operation: Operation,
    /// Repository the command runs against, passed as `--git-dir`
    pub git_dir: Option<PathBuf>,
    /// Checkout directory, passed as `--work-tree`
    pub work_tree: Option<PathBuf>,
    pub args: Vec<OsString>,
    pub credential: Option<Credential>,
}

impl GitCommand {
    fn new(operation: Operation) -> Self {
        Self { operation, git_dir: None, work_tree: None, args: Vec::new(), credential: None }
    }

    fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    fn in_repo(mut self, git_dir: &Path) -> Self {
        self.git_dir = Some(git_dir.to_path_buf());
        self
    }

    pub fn version() -> Self {
        Self::new(Operation::Version).arg("--version")
    }

    /// Clone `source` into `dest`, which must not exist yet.
    pub fn clone_into(source: &RepositoryRef, dest: &Path, options: &SyncOptions) -> Self {
        let mut command = Self::new(Operation::Clone).arg("clone").arg("--quiet");
        match options.mode {
            SyncMode::Mirror => command = command.arg("--mirror"),
            SyncMode::WorkingCopy => {
                if let Some(reference) = source.reference() {
                    command = command.arg("--branch").arg(reference);
                }
                if let Some(depth) = options.depth {
                    command = command.arg("--depth").arg(depth.to_string()).arg("--no-single-branch");
                }
            }
        }
        command.credential = source.credential().cloned();
        command.arg("--").arg(source.location()).arg(dest.as_os_str())
    }

    /// Fetch from `origin` into an existing repository.
    pub fn fetch(git_dir: &Path, source: &RepositoryRef, options: &SyncOptions) -> Self {
        let mut command = Self::new(Operation::Fetch).in_repo(git_dir).arg("fetch").arg("--quiet").arg("--prune");
        if options.mode == SyncMode::WorkingCopy {
            command = command.arg("--tags");
            if let Some(depth) = options.depth {
                command = command.arg("--depth").arg(depth.to_string());
            }
        }
        command.credential = source.credential().cloned();
        command.arg("origin")
    }

    pub fn remote_url(git_dir: &Path) -> Self {
        Self::new(Operation::VerifyRemote)
            .in_repo(git_dir)
            .arg("config")
            .arg("--get")
            .arg("remote.origin.url")
    }

    pub fn list_refs(git_dir: &Path) -> Self {
        Self::new(Operation::ListRefs)
            .in_repo(git_dir)
            .arg("for-each-ref")
            .arg("--format=%(objectname) %(refname)")
    }

    pub fn resolve_upstream(git_dir: &Path) -> Self {
        Self::new(Operation::ResolveUpstream)
            .in_repo(git_dir)
            .arg("rev-parse")
            .arg("--symbolic-full-name")
            .arg("@{upstream}")
    }

    /// Move the checked-out branch to its upstream; refuses to create merges.
    pub fn fast_forward(git_dir: &Path, work_tree: &Path) -> Self {
        let mut command = Self::new(Operation::FastForward)
            .in_repo(git_dir)
            .arg("merge")
            .arg("--ff-only")
            .arg("--quiet")
            .arg("@{upstream}");
        command.work_tree = Some(work_tree.to_path_buf());
        command
    }

    /// Publish branches and tags to a destination remote.
    ///
    /// Only `refs/heads` and `refs/tags` are pushed. Hosting-specific refs a
    /// mirror also carries (`refs/merge-requests/*`, `refs/pull/*`) are
    /// read-only on hosted destinations and would fail the whole push.
    /// Working copies publish their remote-tracking branches as branches.
    pub fn push(git_dir: &Path, destination: &str, credential: Option<&Credential>, mode: SyncMode) -> Self {
        let command = Self::new(Operation::Push)
            .in_repo(git_dir)
            .arg("push")
            .arg("--quiet")
            .arg("--prune")
            .arg(destination);
        let mut command = match mode {
            SyncMode::Mirror => command.arg("+refs/heads/*:refs/heads/*"),
            SyncMode::WorkingCopy => command
                .arg("+refs/remotes/origin/*:refs/heads/*")
                .arg("^refs/remotes/origin/HEAD"),
        }
        .arg("+refs/tags/*:refs/tags/*");
        command.credential = credential.cloned();
        command
    }

    /// Arguments as passed to the git binary, repository flags first.
    pub fn argv(&self) -> Vec<OsString> {
        let mut argv = Vec::with_capacity(self.args.len() + 2);
        if let Some(git_dir) = &self.git_dir {
            let mut flag = OsString::from("--git-dir=");
            flag.push(git_dir.as_os_str());
            argv.push(flag);
        }
        if let Some(work_tree) = &self.work_tree {
            let mut flag = OsString::from("--work-tree=");
            flag.push(work_tree.as_os_str());
            argv.push(flag);
        }
        argv.extend(self.args.iter().cloned());
        argv
    }

    /// Secrets that must never appear in logs or error messages
    pub fn secrets(&self) -> Vec<&str> {
        self.credential.iter().map(|credential| credential.token.as_str()).collect()
    }

    /// Redacted one-line rendering for logs
    pub fn display(&self) -> String {
        let rendered = self
            .argv()
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ");
        crate::shared::location::redact(&format!("git {rendered}"), &self.secrets())
    }
}
