//! Configuration for mirrorsync
//!
//! Configuration is layered with figment (see [`MirrorConfig::load`]) and
//! extracted into the typed sections below. Nothing reads configuration
//! after startup: the CLI turns a [`MirrorConfig`] into [`SyncTask`]s,
//! [`RunOptions`] and a [`RetryPolicy`] and hands those to the core.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::discovery::Project;
use crate::error::SyncError;
use crate::git::Credential;
use crate::mirror::{PushDestination, RepositoryRef, RetryPolicy, SyncMode, SyncOptions, SyncTask, TargetRef};
use crate::shared::location;
use crate::sync::RunOptions;

pub mod core;
pub mod smart_load;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    pub sync: SyncSection,
    pub retry: RetrySection,
    pub git: GitSection,
    pub repos: Vec<RepoConfig>,
    pub groups: Vec<GroupConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSection {
    pub target_root: PathBuf,
    pub mode: SyncMode,
    pub concurrency: usize,
    pub thread_percentage: u8,
    pub timeout_secs: u64,
    pub fail_fast: bool,
    pub max_failures: usize,
    /// Username sent with tokens read from `token_env`
    pub token_user: String,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            target_root: PathBuf::from("mirrors"),
            mode: SyncMode::Mirror,
            concurrency: 4,
            thread_percentage: 75,
            timeout_secs: 600,
            fail_fast: false,
            max_failures: 0,
            token_user: "oauth2".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: u32,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self { max_attempts: 3, initial_backoff_ms: 500, max_backoff_ms: 30_000, multiplier: 2 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitSection {
    /// Name or path of the git executable
    pub binary: String,
}

impl Default for GitSection {
    fn default() -> Self {
        Self { binary: "git".to_string() }
    }
}

/// One `[[repos]]` entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoConfig {
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<PathBuf>,
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<SyncMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Environment variable holding the source access token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_token_env: Option<String>,
}

impl RepoConfig {
    pub fn from_source(source: impl Into<String>) -> Self {
        Self { source: source.into(), ..Self::default() }
    }

    /// Configured name, or the source's namespace path
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| location::display_name(&self.source))
    }
}

/// One `[[groups]]` entry: every project of a GitLab group, subgroups included
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupConfig {
    /// Base URL of the GitLab instance, e.g. `https://gitlab.example.com`
    pub api_url: String,
    /// Numeric id or full path of the group
    pub group: String,
    /// Token for the API and for cloning
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<SyncMode>,
    /// Destination host; each project is pushed to `<push_base_url>/<path>.git`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_token_env: Option<String>,
    /// Project paths (`group/sub/project`) to leave out
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skip: Vec<String>,
    #[serde(default)]
    pub include_archived: bool,
}

impl GroupConfig {
    /// Whether a discovered project becomes a repository
    pub fn selects(&self, project: &Project) -> bool {
        (self.include_archived || !project.archived) && !self.skip.iter().any(|path| path == &project.path_with_namespace)
    }

    /// Repository entry for one discovered project, named by its full path
    pub fn repo_for(&self, project: &Project) -> RepoConfig {
        let push_url = self
            .push_base_url
            .as_deref()
            .map(|base| format!("{}/{}.git", base.trim_end_matches('/'), project.path_with_namespace));
        RepoConfig {
            source: project.http_url_to_repo.clone(),
            name: Some(project.path_with_namespace.clone()),
            mode: self.mode,
            token_env: self.token_env.clone(),
            token_user: self.token_user.clone(),
            push_token_env: push_url.as_ref().and(self.push_token_env.clone()),
            push_url,
            ..RepoConfig::default()
        }
    }
}

/// `--only` / `--skip` selection by repository name
#[derive(Debug, Clone, Default)]
pub struct RepoFilter {
    pub only: Vec<String>,
    pub skip: Vec<String>,
}

impl RepoFilter {
    pub fn accepts(&self, name: &str) -> bool {
        (self.only.is_empty() || self.only.iter().any(|n| n == name)) && !self.skip.iter().any(|n| n == name)
    }
}

/// Values set on the command line, merged as the highest-priority layer.
/// Unset fields are skipped so they never mask lower layers.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "SyncOverrides::is_empty")]
    pub sync: SyncOverrides,
    #[serde(skip_serializing_if = "RetryOverrides::is_empty")]
    pub retry: RetryOverrides,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_root: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<SyncMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fail_fast: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_failures: Option<usize>,
}

impl SyncOverrides {
    fn is_empty(&self) -> bool {
        self.target_root.is_none()
            && self.mode.is_none()
            && self.concurrency.is_none()
            && self.timeout_secs.is_none()
            && self.fail_fast.is_none()
            && self.max_failures.is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RetryOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
}

impl RetryOverrides {
    fn is_empty(&self) -> bool {
        self.max_attempts.is_none()
    }
}

fn invalid(message: impl Into<String>) -> anyhow::Error {
    SyncError::Configuration(message.into()).into()
}

impl MirrorConfig {
    /// Whole-configuration checks. Per-repository problems that only affect
    /// one task (a malformed ref, say) are left to task validation.
    pub fn validate(&self) -> Result<()> {
        if self.sync.timeout_secs == 0 {
            return Err(invalid("sync.timeout_secs must be greater than 0"));
        }
        if !(1..=100).contains(&self.sync.thread_percentage) {
            return Err(invalid("sync.thread_percentage must be between 1 and 100"));
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts must be at least 1"));
        }
        if self.retry.multiplier == 0 {
            return Err(invalid("retry.multiplier must be at least 1"));
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(invalid("retry.initial_backoff_ms must not exceed retry.max_backoff_ms"));
        }
        if self.git.binary.trim().is_empty() {
            return Err(invalid("git.binary must not be empty"));
        }

        for (index, group) in self.groups.iter().enumerate() {
            if group.api_url.trim().is_empty() || group.group.trim().is_empty() {
                return Err(invalid(format!("groups[{index}] needs both api_url and group")));
            }
        }

        let mut names = HashSet::new();
        for (index, repo) in self.repos.iter().enumerate() {
            if repo.source.trim().is_empty() {
                return Err(invalid(format!("repos[{index}] has no source")));
            }
            let name = repo.display_name();
            if !names.insert(name.clone()) {
                return Err(invalid(format!("duplicate repository name '{name}'; set an explicit name")));
            }
            if repo.timeout_secs == Some(0) {
                return Err(invalid(format!("{name}: timeout_secs must be greater than 0")));
            }
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            initial_backoff: Duration::from_millis(self.retry.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.retry.max_backoff_ms),
            multiplier: self.retry.multiplier,
        }
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            concurrency: self.sync.concurrency,
            thread_percentage: self.sync.thread_percentage,
            fail_fast: self.sync.fail_fast,
            max_failures: self.sync.max_failures,
        }
    }

    /// Resolve the selected repositories into tasks, in configuration order.
    ///
    /// Tokens are read from the environment here; a named variable that is
    /// unset or empty is a configuration error.
    pub fn tasks(&self, filter: &RepoFilter) -> Result<Vec<SyncTask>> {
        for wanted in &filter.only {
            if !self.repos.iter().any(|repo| &repo.display_name() == wanted) {
                return Err(invalid(format!("--only '{wanted}' does not match any configured repository")));
            }
        }

        self.repos
            .iter()
            .filter(|repo| filter.accepts(&repo.display_name()))
            .map(|repo| self.task_for(repo))
            .collect()
    }

    fn task_for(&self, repo: &RepoConfig) -> Result<SyncTask> {
        let mode = repo.mode.unwrap_or(self.sync.mode);
        let token_user = repo.token_user.as_deref().unwrap_or(&self.sync.token_user);

        let mut source = RepositoryRef::new(&repo.source);
        if let Some(reference) = &repo.reference {
            source = source.with_reference(reference);
        }
        if let Some(credential) = read_credential(repo.token_env.as_deref(), token_user)? {
            source = source.with_credential(credential);
        }

        let path = match &repo.target {
            Some(target) if target.is_absolute() => target.clone(),
            Some(target) => self.sync.target_root.join(target),
            None => self
                .sync
                .target_root
                .join(location::namespace_path(&repo.source, mode == SyncMode::Mirror)),
        };
        let mut target = TargetRef::new(path);
        if let Some(url) = &repo.push_url {
            let credential = read_credential(repo.push_token_env.as_deref(), token_user)?;
            target = target.with_push(PushDestination { url: url.clone(), credential });
        }

        let options = SyncOptions {
            mode,
            depth: repo.depth,
            timeout: Duration::from_secs(repo.timeout_secs.unwrap_or(self.sync.timeout_secs)),
        };
        Ok(SyncTask::new(repo.display_name(), source, target, options))
    }
}

fn read_credential(token_env: Option<&str>, username: &str) -> Result<Option<Credential>> {
    let Some(var) = token_env else {
        return Ok(None);
    };
    Ok(Some(Credential::new(username, read_token(var)?)))
}

/// Token stored in environment variable `var`; unset or blank is a configuration error.
pub(crate) fn read_token(var: &str) -> Result<String> {
    match std::env::var(var) {
        Ok(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
        _ => Err(invalid(format!("environment variable {var} (token_env) is not set"))),
    }
}
