use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use uuid::Uuid;

use super::outcome::{Failure, SyncOutcome, TaskReport};
use super::retry::RetryPolicy;
use super::state::{StateTracker, TaskState};
use super::{SyncMode, SyncTask};
use crate::error::SyncError;
use crate::git::{GitCommand, Operation, RefTips, Transport};
use crate::shared::CancelToken;
use crate::shared::location::{redact, source_identity};

/// What currently occupies a target path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// Nothing there, or an empty directory
    Absent,
    Repository { git_dir: PathBuf, bare: bool },
    /// Something we must not touch
    Foreign(String),
}

/// Read-only view of a target, used by `status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum TargetStatus {
    Absent,
    Mirrors { origin: String, refs: usize },
    Mismatch { origin: String },
    Foreign { found: String },
}

/// Brings one target in line with one source.
pub struct MirrorEngine<T: Transport> {
    transport: T,
    retry: RetryPolicy,
}

impl<T: Transport> MirrorEngine<T> {
    pub fn new(transport: T, retry: RetryPolicy) -> Self {
        Self { transport, retry }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Synchronize one task. Every failure is folded into the returned
    /// report; this never panics on bad input or a broken target.
    pub fn sync(&self, task: &SyncTask, cancel: &CancelToken) -> TaskReport {
        let started = Instant::now();
        let mut run = TaskRun {
            engine: self,
            task,
            cancel,
            tracker: StateTracker::new(&task.name),
            retries: 0,
            changed_refs: 0,
        };

        let outcome = match run.execute() {
            Ok(outcome) => {
                run.tracker.advance(TaskState::Succeeded);
                outcome
            }
            Err(error) => {
                run.tracker.advance(TaskState::Failed);
                SyncOutcome::Failed(Failure::from(error))
            }
        };

        match &outcome {
            SyncOutcome::Failed(failure) => tracing::error!("{}: {}", task.name, failure),
            other => tracing::info!(
                "{}: {} ({} refs changed, {} retries)",
                task.name,
                other,
                run.changed_refs,
                run.retries
            ),
        }

        TaskReport {
            name: task.name.clone(),
            target: task.target.path().to_path_buf(),
            outcome,
            retries: run.retries,
            changed_refs: run.changed_refs,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// Inspect a target without touching the network or the disk.
    pub fn inspect(&self, task: &SyncTask, cancel: &CancelToken) -> Result<TargetStatus, SyncError> {
        match probe(task.target.path())? {
            Probe::Absent => Ok(TargetStatus::Absent),
            Probe::Foreign(found) => Ok(TargetStatus::Foreign { found }),
            Probe::Repository { git_dir, .. } => {
                let origin = self.recorded_origin(&git_dir, task, cancel)?;
                let display = redact(origin.as_deref().unwrap_or("(no origin)"), &[]);
                if origin.as_deref().map(source_identity) != Some(task.source.identity()) {
                    return Ok(TargetStatus::Mismatch { origin: display });
                }
                let output = self.transport.execute(&GitCommand::list_refs(&git_dir), task.options.timeout, cancel)?;
                Ok(TargetStatus::Mirrors { origin: display, refs: RefTips::parse(&output.stdout).len() })
            }
        }
    }

    /// `remote.origin.url` of an existing repository, `None` when unset.
    fn recorded_origin(&self, git_dir: &Path, task: &SyncTask, cancel: &CancelToken) -> Result<Option<String>, SyncError> {
        match self.transport.execute(&GitCommand::remote_url(git_dir), task.options.timeout, cancel) {
            Ok(output) => Ok(Some(output.stdout.trim().to_string()).filter(|url| !url.is_empty())),
            // `git config --get` exits 1 when the key is missing
            Err(SyncError::Transport { code: Some(1), .. }) => Ok(None),
            Err(error) => Err(error),
        }
    }
}

/// Classify what sits at `path` using the filesystem only.
///
/// Repository detection never asks git, so a target nested inside some
/// other checkout can't be mistaken for that checkout.
pub fn probe(path: &Path) -> Result<Probe, SyncError> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Probe::Absent),
        Err(e) => {
            return Err(SyncError::Configuration(format!("cannot inspect target {}: {e}", path.display())));
        }
    };
    if !metadata.is_dir() {
        return Ok(Probe::Foreign("a file".to_string()));
    }

    let mut entries = fs::read_dir(path)
        .map_err(|e| SyncError::Configuration(format!("cannot read target {}: {e}", path.display())))?;
    if entries.next().is_none() {
        return Ok(Probe::Absent);
    }

    let dot_git = path.join(".git");
    if looks_like_git_dir(&dot_git) {
        return Ok(Probe::Repository { git_dir: dot_git, bare: false });
    }
    if looks_like_git_dir(path) {
        return Ok(Probe::Repository { git_dir: path.to_path_buf(), bare: true });
    }
    Ok(Probe::Foreign("a non-empty directory that is not a git repository".to_string()))
}

fn looks_like_git_dir(path: &Path) -> bool {
    path.join("HEAD").is_file() && path.join("objects").is_dir() && path.join("refs").is_dir()
}

/// State for one `sync` call
struct TaskRun<'a, T: Transport> {
    engine: &'a MirrorEngine<T>,
    task: &'a SyncTask,
    cancel: &'a CancelToken,
    tracker: StateTracker<'a>,
    retries: u32,
    changed_refs: usize,
}

impl<T: Transport> TaskRun<'_, T> {
    fn execute(&mut self) -> Result<SyncOutcome, SyncError> {
        self.task.validate()?;
        if self.cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        self.tracker.advance(TaskState::Probing);
        let target = self.task.target.path();
        let outcome = match probe(target)? {
            Probe::Absent => self.clone_fresh()?,
            Probe::Foreign(what) => {
                return Err(SyncError::Mismatch {
                    target: target.to_path_buf(),
                    expected: self.task.source.display(),
                    found: what,
                });
            }
            Probe::Repository { git_dir, bare } => {
                self.verify_origin(&git_dir)?;
                let wants_bare = self.task.options.mode == SyncMode::Mirror;
                if bare != wants_bare {
                    return Err(SyncError::Configuration(format!(
                        "target {} is a {} but the task is configured for {} mode",
                        target.display(),
                        if bare { "bare mirror" } else { "working copy" },
                        self.task.options.mode
                    )));
                }
                self.fetch_existing(&git_dir)?
            }
        };

        let git_dir = self.git_dir();
        self.push(&git_dir)?;
        Ok(outcome)
    }

    fn git_dir(&self) -> PathBuf {
        let target = self.task.target.path();
        match self.task.options.mode {
            SyncMode::Mirror => target.to_path_buf(),
            SyncMode::WorkingCopy => target.join(".git"),
        }
    }

    fn run_git(&self, command: &GitCommand) -> Result<crate::git::CommandOutput, SyncError> {
        self.engine.transport.execute(command, self.task.options.timeout, self.cancel)
    }

    fn with_retry<R>(
        &mut self,
        operation: Operation,
        mut op: impl FnMut(&Self) -> Result<R, SyncError>,
    ) -> Result<R, SyncError> {
        let what = format!("{} {}", self.task.name, operation);
        let mut retries = 0;
        let result = {
            let this: &Self = self;
            this.engine.retry.run(&what, this.cancel, &mut retries, || op(this))
        };
        self.retries += retries;
        result
    }

    fn verify_origin(&self, git_dir: &Path) -> Result<(), SyncError> {
        let recorded = self.engine.recorded_origin(git_dir, self.task, self.cancel)?;
        let expected = self.task.source.identity();
        match recorded {
            Some(origin) if source_identity(&origin) == expected => Ok(()),
            other => Err(SyncError::Mismatch {
                target: self.task.target.path().to_path_buf(),
                expected: self.task.source.display(),
                found: redact(other.as_deref().unwrap_or("(no origin remote)"), &[]),
            }),
        }
    }

    fn clone_fresh(&mut self) -> Result<SyncOutcome, SyncError> {
        self.tracker.advance(TaskState::Cloning);
        let target = self.task.target.path().to_path_buf();
        let parent = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(|e| {
            SyncError::Configuration(format!("cannot create parent directory {}: {e}", parent.display()))
        })?;

        // Clone next to the target and move into place only once complete,
        // so an interrupted clone never looks like a valid mirror.
        let file_name = target.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let staging = parent.join(format!(".{file_name}.partial-{}", Uuid::new_v4().simple()));
        let command = GitCommand::clone_into(&self.task.source, &staging, &self.task.options);
        tracing::info!("{}: cloning {} into {}", self.task.name, self.task.source.display(), target.display());

        let cloned = self.with_retry(Operation::Clone, |run| {
            remove_partial(&staging);
            run.run_git(&command)
        });
        if let Err(error) = cloned {
            remove_partial(&staging);
            return Err(error);
        }

        if target.is_dir() {
            // probe saw an empty directory
            fs::remove_dir(&target).map_err(|e| {
                remove_partial(&staging);
                SyncError::Configuration(format!("cannot replace empty target {}: {e}", target.display()))
            })?;
        }
        fs::rename(&staging, &target).map_err(|e| {
            remove_partial(&staging);
            SyncError::Configuration(format!("cannot move clone into {}: {e}", target.display()))
        })?;

        let tips = RefTips::parse(&self.run_git(&GitCommand::list_refs(&self.git_dir()))?.stdout);
        self.changed_refs = tips.len();
        Ok(SyncOutcome::Created)
    }

    fn fetch_existing(&mut self, git_dir: &Path) -> Result<SyncOutcome, SyncError> {
        self.tracker.advance(TaskState::Fetching);
        let before = self.list_refs(git_dir)?;

        let fetch = GitCommand::fetch(git_dir, &self.task.source, &self.task.options);
        self.with_retry(Operation::Fetch, |run| run.run_git(&fetch))?;

        if self.task.options.mode == SyncMode::WorkingCopy {
            self.fast_forward(git_dir)?;
        }

        let after = self.list_refs(git_dir)?;
        self.changed_refs = before.changed_count(&after);
        Ok(if self.changed_refs == 0 { SyncOutcome::UpToDate } else { SyncOutcome::Updated })
    }

    fn list_refs(&self, git_dir: &Path) -> Result<RefTips, SyncError> {
        let output = self.run_git(&GitCommand::list_refs(git_dir))?;
        Ok(RefTips::parse(&output.stdout))
    }

    fn fast_forward(&mut self, git_dir: &Path) -> Result<(), SyncError> {
        match self.run_git(&GitCommand::resolve_upstream(git_dir)) {
            Ok(_) => {}
            Err(SyncError::Transport { .. }) => {
                tracing::debug!("{}: detached HEAD or no upstream, skipping fast-forward", self.task.name);
                return Ok(());
            }
            Err(error) => return Err(error),
        }
        let command = GitCommand::fast_forward(git_dir, self.task.target.path());
        self.with_retry(Operation::FastForward, |run| run.run_git(&command))?;
        Ok(())
    }

    fn push(&mut self, git_dir: &Path) -> Result<(), SyncError> {
        let Some(destination) = self.task.target.push() else {
            return Ok(());
        };
        let command = GitCommand::push(
            git_dir,
            &destination.url,
            destination.credential.as_ref(),
            self.task.options.mode,
        );
        tracing::info!("{}: pushing to {}", self.task.name, redact(&destination.url, &command.secrets()));
        self.with_retry(Operation::Push, |run| run.run_git(&command))?;
        Ok(())
    }
}

fn remove_partial(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_dir_all(path) {
            tracing::warn!("Failed to remove partial clone {}: {}", path.display(), e);
        }
    }
}
