use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

use crate::error::{ErrorKind, SyncError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub kind: ErrorKind,
    pub reason: String,
}

impl Failure {
    pub fn new(kind: ErrorKind, reason: impl Into<String>) -> Self {
        Self { kind, reason: reason.into() }
    }
}

impl From<SyncError> for Failure {
    fn from(error: SyncError) -> Self {
        Self { kind: error.kind(), reason: error.to_string() }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.reason)
    }
}

/// Result of one task in one run; produced once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum SyncOutcome {
    Created,
    Updated,
    UpToDate,
    Failed(Failure),
}

impl SyncOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, SyncOutcome::Failed(_))
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            SyncOutcome::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SyncOutcome::Created => "created",
            SyncOutcome::Updated => "updated",
            SyncOutcome::UpToDate => "up-to-date",
            SyncOutcome::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncOutcome::Failed(failure) => write!(f, "failed {failure}"),
            other => f.write_str(other.label()),
        }
    }
}

/// Outcome plus the bookkeeping the run summary needs
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub name: String,
    pub target: PathBuf,
    #[serde(flatten)]
    pub outcome: SyncOutcome,
    /// Extra attempts spent on transient failures
    pub retries: u32,
    /// Refs created, moved or pruned by this run
    pub changed_refs: usize,
    pub elapsed_ms: u64,
}

impl TaskReport {
    /// Report for a task that never reached the engine
    pub fn not_run(name: &str, target: PathBuf, failure: Failure) -> Self {
        Self {
            name: name.to_string(),
            target,
            outcome: SyncOutcome::Failed(failure),
            retries: 0,
            changed_refs: 0,
            elapsed_ms: 0,
        }
    }
}
