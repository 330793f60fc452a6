//! Error taxonomy for mirror synchronization

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::git::{FailureClass, Operation};

/// Closed set of error kinds attached to every failed outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    Environment,
    Configuration,
    Transport,
    Timeout,
    Mismatch,
    Cancelled,
    Skipped,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::Environment => "environment",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Transport => "transport",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Mismatch => "mismatch",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Skipped => "skipped",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// git missing or not runnable; aborts the run before any task starts
    #[error("environment error: {0}")]
    Environment(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("git {operation} failed ({class}, {}): {}", exit_label(.code), summarize(.stderr))]
    Transport {
        operation: Operation,
        code: Option<i32>,
        stderr: String,
        class: FailureClass,
    },

    #[error("git {operation} timed out after {after:?}")]
    Timeout { operation: Operation, after: Duration },

    #[error("target {} occupied by different source: found {found}, expected {expected}", .target.display())]
    Mismatch {
        target: PathBuf,
        expected: String,
        found: String,
    },

    #[error("cancelled")]
    Cancelled,
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Environment(_) => ErrorKind::Environment,
            SyncError::Configuration(_) => ErrorKind::Configuration,
            SyncError::Transport { .. } => ErrorKind::Transport,
            SyncError::Timeout { .. } => ErrorKind::Timeout,
            SyncError::Mismatch { .. } => ErrorKind::Mismatch,
            SyncError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Whether another attempt could plausibly succeed
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Transport { class, .. } => class.is_transient(),
            SyncError::Timeout { .. } => true,
            _ => false,
        }
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "killed by signal".to_string(),
    }
}

/// Last meaningful stderr line; git puts the decisive `fatal:` line last.
fn summarize(stderr: &str) -> String {
    stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .unwrap_or("no output")
        .to_string()
}
