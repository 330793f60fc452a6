//! Sync orchestrator
//!
//! Runs a set of [`SyncTask`]s through the mirror engine on a bounded
//! worker pool, applies the failure policy and produces a [`RunReport`].
//! Only the orchestrator decides whether a run succeeded.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use uuid::Uuid;

use crate::error::{ErrorKind, SyncError};
use crate::git::Transport;
use crate::mirror::{Failure, MirrorEngine, SyncTask, TaskReport};
use crate::parallel::ExecutionStrategy;
use crate::shared::CancelToken;

pub mod report;

pub use report::{RunReport, RunStatus, Summary};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Maximum tasks in flight; 0 derives it from the CPU count
    pub concurrency: usize,
    /// Share of CPU cores used when `concurrency` is 0
    pub thread_percentage: u8,
    /// Stop dispatching new tasks after the first failure
    pub fail_fast: bool,
    /// Failed tasks tolerated before the run counts as failed
    pub max_failures: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self { concurrency: 4, thread_percentage: 75, fail_fast: false, max_failures: 0 }
    }
}

pub struct Orchestrator<T: Transport> {
    engine: MirrorEngine<T>,
    options: RunOptions,
}

impl<T: Transport> Orchestrator<T> {
    pub fn new(engine: MirrorEngine<T>, options: RunOptions) -> Self {
        Self { engine, options }
    }

    pub fn engine(&self) -> &MirrorEngine<T> {
        &self.engine
    }

    /// Run every task once and aggregate the outcomes in input order.
    ///
    /// Only a malformed task set (duplicate names or targets) is an error;
    /// everything that goes wrong inside a task is reported in its outcome.
    pub fn run(&self, tasks: &[SyncTask], cancel: &CancelToken) -> Result<RunReport, SyncError> {
        validate_task_set(tasks)?;

        let started = Instant::now();
        let run_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("run", id = %run_id);
        let _enter = span.enter();

        let strategy =
            ExecutionStrategy::for_workload(self.options.concurrency, self.options.thread_percentage, tasks.len());
        tracing::info!("Syncing {} repositories with {} worker(s)", tasks.len(), strategy.workers());

        let failures = AtomicUsize::new(0);
        let fail_fast = self.options.fail_fast;
        let keep_going = || !cancel.is_cancelled() && !(fail_fast && failures.load(Ordering::SeqCst) > 0);
        let process = |task: &&SyncTask, worker_id: usize| {
            let _enter = span.enter();
            tracing::debug!("worker-{worker_id} picked up {}", task.name);
            let report = self.engine.sync(task, cancel);
            if report.outcome.is_failed() {
                failures.fetch_add(1, Ordering::SeqCst);
            }
            report
        };
        let progress = |current: usize, total: usize, _worker_id: usize| {
            tracing::debug!("{current}/{total} tasks finished");
        };

        let slots = strategy
            .execute(tasks.iter().collect(), process, keep_going, Some(progress))
            .map_err(|e| SyncError::Environment(format!("worker pool failed: {e}")))?;

        let cancelled = cancel.is_cancelled();
        let reports: Vec<TaskReport> = tasks
            .iter()
            .zip(slots)
            .map(|(task, slot)| slot.unwrap_or_else(|| not_dispatched(task, cancelled)))
            .collect();

        let summary = Summary::from_reports(&reports);
        let status = if cancelled {
            RunStatus::Cancelled
        } else if summary.failed > self.options.max_failures {
            RunStatus::Failed
        } else {
            RunStatus::Succeeded
        };
        tracing::info!("Run {status}: {summary}");

        Ok(RunReport {
            run_id,
            status,
            summary,
            tasks: reports,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }
}

fn not_dispatched(task: &SyncTask, cancelled: bool) -> TaskReport {
    let failure = if cancelled {
        Failure::new(ErrorKind::Cancelled, "skipped: run cancelled")
    } else {
        Failure::new(ErrorKind::Skipped, "skipped: fail-fast")
    };
    tracing::warn!("{}: {}", task.name, failure.reason);
    TaskReport::not_run(&task.name, task.target.path().to_path_buf(), failure)
}

/// Reject task sets where two tasks share a name or overlapping targets.
///
/// Targets overlap when they resolve to the same directory (symlinks
/// included) or one lies inside the other. Two tasks writing overlapping
/// targets concurrently could corrupt them, so the whole run is refused
/// before anything executes.
pub fn validate_task_set(tasks: &[SyncTask]) -> Result<(), SyncError> {
    let mut names: HashMap<&str, usize> = HashMap::new();
    let mut targets: Vec<PathBuf> = Vec::with_capacity(tasks.len());
    for (index, task) in tasks.iter().enumerate() {
        if task.name.trim().is_empty() {
            return Err(SyncError::Configuration(format!("task #{} has an empty name", index + 1)));
        }
        if let Some(previous) = names.insert(task.name.as_str(), index) {
            return Err(SyncError::Configuration(format!(
                "duplicate task name '{}' (tasks #{} and #{})",
                task.name,
                previous + 1,
                index + 1
            )));
        }

        let key = task.target.key();
        for (previous, other) in targets.iter().enumerate() {
            let other_name = &tasks[previous].name;
            if *other == key {
                return Err(SyncError::Configuration(format!(
                    "tasks '{}' and '{}' share target {}",
                    other_name,
                    task.name,
                    task.target.path().display()
                )));
            }
            if key.starts_with(other) || other.starts_with(&key) {
                return Err(SyncError::Configuration(format!(
                    "targets of tasks '{}' ({}) and '{}' ({}) are nested",
                    other_name,
                    tasks[previous].target.path().display(),
                    task.name,
                    task.target.path().display()
                )));
            }
        }
        targets.push(key);
    }
    Ok(())
}
