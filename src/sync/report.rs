use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::ErrorKind;
use crate::mirror::{SyncOutcome, TaskReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    Succeeded,
    Failed,
    Cancelled,
}

impl RunStatus {
    /// Process exit code for this status
    pub fn exit_code(self) -> i32 {
        match self {
            RunStatus::Succeeded => 0,
            RunStatus::Failed => 1,
            RunStatus::Cancelled => 130,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        })
    }
}

/// Outcome counts for one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub created: usize,
    pub updated: usize,
    pub up_to_date: usize,
    pub failed: usize,
    /// Failed tasks broken down by error kind
    pub failures: BTreeMap<ErrorKind, usize>,
}

impl Summary {
    pub fn from_reports(reports: &[TaskReport]) -> Self {
        let mut summary = Summary::default();
        for report in reports {
            match &report.outcome {
                SyncOutcome::Created => summary.created += 1,
                SyncOutcome::Updated => summary.updated += 1,
                SyncOutcome::UpToDate => summary.up_to_date += 1,
                SyncOutcome::Failed(failure) => {
                    summary.failed += 1;
                    *summary.failures.entry(failure.kind).or_default() += 1;
                }
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.created + self.updated + self.up_to_date + self.failed
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} up-to-date, {} failed",
            self.created, self.updated, self.up_to_date, self.failed
        )?;
        if !self.failures.is_empty() {
            let kinds: Vec<String> = self.failures.iter().map(|(kind, n)| format!("{n} {kind}")).collect();
            write!(f, " ({})", kinds.join(", "))?;
        }
        Ok(())
    }
}

/// Everything a run produced, in task input order
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub status: RunStatus,
    pub summary: Summary,
    pub tasks: Vec<TaskReport>,
    pub elapsed_ms: u64,
}

impl RunReport {
    pub fn exit_code(&self) -> i32 {
        self.status.exit_code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::Failure;
    use std::path::PathBuf;

    fn report(outcome: SyncOutcome) -> TaskReport {
        TaskReport {
            name: "t".into(),
            target: PathBuf::from("/m/t.git"),
            outcome,
            retries: 0,
            changed_refs: 0,
            elapsed_ms: 1,
        }
    }

    #[test]
    fn test_summary_counts() {
        let reports = vec![
            report(SyncOutcome::Created),
            report(SyncOutcome::UpToDate),
            report(SyncOutcome::UpToDate),
            report(SyncOutcome::Failed(Failure::new(ErrorKind::Transport, "x"))),
            report(SyncOutcome::Failed(Failure::new(ErrorKind::Skipped, "skipped: fail-fast"))),
        ];
        let summary = Summary::from_reports(&reports);
        assert_eq!(summary.created, 1);
        assert_eq!(summary.up_to_date, 2);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.total(), 5);
        assert_eq!(
            summary.to_string(),
            "1 created, 0 updated, 2 up-to-date, 2 failed (1 transport, 1 skipped)"
        );
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(RunStatus::Succeeded.exit_code(), 0);
        assert_eq!(RunStatus::Failed.exit_code(), 1);
        assert_eq!(RunStatus::Cancelled.exit_code(), 130);
    }
}
